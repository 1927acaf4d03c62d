//! Wrap a future as a traced run.
//!
//! [`traceable`] records a run around any `Future<Output = Result<T, String>>`.
//! The run in scope is tracked in a task-local, so a traced future awaited
//! inside another one becomes its child without any explicit plumbing:
//!
//! ```ignore
//! traceable(&tracer, RunSpec::new("outer", RunType::Chain), async {
//!     // recorded as a child of "outer"
//!     traceable(&tracer, RunSpec::new("inner", RunType::Llm), async { Ok(1) }).await
//! })
//! .await?;
//! ```
//!
//! Each run is also entered as a `tracing` span named `run`, so log lines
//! emitted inside, including the upload logs, carry the run id.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use super::run::{RunContext, RunId, RunRecord, RunType, TraceOptions};
use super::sink::{NoopSink, RunSink};

tokio::task_local! {
    static CURRENT_RUN: RunContext;
}

/// The run currently in scope, if any.
pub fn current_run() -> Option<RunContext> {
    CURRENT_RUN.try_with(|c| c.clone()).ok()
}

/// Id of the run currently in scope, if any.
pub fn current_run_id() -> Option<RunId> {
    CURRENT_RUN.try_with(|c| c.run_id).ok()
}

/// Where runs go, plus the project they are filed under by default.
#[derive(Clone)]
pub struct Tracer {
    sink: Arc<dyn RunSink>,
    project: String,
}

impl Tracer {
    pub fn new(sink: Arc<dyn RunSink>, project: impl Into<String>) -> Self {
        Self {
            sink,
            project: project.into(),
        }
    }

    /// A tracer that records nothing. Traced calls still run normally.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopSink), "default")
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    async fn post_create(&self, run: &RunRecord) {
        match self.sink.create_run(run).await {
            Ok(()) => debug!("Run started: {} ({}) id={}", run.name, run.run_type, run.id),
            Err(e) => warn!("Failed to post run start for '{}' ({}): {e}", run.name, run.id),
        }
    }

    async fn post_update(&self, run: &RunRecord) {
        match self.sink.update_run(run).await {
            Ok(()) => debug!(
                "Run finished: {} id={} error={}",
                run.name,
                run.id,
                run.error.is_some()
            ),
            Err(e) => warn!("Failed to post run end for '{}' ({}): {e}", run.name, run.id),
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

/// Describes the run a traced call produces.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub name: String,
    pub run_type: RunType,
    pub inputs: Value,
    pub options: TraceOptions,
}

impl RunSpec {
    pub fn new(name: impl Into<String>, run_type: RunType) -> Self {
        Self {
            name: name.into(),
            run_type,
            inputs: Value::Object(Default::default()),
            options: TraceOptions::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_options(mut self, options: TraceOptions) -> Self {
        self.options = options;
        self
    }
}

/// Run `fut` as a traced run and return its result unchanged.
///
/// The run is linked under whatever run is in scope. Outputs (or the error
/// string) are recorded when `fut` completes; outputs that cannot be
/// serialized are logged and recorded as null. Failing to upload the run is
/// logged and otherwise ignored.
pub async fn traceable<T, F>(tracer: &Tracer, spec: RunSpec, fut: F) -> Result<T, String>
where
    T: Serialize,
    F: Future<Output = Result<T, String>>,
{
    let parent = current_run();
    let mut run = RunRecord::new(
        spec.name,
        spec.run_type,
        spec.inputs,
        parent.as_ref(),
        spec.options,
        &tracer.project,
    );

    let span = info_span!(
        "run",
        run_id = %run.id,
        run_name = %run.name,
        run_type = %run.run_type,
    );

    async move {
        tracer.post_create(&run).await;

        let result = CURRENT_RUN.scope(run.context(), fut).await;

        match &result {
            Ok(value) => {
                let outputs = serde_json::to_value(value).unwrap_or_else(|e| {
                    warn!("Failed to serialize outputs of run '{}' ({}): {e}", run.name, run.id);
                    Value::Null
                });
                run.finish_ok(outputs);
            }
            Err(e) => run.finish_err(e.clone()),
        }

        tracer.post_update(&run).await;
        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::sink::{MemorySink, SinkFuture};
    use serde_json::json;

    fn memory_tracer() -> (Tracer, MemorySink) {
        let sink = MemorySink::new();
        (Tracer::new(Arc::new(sink.clone()), "tests"), sink)
    }

    #[tokio::test]
    async fn records_inputs_and_outputs() {
        let (tracer, sink) = memory_tracer();
        let out = traceable(
            &tracer,
            RunSpec::new("echo", RunType::Chain).with_inputs(json!({"q": "hi"})),
            async { Ok::<_, String>("hi back".to_string()) },
        )
        .await
        .unwrap();
        assert_eq!(out, "hi back");

        let runs = sink.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].inputs, json!({"q": "hi"}));
        assert_eq!(runs[0].outputs, Some(json!({"output": "hi back"})));
        assert_eq!(runs[0].session_name, "tests");
    }

    #[tokio::test]
    async fn nested_runs_link_to_parent() {
        let (tracer, sink) = memory_tracer();
        let root_id = RunId::new();

        traceable(
            &tracer,
            RunSpec::new("outer", RunType::Chain)
                .with_options(TraceOptions::default().with_run_id(root_id)),
            async {
                assert_eq!(current_run_id(), Some(root_id));
                traceable(&tracer, RunSpec::new("inner", RunType::Llm), async {
                    Ok::<_, String>(1)
                })
                .await
            },
        )
        .await
        .unwrap();

        assert_eq!(current_run_id(), None);
        let children = sink.children_of(root_id);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "inner");
        assert_eq!(children[0].trace_id, root_id);
        assert_eq!(children[0].run_type, RunType::Llm);
    }

    #[tokio::test]
    async fn errors_are_recorded_and_propagated_unchanged() {
        let (tracer, sink) = memory_tracer();
        let err = traceable(&tracer, RunSpec::new("fails", RunType::Llm), async {
            Err::<String, _>("chat API HTTP 500: boom".to_string())
        })
        .await
        .unwrap_err();
        assert_eq!(err, "chat API HTTP 500: boom");

        let runs = sink.runs();
        let run = &runs[0];
        assert_eq!(run.error.as_deref(), Some("chat API HTTP 500: boom"));
        assert!(run.end_time.is_some());
    }

    struct FailingSink;

    impl RunSink for FailingSink {
        fn create_run<'a>(&'a self, _run: &'a RunRecord) -> SinkFuture<'a> {
            Box::pin(async { Err("tracing API HTTP 503: unavailable".to_string()) })
        }

        fn update_run<'a>(&'a self, _run: &'a RunRecord) -> SinkFuture<'a> {
            Box::pin(async { Err("tracing API HTTP 503: unavailable".to_string()) })
        }
    }

    #[tokio::test]
    async fn sink_failures_do_not_affect_the_call() {
        let tracer = Tracer::new(Arc::new(FailingSink), "tests");
        let out = traceable(&tracer, RunSpec::new("ok", RunType::Chain), async {
            Ok::<_, String>(42)
        })
        .await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn disabled_tracer_still_runs() {
        let tracer = Tracer::disabled();
        let out = traceable(&tracer, RunSpec::new("ok", RunType::Chain), async {
            Ok::<_, String>("x")
        })
        .await;
        assert_eq!(out, Ok("x"));
    }

    #[tokio::test]
    async fn unserializable_outputs_are_recorded_as_null() {
        use std::collections::HashMap;

        let (tracer, sink) = memory_tracer();
        let out = traceable(&tracer, RunSpec::new("pairs", RunType::Chain), async {
            Ok::<_, String>(HashMap::from([((1, 2), 3)]))
        })
        .await
        .unwrap();
        assert_eq!(out.get(&(1, 2)), Some(&3));

        let runs = sink.runs();
        assert_eq!(runs[0].outputs, Some(json!({"output": null})));
        assert!(runs[0].error.is_none());
    }

    /// Records each event's message and the name of the span it fired in.
    #[derive(Clone, Default)]
    struct EventLog(Arc<std::sync::Mutex<Vec<(String, Option<&'static str>)>>>);

    impl<S> tracing_subscriber::Layer<S> for EventLog
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Message(String);
            impl tracing::field::Visit for Message {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.0 = format!("{value:?}");
                    }
                }
            }

            let mut message = Message(String::new());
            event.record(&mut message);
            let span = ctx.event_span(event).map(|s| s.name());
            self.0.lock().unwrap().push((message.0, span));
        }
    }

    #[tokio::test]
    async fn upload_logs_fire_inside_the_run_span() {
        use tracing_subscriber::layer::SubscriberExt;

        let log = EventLog::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));

        let (tracer, _sink) = memory_tracer();
        traceable(&tracer, RunSpec::new("logged", RunType::Chain), async {
            Ok::<_, String>(())
        })
        .await
        .unwrap();

        let events = log.0.lock().unwrap().clone();
        let started = events
            .iter()
            .find(|(m, _)| m.starts_with("Run started: logged"))
            .expect("start event");
        let finished = events
            .iter()
            .find(|(m, _)| m.starts_with("Run finished: logged"))
            .expect("finish event");
        assert_eq!(started.1, Some("run"));
        assert_eq!(finished.1, Some("run"));
    }
}
