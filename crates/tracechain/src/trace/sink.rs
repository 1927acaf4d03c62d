//! Destinations for run records.
//!
//! | Sink | Use case |
//! |------|----------|
//! | [`NoopSink`] | Tracing disabled |
//! | [`MemorySink`] | Dry runs and tests; keeps every record in memory |
//! | [`LangSmithClient`](super::client::LangSmithClient) | Upload to a LangSmith-compatible backend |

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use super::run::{RunId, RunRecord};

/// Boxed future returned by [`RunSink`] methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// Receives runs as they start and finish.
pub trait RunSink: Send + Sync {
    /// Called once when a run starts (no outputs or end time yet).
    fn create_run<'a>(&'a self, run: &'a RunRecord) -> SinkFuture<'a>;

    /// Called once when a run ends, with outputs or error filled in.
    fn update_run<'a>(&'a self, run: &'a RunRecord) -> SinkFuture<'a>;
}

/// Discards every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl RunSink for NoopSink {
    fn create_run<'a>(&'a self, _run: &'a RunRecord) -> SinkFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn update_run<'a>(&'a self, _run: &'a RunRecord) -> SinkFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Keeps the latest version of every run, in creation order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    runs: Arc<Mutex<Vec<RunRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded runs, in the order they started.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, run_id: RunId) -> Option<RunRecord> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
    }

    /// Direct children of `run_id`, in the order they started.
    pub fn children_of(&self, run_id: RunId) -> Vec<RunRecord> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.parent_run_id == Some(run_id))
            .cloned()
            .collect()
    }

    /// Indented outline of the trace rooted at `run_id`.
    pub fn render_tree(&self, run_id: RunId) -> String {
        let mut out = String::new();
        self.render_into(run_id, 0, &mut out);
        out
    }

    fn render_into(&self, run_id: RunId, depth: usize, out: &mut String) {
        let Some(run) = self.get(run_id) else {
            return;
        };
        let status = match (&run.error, run.end_time) {
            (Some(_), _) => "error",
            (None, Some(_)) => "ok",
            (None, None) => "running",
        };
        out.push_str(&format!(
            "{}{} [{}] {} ({status})\n",
            "  ".repeat(depth),
            run.name,
            run.run_type,
            run.id
        ));
        for child in self.children_of(run_id) {
            self.render_into(child.id, depth + 1, out);
        }
    }

    fn upsert(&self, run: &RunRecord) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => runs.push(run.clone()),
        }
    }
}

impl RunSink for MemorySink {
    fn create_run<'a>(&'a self, run: &'a RunRecord) -> SinkFuture<'a> {
        self.upsert(run);
        Box::pin(async { Ok(()) })
    }

    fn update_run<'a>(&'a self, run: &'a RunRecord) -> SinkFuture<'a> {
        self.upsert(run);
        Box::pin(async { Ok(()) })
    }
}
