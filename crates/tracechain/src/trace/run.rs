//! Run identifiers, run types, and the run record posted to the tracing backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier of a run.
///
/// Once issued it is stable: it can be kept after the traced call returns
/// and used to attach feedback or share the run.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Issue a fresh random run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for RunId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| format!("invalid run id '{s}': {e}"))
    }
}

/// Kind of work a run represents.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    #[default]
    Chain,
    Llm,
    Tool,
    Retriever,
    Prompt,
    Parser,
    Embedding,
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunType::Chain => "chain",
            RunType::Llm => "llm",
            RunType::Tool => "tool",
            RunType::Retriever => "retriever",
            RunType::Prompt => "prompt",
            RunType::Parser => "parser",
            RunType::Embedding => "embedding",
        };
        f.write_str(s)
    }
}

/// Per-call tracing options: explicit run id, tags, metadata, project.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub run_id: Option<RunId>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub project_name: Option<String>,
}

impl TraceOptions {
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_name = Some(project.into());
        self
    }
}

/// Position of a run inside its trace. Children are created relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: RunId,
    pub trace_id: RunId,
    pub dotted_order: String,
    pub session_name: String,
}

/// Free-form extras attached to a run.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunExtra {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A single recorded execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunRecord {
    pub id: RunId,
    pub name: String,
    pub run_type: RunType,
    pub trace_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<RunId>,
    pub dotted_order: String,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub inputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extra: RunExtra,
}

impl RunRecord {
    /// Start a run. With a parent the run joins the parent's trace;
    /// without one it roots a new trace.
    pub fn new(
        name: impl Into<String>,
        run_type: RunType,
        inputs: Value,
        parent: Option<&RunContext>,
        options: TraceOptions,
        default_project: &str,
    ) -> Self {
        let id = options.run_id.unwrap_or_default();
        let start_time = Utc::now();
        let segment = format!("{}{id}", start_time.format("%Y%m%dT%H%M%S%6fZ"));

        let (trace_id, parent_run_id, dotted_order, inherited_project) = match parent {
            Some(p) => (
                p.trace_id,
                Some(p.run_id),
                format!("{}.{segment}", p.dotted_order),
                Some(p.session_name.clone()),
            ),
            None => (id, None, segment, None),
        };

        let session_name = options
            .project_name
            .or(inherited_project)
            .unwrap_or_else(|| default_project.to_string());

        Self {
            id,
            name: name.into(),
            run_type,
            trace_id,
            parent_run_id,
            dotted_order,
            session_name,
            start_time,
            end_time: None,
            inputs,
            outputs: None,
            error: None,
            tags: options.tags,
            extra: RunExtra {
                metadata: options.metadata,
            },
        }
    }

    /// The context children of this run are created under.
    pub fn context(&self) -> RunContext {
        RunContext {
            run_id: self.id,
            trace_id: self.trace_id,
            dotted_order: self.dotted_order.clone(),
            session_name: self.session_name.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_run_id.is_none()
    }

    /// Mark the run finished with `outputs`.
    pub fn finish_ok(&mut self, outputs: Value) {
        self.outputs = Some(wrap_outputs(outputs));
        self.end_time = Some(Utc::now());
    }

    /// Mark the run failed with `error`.
    pub fn finish_err(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }
}

/// Objects are kept as-is; anything else becomes `{"output": value}`.
pub fn wrap_outputs(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => serde_json::json!({ "output": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_ids_are_unique_and_round_trip() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        let parsed: RunId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn bad_run_id_is_rejected() {
        let err = "not-a-uuid".parse::<RunId>().unwrap_err();
        assert!(err.contains("invalid run id"));
    }

    #[test]
    fn run_type_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RunType::Llm).unwrap(), "llm");
        assert_eq!(RunType::Chain.to_string(), "chain");
    }

    #[test]
    fn root_run_starts_its_own_trace() {
        let run = RunRecord::new(
            "root",
            RunType::Chain,
            json!({}),
            None,
            TraceOptions::default(),
            "default",
        );
        assert!(run.is_root());
        assert_eq!(run.trace_id, run.id);
        assert!(run.dotted_order.ends_with(&run.id.to_string()));
        assert_eq!(run.session_name, "default");
    }

    /// Splits one dotted-order segment into its timestamp and run id.
    fn parse_segment(segment: &str) -> (DateTime<Utc>, RunId) {
        let (stamp, id) = segment.split_at(22);
        let stamp = chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S%6fZ")
            .unwrap()
            .and_utc();
        (stamp, id.parse().unwrap())
    }

    #[test]
    fn dotted_order_segments_are_start_time_then_id() {
        let root = RunRecord::new(
            "root",
            RunType::Chain,
            json!({}),
            None,
            TraceOptions::default(),
            "default",
        );
        let (stamp, id) = parse_segment(&root.dotted_order);
        assert_eq!(stamp.timestamp_micros(), root.start_time.timestamp_micros());
        assert_eq!(id, root.id);

        let child = RunRecord::new(
            "child",
            RunType::Llm,
            json!({}),
            Some(&root.context()),
            TraceOptions::default(),
            "default",
        );
        let (prefix, segment) = child.dotted_order.rsplit_once('.').unwrap();
        assert_eq!(prefix, root.dotted_order);
        let (stamp, id) = parse_segment(segment);
        assert_eq!(stamp.timestamp_micros(), child.start_time.timestamp_micros());
        assert_eq!(id, child.id);
    }

    #[test]
    fn explicit_run_id_is_honored() {
        let id = RunId::new();
        let run = RunRecord::new(
            "root",
            RunType::Chain,
            json!({}),
            None,
            TraceOptions::default().with_run_id(id),
            "default",
        );
        assert_eq!(run.id, id);
    }

    #[test]
    fn child_joins_parent_trace() {
        let root = RunRecord::new(
            "root",
            RunType::Chain,
            json!({}),
            None,
            TraceOptions::default().with_project("debates"),
            "default",
        );
        let child = RunRecord::new(
            "child",
            RunType::Llm,
            json!({}),
            Some(&root.context()),
            TraceOptions::default(),
            "default",
        );
        assert_eq!(child.trace_id, root.id);
        assert_eq!(child.parent_run_id, Some(root.id));
        assert!(child.dotted_order.starts_with(&format!("{}.", root.dotted_order)));
        assert_eq!(child.session_name, "debates");
    }

    #[test]
    fn finish_wraps_scalar_outputs() {
        let mut run = RunRecord::new(
            "r",
            RunType::Chain,
            json!({}),
            None,
            TraceOptions::default(),
            "default",
        );
        run.finish_ok(json!("done"));
        assert_eq!(run.outputs, Some(json!({"output": "done"})));
        assert!(run.end_time.is_some());

        assert_eq!(wrap_outputs(json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn finish_err_records_error() {
        let mut run = RunRecord::new(
            "r",
            RunType::Llm,
            json!({}),
            None,
            TraceOptions::default(),
            "default",
        );
        run.finish_err("boom");
        assert_eq!(run.error.as_deref(), Some("boom"));
        assert!(run.outputs.is_none());
    }
}
