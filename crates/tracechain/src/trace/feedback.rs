//! Feedback attached to a run after the fact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::run::RunId;

/// A scored or annotated judgment about a run.
///
/// Build with [`Feedback::new`] and the `with_*` helpers:
///
/// ```
/// use tracechain::trace::{Feedback, RunId};
/// use serde_json::json;
///
/// let fb = Feedback::new(RunId::new(), "user_feedback")
///     .with_score(0.5)
///     .with_correction(json!({"generation": "A better argument."}))
///     .with_source_info("user", json!("demo"));
/// assert_eq!(fb.key, "user_feedback");
/// assert_eq!(fb.score, Some(0.5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub run_id: RunId,
    pub key: String,
    pub score: Option<f64>,
    pub value: Option<Value>,
    pub comment: Option<String>,
    pub correction: Option<Value>,
    pub source_info: Map<String, Value>,
}

impl Feedback {
    pub fn new(run_id: RunId, key: impl Into<String>) -> Self {
        Self {
            run_id,
            key: key.into(),
            score: None,
            value: None,
            comment: None,
            correction: None,
            source_info: Map::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_correction(mut self, correction: Value) -> Self {
        self.correction = Some(correction);
        self
    }

    pub fn with_source_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.source_info.insert(key.into(), value.into());
        self
    }

    /// Request body for the feedback endpoint.
    pub(crate) fn to_payload(&self) -> Result<FeedbackPayload<'_>, String> {
        if self.key.trim().is_empty() {
            return Err("feedback key must not be empty".to_string());
        }
        Ok(FeedbackPayload {
            id: Uuid::new_v4(),
            run_id: self.run_id,
            key: &self.key,
            score: self.score,
            value: self.value.as_ref(),
            comment: self.comment.as_deref(),
            correction: self.correction.as_ref(),
            feedback_source: FeedbackSource {
                source_type: "api",
                metadata: &self.source_info,
            },
        })
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct FeedbackPayload<'a> {
    id: Uuid,
    run_id: RunId,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correction: Option<&'a Value>,
    feedback_source: FeedbackSource<'a>,
}

#[derive(Serialize, Debug)]
struct FeedbackSource<'a> {
    #[serde(rename = "type")]
    source_type: &'static str,
    #[serde(skip_serializing_if = "Map::is_empty")]
    metadata: &'a Map<String, Value>,
}

/// Feedback as stored by the backend.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub run_id: Option<RunId>,
    pub key: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub correction: Option<Value>,
}
