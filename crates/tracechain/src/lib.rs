//! Traced LLM call chains with after-the-fact feedback and run sharing.
//!
//! `tracechain` runs a small debate chain (argument generation, critique,
//! refinement) on top of the OpenAI chat completions API. Every step is
//! recorded as a *run* in a LangSmith-compatible tracing backend, linked into
//! a parent/child run tree. The root run's [`RunId`](trace::RunId) is handed
//! back to the caller so feedback can be attached later, or a public share
//! link generated.
//!
//! # Getting started
//!
//! ```ignore
//! use tracechain::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let model = OpenAiClient::new(std::env::var("OPENAI_API_KEY").unwrap())?;
//!     let trace_config = TraceConfig::from_env();
//!     let langsmith = LangSmithClient::new(&trace_config)?;
//!     let tracer = trace_config.tracer(std::sync::Arc::new(langsmith.clone()));
//!
//!     let ctx = ChainContext::new(&model, &tracer, ChainConfig::default());
//!     let out = argument_chain(
//!         &ctx,
//!         "Shape of the earth",
//!         "Assume the world is flat.",
//!         TraceOptions::default().with_tag("demo"),
//!     )
//!     .await?;
//!
//!     langsmith
//!         .create_feedback(&Feedback::new(out.run_id, "user_feedback").with_score(0.5))
//!         .await?;
//!     println!("{}", langsmith.share_run(out.run_id).await?);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **The chain itself:** [`chain`] holds the three prompt builders, the
//!   traced model call, and [`argument_chain`](chain::argument_chain).
//! - **Run tracing:** [`trace::traceable()`] wraps any future as a run.
//!   Runs nest automatically: a traced future started while another run is
//!   in scope becomes its child.
//! - **Where runs go:** implement [`RunSink`](trace::RunSink), or use
//!   [`LangSmithClient`](trace::LangSmithClient), [`MemorySink`](trace::MemorySink)
//!   or [`NoopSink`](trace::NoopSink).
//! - **Feedback and sharing:** [`LangSmithClient::create_feedback`](trace::LangSmithClient::create_feedback),
//!   [`share_run`](trace::LangSmithClient::share_run) and friends.
//! - **Configuration:** [`config`] reads model and tracing settings, with
//!   the tracing side taken from the usual `LANGCHAIN_*` environment variables.

pub mod api;
pub mod chain;
pub mod config;
pub mod prelude;
pub mod trace;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::api::describe_send_error;
use crate::api::retry::{RetryConfig, retry_api_call};

// ── Constants ──────────────────────────────────────────────────────

/// Default base URL of the chat completions API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for chain calls.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default sampling temperature for chain calls.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. An unset `max_tokens` is omitted from
/// serialization.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`ChatModel::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Model trait ────────────────────────────────────────────────────

/// Boxed future returned by [`ChatModel::chat`].
pub type ChatFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatCompletion, String>> + Send + 'a>>;

/// Anything that can answer a chat completion request.
///
/// The chain only talks to this trait, so a scripted model can stand in for
/// the real API.
pub trait ChatModel: Send + Sync {
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) retry: RetryConfig,
}

impl OpenAiClient {
    /// Create a new client against the default OpenAI base URL.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_base_url(api_key, OPENAI_BASE_URL)
    }

    /// Create a client against any OpenAI-compatible endpoint.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tracechain/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Retry transient failures according to `retry`. Off by default.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Send a chat completion request.
    pub async fn complete(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        retry_api_call(&self.retry, || self.send_once(body)).await
    }

    async fn send_once(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| describe_send_error(&e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("chat API HTTP {status}: {text}"));
        }

        parse_chat_response(&text)
    }
}

impl ChatModel for OpenAiClient {
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.complete(body))
    }
}

/// Turn a raw response body into a [`ChatCompletion`], keeping the first choice.
fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("chat API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(c) => Ok(ChatCompletion {
            content: c.message.content.unwrap_or_default(),
            usage: parsed.usage,
            finish_reason: c.finish_reason,
        }),
        None => {
            debug!("LLM output: empty (no choices)");
            Ok(ChatCompletion {
                usage: parsed.usage,
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        assert_eq!(Message::user("world").role, MessageRole::User);
        assert_eq!(Message::assistant("ok").role, MessageRole::Assistant);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(Message::system("x")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "gpt-3.5-turbo".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["model"], "gpt-3.5-turbo");

        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["messages", "model", "temperature"]);
    }

    #[test]
    fn parse_takes_first_choice() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "first"}, "finish_reason": "stop"},
                {"message": {"role": "assistant", "content": "second"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }"#;
        let completion = parse_chat_response(body).unwrap();
        assert_eq!(completion.content, "first");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, Some(12));
    }

    #[test]
    fn parse_surfaces_api_error() {
        let err = parse_chat_response(r#"{"error": {"message": "model not found"}}"#).unwrap_err();
        assert_eq!(err, "chat API error: model not found");
    }

    #[tokio::test]
    async fn malformed_url_fails_without_counting_as_transient() {
        let client = OpenAiClient::with_base_url("sk-test", "not a url").unwrap();
        let err = client
            .complete(&ChatRequest {
                model: DEFAULT_MODEL.into(),
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.starts_with("request failed:"), "got: {err}");
        assert!(!crate::api::retry::is_transient_error(&err));
    }

    #[tokio::test]
    async fn refused_connection_counts_as_transient() {
        let client = OpenAiClient::with_base_url("sk-test", "http://127.0.0.1:1").unwrap();
        let err = client
            .complete(&ChatRequest {
                model: DEFAULT_MODEL.into(),
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.starts_with("connection failed:"), "got: {err}");
        assert!(crate::api::retry::is_transient_error(&err));
    }

    #[test]
    fn parse_without_choices_is_empty() {
        let completion = parse_chat_response(r#"{"choices": []}"#).unwrap();
        assert!(completion.content.is_empty());
    }
}
