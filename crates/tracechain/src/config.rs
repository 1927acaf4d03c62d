//! Model and tracing configuration with sensible defaults.
//!
//! [`ChainConfig`] holds the chat settings every chain call uses.
//! [`TraceConfig`] holds the tracing backend settings and reads them from the
//! standard `LANGCHAIN_*` environment variables.

use std::sync::Arc;

use crate::api::retry::RetryConfig;
use crate::trace::{NoopSink, RunSink, Tracer};
use crate::{DEFAULT_MODEL, DEFAULT_TEMPERATURE, OPENAI_BASE_URL};

/// Default tracing API endpoint.
pub const DEFAULT_TRACE_ENDPOINT: &str = "https://api.smith.langchain.com";

/// Default project runs are filed under.
pub const DEFAULT_PROJECT: &str = "default";

/// Chat settings shared by every call in the chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Model identifier. Default: `"gpt-3.5-turbo"`.
    pub model: String,
    /// Sampling temperature. Default: `0.7`.
    pub temperature: f32,
    /// Maximum tokens per response; `0` leaves it to the API. Default: `0`.
    pub max_tokens: u32,
    /// Retry policy for the chat client. Default: no retries.
    pub retry: RetryConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: 0,
            retry: RetryConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Chat API credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl ChatApiConfig {
    /// Read `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: non_empty(lookup("OPENAI_API_KEY")),
            base_url: non_empty(lookup("OPENAI_BASE_URL"))
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        }
    }
}

/// Tracing backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Whether runs are uploaded (`LANGCHAIN_TRACING_V2=true`).
    pub enabled: bool,
    /// `LANGCHAIN_API_KEY`.
    pub api_key: Option<String>,
    /// `LANGCHAIN_ENDPOINT`. Default: [`DEFAULT_TRACE_ENDPOINT`].
    pub endpoint: String,
    /// Web UI base used for share links. Derived from `endpoint` when unset.
    pub web_url: Option<String>,
    /// `LANGCHAIN_PROJECT`. Default: [`DEFAULT_PROJECT`].
    pub project: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            endpoint: DEFAULT_TRACE_ENDPOINT.to_string(),
            web_url: None,
            project: DEFAULT_PROJECT.to_string(),
        }
    }
}

impl TraceConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Read settings through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            enabled: lookup("LANGCHAIN_TRACING_V2")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            api_key: non_empty(lookup("LANGCHAIN_API_KEY")),
            endpoint: non_empty(lookup("LANGCHAIN_ENDPOINT")).unwrap_or(defaults.endpoint),
            web_url: None,
            project: non_empty(lookup("LANGCHAIN_PROJECT")).unwrap_or(defaults.project),
        }
    }

    /// Web UI base URL: the explicit `web_url`, or the endpoint with a
    /// leading `api.` host label removed.
    pub fn web_url(&self) -> String {
        if let Some(url) = &self.web_url {
            return url.clone();
        }
        let endpoint = self.endpoint.trim_end_matches('/');
        match endpoint.split_once("://") {
            Some((scheme, rest)) => match rest.strip_prefix("api.") {
                Some(host) => format!("{scheme}://{host}"),
                None => endpoint.to_string(),
            },
            None => endpoint.to_string(),
        }
    }

    /// A tracer posting to `sink`, or to a [`NoopSink`] when tracing is off.
    /// Either way runs are filed under `project`.
    pub fn tracer(&self, sink: Arc<dyn RunSink>) -> Tracer {
        if self.enabled {
            Tracer::new(sink, self.project.clone())
        } else {
            Tracer::new(Arc::new(NoopSink), self.project.clone())
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
