//! Convenience re-exports for common `tracechain` types.
//!
//! ```ignore
//! use tracechain::prelude::*;
//! ```
//!
//! Pulls in the chat client and message types, the chain entry points, the
//! tracing wrapper with its sinks, feedback, and configuration.

// ── Chat ────────────────────────────────────────────────────────────
pub use crate::{ChatCompletion, ChatModel, ChatRequest, Message, MessageRole, OpenAiClient};

// ── Chain ───────────────────────────────────────────────────────────
pub use crate::chain::{
    ChainContext, ChainOutput, argument_chain, argument_generator, call_chat_model, critic,
    refiner,
};

// ── Tracing ─────────────────────────────────────────────────────────
pub use crate::trace::{
    Feedback, FeedbackRecord, LangSmithClient, MemorySink, NoopSink, RunId, RunRecord, RunSink,
    RunSpec, RunType, TraceOptions, Tracer, current_run_id, traceable,
};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::api::RetryConfig;
pub use crate::config::{ChainConfig, ChatApiConfig, TraceConfig};
