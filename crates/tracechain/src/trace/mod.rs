//! Run tracing: run records, sinks, the [`traceable()`] wrapper, feedback, and sharing.
//!
//! - [`run`]: [`RunId`], [`RunType`], [`TraceOptions`], and the [`RunRecord`]
//!   posted to the backend.
//! - [`sink`]: the [`RunSink`] trait with in-memory and no-op sinks.
//! - [`traceable`](mod@traceable): wrap a future as a run; nesting follows
//!   the await tree.
//! - [`client`]: [`LangSmithClient`] for upload, feedback, and share links.
//! - [`feedback`]: the [`Feedback`] builder.

pub mod client;
pub mod feedback;
pub mod run;
pub mod sink;
pub mod traceable;

pub use client::LangSmithClient;
pub use feedback::{Feedback, FeedbackRecord};
pub use run::{RunContext, RunId, RunRecord, RunType, TraceOptions};
pub use sink::{MemorySink, NoopSink, RunSink, SinkFuture};
pub use traceable::{RunSpec, Tracer, current_run, current_run_id, traceable};
