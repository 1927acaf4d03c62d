//! HTTP plumbing shared by the chat client and the tracing client.
//!
//! - [`describe_send_error`]: error text for a request that never got a response.
//!
//! - [`retry`]: transient error detection (429, 5xx, connect failures, timeouts) with
//!   configurable exponential backoff and jitter. Disabled by default.

pub mod retry;

pub use retry::RetryConfig;

/// Describe a failed send. Only connect and timeout failures get the
/// prefixes [`retry::is_transient_error`] treats as retryable.
pub(crate) fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}
