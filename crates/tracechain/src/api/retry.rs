//! Optional retry with exponential backoff and jitter.
//!
//! The default [`RetryConfig`] performs no retries, so API failures reach
//! the caller on the first attempt. When retries are enabled, only transient
//! failures (429, 500, 502, 503, 504, connect failures, timeouts) are retried;
//! 400/401 style errors never are.

use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter cycle; no rand dependency.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an error string indicates a transient (retryable) failure.
pub fn is_transient_error(error: &str) -> bool {
    let transient_statuses = ["429", "500", "502", "503", "504"];
    if transient_statuses
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return true;
    }

    let lower = error.to_lowercase();
    [
        "request timed out:",
        "connection failed:",
        "connection reset",
        "connection refused",
        "timed out",
        "broken pipe",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Whether an error is a permanent (non-retryable) failure.
pub fn is_permanent_error(error: &str) -> bool {
    [
        "HTTP 400",
        "HTTP 401",
        "HTTP 403",
        "HTTP 404",
        "HTTP 422",
    ]
    .iter()
    .any(|p| error.contains(p))
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
///
/// The last error is returned unchanged.
pub async fn retry_api_call<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt < config.max_retries
                    && is_transient_error(&e)
                    && !is_permanent_error(&e)
                {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        "Transient API error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                        attempt + 1,
                        config.max_retries,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_config_no_retries() {
        assert_eq!(RetryConfig::default().max_retries, 0);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn transient_and_permanent_errors() {
        assert!(is_transient_error("chat API HTTP 429 Too Many Requests: slow down"));
        assert!(is_transient_error("connection failed: tcp connect error"));
        assert!(is_transient_error("request timed out: operation timed out"));
        assert!(!is_transient_error("request failed: builder error"));
        assert!(!is_transient_error("chat API HTTP 400 Bad Request: nope"));
        assert!(is_permanent_error("chat API HTTP 401 Unauthorized: bad key"));
    }

    #[tokio::test]
    async fn default_config_returns_first_error_unchanged() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_api_call(&RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("chat API HTTP 503 Service Unavailable: down".to_string()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.unwrap_err(),
            "chat API HTTP 503 Service Unavailable: down"
        );
    }

    #[tokio::test]
    async fn transient_error_is_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::with_retries(2)
        };
        let result = retry_api_call(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("request timed out: operation timed out".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::with_retries(3)
        };
        let result: Result<(), String> = retry_api_call(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("chat API HTTP 401 Unauthorized: bad key".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
