//! Exponential backoff with jitter.
//!
//! [`with_retry`] wraps any fallible async operation. Failures are retried
//! only when the retry predicate accepts them; everything else is returned
//! immediately without consuming an attempt. The wrapped operation's success
//! value is passed through untouched.

use rand::RngExt;
use rand::rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Substrings that mark an error message as transient.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "429",
    "too many requests",
    "timeout",
    "timed out",
    "network",
    "not ready",
    "public key",
    "connected but",
];

/// Returns `true` if `message` contains one of the [`TRANSIENT_MARKERS`].
#[must_use]
pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Backoff parameters for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub retry_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_retry_delay: Duration,
    /// Upper bound on the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(10),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Growth factor applied per attempt.
    pub const BACKOFF_FACTOR: f64 = 1.5;

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::ZERO,
            max_retry_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Sets the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay and its cap.
    #[must_use]
    pub const fn with_delays(mut self, retry_delay: Duration, max_retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self.max_retry_delay = max_retry_delay;
        self
    }

    /// Sets the jitter bound. `Duration::ZERO` disables jitter.
    #[must_use]
    pub const fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns `min(retry_delay * 1.5^attempt, max_retry_delay)`, without jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * Self::BACKOFF_FACTOR.powi(exponent);
        let capped = secs.min(self.max_retry_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng().random_range(0..=max_ms))
        }
    }
}

/// Runs `op`, retrying failures whose message reads as transient.
///
/// See [`is_transient_message`] for the default predicate.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once
/// `policy.max_retries` retries are exhausted.
pub async fn with_retry<T, E, F, Fut>(op: F, policy: &RetryPolicy) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(op, policy, |e: &E| is_transient_message(&e.to_string())).await
}

/// Runs `op`, retrying failures accepted by `should_retry`.
///
/// `op` is invoked at most `policy.max_retries + 1` times.
///
/// # Errors
///
/// Returns the first error rejected by `should_retry`, or the last error once
/// `policy.max_retries` retries are exhausted.
pub async fn with_retry_if<T, E, F, Fut, P>(
    mut op: F,
    policy: &RetryPolicy,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !should_retry(&err) {
                    return Err(err);
                }
                let delay = policy.backoff_delay(attempt) + policy.jitter();
                #[cfg(feature = "telemetry")]
                tracing::debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_delays(Duration::from_millis(100), Duration::from_secs(1))
            .with_max_jitter(Duration::ZERO)
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let policy = quick_policy(5);
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(150));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(225));
        assert_eq!(policy.backoff_delay(20), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_transient_markers() {
        assert!(is_transient_message("429 Too Many Requests"));
        assert!(is_transient_message("Wallet connected but public key missing"));
        assert!(is_transient_message("Provider not ready"));
        assert!(!is_transient_message("User rejected the request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_retries_plus_one() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("network error".to_owned())
            },
            &quick_policy(3),
        )
        .await;
        assert_eq!(result.unwrap_err(), "network error");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_matching_error_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("invalid signature".to_owned())
            },
            &quick_policy(3),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_value_passes_through() {
        let calls = &AtomicU32::new(0);
        let result: Result<u64, String> = with_retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("timeout".to_owned())
                } else {
                    Ok(42)
                }
            },
            &quick_policy(3),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), u16> = with_retry_if(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(503)
            },
            &quick_policy(2),
            |status| *status >= 500,
        )
        .await;
        assert_eq!(result.unwrap_err(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
