use std::{future::Future, time::Duration};

use {
    concierge_config::BackendConfig,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// How a backend call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on each individual attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Policy for the reply endpoint.
    pub fn for_reply(config: &BackendConfig) -> Self {
        Self {
            attempts: config.retries,
            base_delay: config.retry_base_delay(),
            timeout: config.reply_timeout(),
        }
    }

    /// Policy for the conversation log endpoint.
    pub fn for_log(config: &BackendConfig) -> Self {
        Self {
            attempts: config.retries,
            base_delay: config.retry_base_delay(),
            timeout: config.log_timeout(),
        }
    }

    /// Pause after failed attempt `attempt` (1-based): `base * 2^attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. Each attempt is bounded by
/// the policy timeout; no delay follows the final attempt.
pub async fn retry_with_backoff<T, F, Fut>(
    function: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match tokio::time::timeout(policy.timeout, op(attempt)).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(function, attempt, "backend call succeeded after retry");
                }
                return Ok(value);
            },
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout {
                function: function.to_string(),
                millis: policy.timeout.as_millis(),
            },
        };

        warn!(function, attempt, attempts, error = %err, "backend call failed");
        if attempt >= attempts {
            return Err(Error::Exhausted {
                function: function.to_string(),
                attempts,
                last: Box::new(err),
            });
        }
        tokio::time::sleep(policy.delay_after(attempt)).await;
        attempt += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        std::sync::{
            Arc, Mutex,
            atomic::{AtomicU32, Ordering},
        },
        tokio::time::Instant,
    };

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }

    fn failure() -> Error {
        Error::Status {
            function: "get-reply".into(),
            status: 500,
            body: String::new(),
        }
    }

    #[test]
    fn delays_double_from_two_seconds() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn policy_follows_backend_config() {
        let cfg = BackendConfig::default();
        let p = RetryPolicy::for_reply(&cfg);
        assert_eq!(p.attempts, 3);
        assert_eq!(p.base_delay, Duration::from_secs(1));
        assert_eq!(p.timeout, Duration::from_secs(30));
        assert_eq!(RetryPolicy::for_log(&cfg).timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_waits_two_then_four_seconds() {
        let started = Instant::now();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);

        let value = retry_with_backoff("get-reply", &policy(), move |attempt| {
            seen.lock().unwrap().push(started.elapsed());
            async move {
                if attempt < 3 {
                    Err(failure())
                } else {
                    Ok("שלום")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "שלום");
        assert_eq!(*calls.lock().unwrap(), vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(6),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_configured_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = Instant::now();

        let err = retry_with_backoff::<(), _, _>("bot-message", &policy(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(failure()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, Error::Exhausted { attempts: 3, .. }));
        assert!(matches!(err.root(), Error::Status { status: 500, .. }));
        // No pause after the last attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_counts_as_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let value = retry_with_backoff("get-reply", &policy(), move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(attempt)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_reply_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let err = retry_with_backoff::<(), _, _>("get-reply", &policy(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::EmptyReply {
                    function: "get-reply".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::EmptyReply { .. }));
    }
}
