//! Bounded retry for single transport calls

use chainfs_core::config::TransferConfig;
use chainfs_core::ChainfsResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Longest single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &TransferConfig) -> Self {
        Self {
            max_attempts: cfg.max_retry.max(1),
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }

    /// No sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// Sleep before attempt `attempt + 1`, after `attempt` failures.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Run `op` until it succeeds, fails with a non-transport error, or
/// `policy.max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> ChainfsResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ChainfsResult<T>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transport() && attempt < max => {
                warn!(what, attempt, max_attempts = max, error = %e, "attempt failed, retrying");
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                warn!(what, attempt, max_attempts = max, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfs_core::ChainfsError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_last_allowed_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "op", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(ChainfsError::Transport("flaky".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ChainfsResult<()> = with_retry(&RetryPolicy::immediate(3), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainfsError::Transport("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(ChainfsError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transport_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ChainfsResult<()> = with_retry(&RetryPolicy::immediate(5), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainfsError::Crypto("bad key".into())) }
        })
        .await;

        assert!(matches!(result, Err(ChainfsError::Crypto(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(20), MAX_BACKOFF);
        assert_eq!(RetryPolicy::immediate(3).delay_after(2), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_means_one() {
        let cfg = TransferConfig {
            max_retry: 0,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&cfg).max_attempts, 1);
    }
}
