//! Retry with exponential backoff around collaborator calls.
//!
//! `delay = 2^attempt * base + jitter`, where `attempt` counts failures so far
//! (starting at 0), `base` depends on the failure class and `jitter` is drawn
//! uniformly from `0..=max_jitter`. Only errors that report a
//! [`TransientKind`] are retried; everything else surfaces on first occurrence.
//! Exhaustion surfaces as [`Error::ServiceUnavailable`].

use crate::error::{Error, Result, TransientKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Largest exponent applied to a base delay.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub rate_limit_base_ms: u64,
    pub server_fault_base_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_base_ms: 2500,
            server_fault_base_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self, kind: TransientKind) -> Duration {
        Duration::from_millis(match kind {
            TransientKind::RateLimit => self.rate_limit_base_ms,
            TransientKind::ServerFault => self.server_fault_base_ms,
        })
    }

    /// Delay before the retry that follows failure number `attempt` (0-based).
    pub fn backoff(&self, kind: TransientKind, attempt: u32, jitter: Duration) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay(kind).saturating_mul(factor).saturating_add(jitter)
    }
}

type JitterSource = Arc<dyn Fn(u64) -> u64 + Send + Sync>;

/// Applies a [`RetryPolicy`] to arbitrary async operations.
#[derive(Clone)]
pub struct Resilience {
    policy: RetryPolicy,
    jitter: JitterSource,
}

impl std::fmt::Debug for Resilience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience").field("policy", &self.policy).finish()
    }
}

impl Resilience {
    /// Uniform random jitter in `0..=max_jitter_ms`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_jitter(policy, |max| rand::thread_rng().gen_range(0..=max))
    }

    /// Custom jitter source; it receives `max_jitter_ms` and returns milliseconds.
    pub fn with_jitter<F>(policy: RetryPolicy, jitter: F) -> Self
    where
        F: Fn(u64) -> u64 + Send + Sync + 'static,
    {
        Self {
            policy,
            jitter: Arc::new(jitter),
        }
    }

    /// Runs `op` until it succeeds, fails permanently or the attempts run out.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let Some(kind) = err.transient_kind() else {
                return Err(err);
            };
            if attempt + 1 >= max_attempts {
                return Err(Error::ServiceUnavailable {
                    attempts: attempt + 1,
                    last: err.to_string(),
                });
            }

            let jitter_ms = (self.jitter)(self.policy.max_jitter_ms).min(self.policy.max_jitter_ms);
            let delay = self.policy.backoff(kind, attempt, Duration::from_millis(jitter_ms));
            warn!(
                call = label,
                attempt = attempt + 1,
                %kind,
                delay_ms = delay.as_millis() as u64,
                "collaborator call failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        let none = Duration::ZERO;
        assert_eq!(policy.backoff(TransientKind::RateLimit, 0, none), Duration::from_millis(2500));
        assert_eq!(policy.backoff(TransientKind::RateLimit, 3, none), Duration::from_millis(20_000));
        assert_eq!(policy.backoff(TransientKind::ServerFault, 2, none), Duration::from_millis(4000));
        assert_eq!(
            policy.backoff(TransientKind::ServerFault, 0, Duration::from_millis(999)),
            Duration::from_millis(1999)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let resilience = Resilience::with_jitter(RetryPolicy::default(), |_| 0);
        let result: Result<()> = resilience
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::response("garbage", "???")) }
            })
            .await;
        assert!(matches!(result, Err(Error::ServiceResponse { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_becomes_service_unavailable() {
        let calls = AtomicU32::new(0);
        let resilience = Resilience::with_jitter(RetryPolicy::default(), |_| 0);
        let result: Result<()> = resilience
            .call("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::transient(TransientKind::ServerFault, "503")) }
            })
            .await;
        assert!(matches!(result, Err(Error::ServiceUnavailable { attempts: 5, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn random_jitter_stays_in_range() {
        let resilience = Resilience::new(RetryPolicy::default());
        for _ in 0..200 {
            assert!((resilience.jitter)(1000) <= 1000);
        }
    }
}
