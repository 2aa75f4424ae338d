//! Bounded retry with exponential backoff and jitter.

use std::time::Duration;

use tracing::warn;

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth another attempt after a backoff delay.
    Transient,
    /// Retrying cannot help (unknown id, exhausted precondition).
    Permanent,
}

/// Retry policy for one unit of work.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
    /// Randomize each delay within `[delay/2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based): `min_backoff * factor^(attempt-1)`, clamped to
    /// `max_backoff`, optionally jittered.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.min_backoff.as_millis() as f64
            * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.max_backoff.as_millis() as f64);
        let ms = if self.jitter {
            use rand::Rng;
            capped * rand::rng().random_range(0.5..=1.0)
        } else {
            capped
        };
        Duration::from_millis(ms as u64)
    }
}

/// Run `op` until it succeeds, a permanent failure occurs, or the attempt
/// budget is spent. The final error is returned as-is.
pub async fn run_with_retry<T, E, Fut, Op, Classify>(
    policy: &RetryPolicy,
    mut op: Op,
    classify: Classify,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> FailureKind,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && classify(&e) == FailureKind::Transient => {
                let delay = policy.backoff(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_sequence_without_jitter() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        // 16s exceeds the cap.
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for attempt in 1..=5 {
            let delay = policy.backoff(attempt);
            let ceiling = RetryPolicy {
                jitter: false,
                ..RetryPolicy::default()
            }
            .backoff(attempt);
            assert!(delay <= ceiling);
            assert!(delay >= ceiling / 2);
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, String> = run_with_retry(
            &fast_policy(),
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok("done")
                }
            },
            |_| FailureKind::Transient,
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_bounded() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), String> = run_with_retry(
            &fast_policy(),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("always broken".to_string())
            },
            |_| FailureKind::Transient,
        )
        .await;

        assert_eq!(result.unwrap_err(), "always broken");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_short_circuits() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), String> = run_with_retry(
            &fast_policy(),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("not found".to_string())
            },
            |_| FailureKind::Permanent,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
