//! Bounded exponential backoff for transient store failures
//!
//! Only [`StoreError::Unavailable`] is retried; every other error is
//! surfaced immediately. Past the retry ceiling the last error is returned
//! verbatim.

use std::thread;
use std::time::Duration;

use super::StoreError;

/// Retry policy for transient store errors.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt
    pub base_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based)
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op`, retrying on [`StoreError::Unavailable`] with exponential
/// backoff up to the policy's retry ceiling.
pub fn with_backoff<T, F>(policy: &BackoffPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(StoreError::Unavailable { .. }) if attempt < policy.max_retries => {
                thread::sleep(policy.delay_for(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_success_first_try() {
        let result = with_backoff(&fast_policy(), || Ok::<_, StoreError>(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(), || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable { reason: "flaky".into() })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_ceiling_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable { reason: "down".into() })
        });
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
        // 1 initial attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound("v1".into()))
        });
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_capped() {
        let policy = fast_policy();
        assert!(policy.delay_for(30) <= policy.max_delay);
    }
}
