use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const JITTER_FACTOR: f64 = 0.1;
const MAX_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Invalidate the credential and repeat the call once on an auth failure.
    pub retry_on_auth: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            retry_on_auth: true,
        }
    }

    pub fn without_auth_retry(self) -> Self {
        Self {
            retry_on_auth: false,
            ..self
        }
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// `base * 2^attempt` before jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(MAX_EXPONENT));
        self.base_delay.saturating_mul(factor)
    }

    /// Exponential backoff plus up to 10% random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        let jitter_range = base.as_secs_f64() * JITTER_FACTOR;
        if jitter_range <= 0.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..jitter_range);
        base + Duration::from_secs_f64(jitter)
    }

    /// A server-supplied delay wins over the computed backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.backoff(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

/// Parses a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert!(policy.retry_on_auth);
        assert!(!policy.without_auth_retry().retry_on_auth);
    }

    #[test]
    fn test_exponential_base_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_backoff(0), Duration::from_secs(1));
        assert_eq!(policy.base_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.base_backoff(2), Duration::from_secs(4));
        assert_eq!(policy.base_backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            let base = policy.base_backoff(attempt);
            let upper = base.mul_f64(1.1);
            for _ in 0..50 {
                let delay = policy.backoff(attempt);
                assert!(delay >= base, "attempt {attempt}: {delay:?} < {base:?}");
                assert!(delay <= upper, "attempt {attempt}: {delay:?} > {upper:?}");
            }
        }
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            for _ in 0..20 {
                assert!(policy.backoff(attempt + 1) >= policy.backoff(attempt));
            }
        }
    }

    #[test]
    fn test_large_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_backoff(100), policy.base_backoff(MAX_EXPONENT));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert!(policy.delay_for(0, None) >= Duration::from_secs(1));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
