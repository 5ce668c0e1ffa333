use std::time::Duration;

/// How often, and how patiently, a job is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry. Each subsequent retry waits twice as long.
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
}

pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

impl RetryPolicy {
    pub fn webhooks() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            max_backoff: DEFAULT_MAX_BACKOFF,
            initial_delay: Duration::ZERO,
        }
    }

    /// Couriers often need a few minutes before a new tracking number is known to their systems, hence the grace
    /// period before the first lookup.
    pub fn tracking() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            max_backoff: DEFAULT_MAX_BACKOFF,
            initial_delay: Duration::from_secs(5 * 60),
        }
    }

    /// The delay after a failed attempt number `attempt` (starting at 1).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exponent).min(self.max_backoff)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = RetryPolicy::tracking();
        let delays = (1..=4).map(|a| policy.backoff_for(a).as_secs()).collect::<Vec<_>>();
        assert_eq!(delays, vec![5, 10, 20, 40]);
        assert_eq!(policy.backoff_for(30), DEFAULT_MAX_BACKOFF);
        assert_eq!(RetryPolicy::webhooks().backoff_for(1), Duration::from_secs(2));
        assert!(policy.is_exhausted(5));
        assert!(!policy.is_exhausted(4));
    }
}
