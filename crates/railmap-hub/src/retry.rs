use std::time::Duration;

/// Delays between connection attempts.
///
/// The schedule is walked once; after the last entry every further attempt
/// waits `steady`. The client never gives up on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub schedule: Vec<Duration>,
    pub steady: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            schedule: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
            steady: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.schedule.get(index).copied().unwrap_or(self.steady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(4), Duration::from_secs(30));
    }

    #[test]
    fn test_steady_after_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(500), Duration::from_secs(30));
    }

    #[test]
    fn test_attempt_zero_uses_first_delay() {
        let policy = RetryPolicy {
            schedule: vec![Duration::from_millis(5)],
            steady: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(5));
    }
}
