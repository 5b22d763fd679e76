use broker::Settlement;

/// What to do with a message whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Republish carrying this retry count.
    Retry { retry_count: u32 },
    /// Give up and dead-letter.
    DeadLetter,
}

impl From<RetryDecision> for Settlement {
    fn from(decision: RetryDecision) -> Self {
        match decision {
            RetryDecision::Retry { retry_count } => Settlement::Retry { retry_count },
            RetryDecision::DeadLetter => Settlement::DeadLetter,
        }
    }
}

/// Bounded retry policy keyed on the `x-retry-count` header.
///
/// A message is handled at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decides the fate of a failed message that carried `retry_count`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::Retry {
                retry_count: retry_count + 1,
            }
        } else {
            RetryDecision::DeadLetter
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_until_max_then_dead_letters() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0), RetryDecision::Retry { retry_count: 1 });
        assert_eq!(policy.decide(1), RetryDecision::Retry { retry_count: 2 });
        assert_eq!(policy.decide(2), RetryDecision::Retry { retry_count: 3 });
        assert_eq!(policy.decide(3), RetryDecision::DeadLetter);
        assert_eq!(policy.decide(17), RetryDecision::DeadLetter);
    }

    #[test]
    fn test_failing_message_is_attempted_max_plus_one_times() {
        let policy = RetryPolicy::new(3);
        let mut retry_count = 0;
        let mut attempts = 1;
        let mut seen = Vec::new();
        while let RetryDecision::Retry { retry_count: next } = policy.decide(retry_count) {
            seen.push(next);
            retry_count = next;
            attempts += 1;
        }
        assert_eq!(attempts, 4);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_retries_dead_letters_immediately() {
        assert_eq!(RetryPolicy::new(0).decide(0), RetryDecision::DeadLetter);
    }

    #[test]
    fn test_decision_maps_to_settlement() {
        assert_eq!(
            Settlement::from(RetryDecision::Retry { retry_count: 2 }),
            Settlement::Retry { retry_count: 2 }
        );
        assert_eq!(Settlement::from(RetryDecision::DeadLetter), Settlement::DeadLetter);
    }
}
