use std::time::Duration;

/// Escalation policy for consecutive failed poll cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay of the first backoff sleep
    pub base: Duration,
    /// Consecutive failures before backing off
    pub threshold: u32,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5000),
            threshold: 5,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Backoff to apply after `consecutive_failures` failed cycles, if any.
    ///
    /// Doubles per failure past the threshold, capped at `max_delay`.
    pub fn delay(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures < self.threshold {
            return None;
        }

        let exponent = consecutive_failures - self.threshold;
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(5),
            threshold: 5,
            max_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_no_backoff_below_threshold() {
        let p = policy();
        for n in 0..5 {
            assert_eq!(p.delay(n), None);
        }
        assert_eq!(p.delay(5), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let p = policy();
        let delays: Vec<_> = (5..10).map(|n| p.delay(n).unwrap().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60]);
    }

    #[test]
    fn test_non_decreasing_and_bounded() {
        let p = policy();
        let mut last = Duration::ZERO;
        for n in 0..200 {
            let d = p.delay(n).unwrap_or(Duration::ZERO);
            assert!(d >= last, "delay decreased at failure {}", n);
            assert!(d <= p.max_delay);
            last = d;
        }
        assert_eq!(p.delay(u32::MAX), Some(p.max_delay));
    }
}
