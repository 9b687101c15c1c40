use std::{collections::HashMap, time::Duration};

/// Base delay of the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
/// Upper bound of any retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ExponentialLimiter {
    base: Duration,
    max: Duration,
    failures: HashMap<String, u32>,
}

impl Default for ExponentialLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ExponentialLimiter {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Delay before the next retry of `key`; counts as one more failure.
    pub fn when(&mut self, key: &str) -> Duration {
        let failures = self.failures.entry(key.to_string()).or_insert(0);
        let exp = *failures;
        *failures = failures.saturating_add(1);

        let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }

    pub fn forget(&mut self, key: &str) {
        self.failures.remove(key);
    }

    pub fn retries(&self, key: &str) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let mut l = ExponentialLimiter::default();
        assert_eq!(l.when("a"), Duration::from_millis(5));
        assert_eq!(l.when("a"), Duration::from_millis(10));
        assert_eq!(l.when("a"), Duration::from_millis(20));
        assert_eq!(l.retries("a"), 3);

        assert_eq!(l.when("b"), Duration::from_millis(5), "keys are independent");

        for _ in 0..40 {
            l.when("a");
        }
        assert_eq!(l.when("a"), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn forget_resets() {
        let mut l = ExponentialLimiter::default();
        l.when("a");
        l.when("a");
        l.forget("a");
        assert_eq!(l.retries("a"), 0);
        assert_eq!(l.when("a"), Duration::from_millis(5));
    }
}
