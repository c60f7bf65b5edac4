//! Retry budgets and exponential backoff with full jitter (spec §4.5).

use std::time::Duration;

use rand::Rng;

/// Operation classes carry independent retry-budget defaults (spec §4.5
/// "Retry budget by elapsed wall clock ... Operation classes: login,
/// query, file transfer, each with independent defaults and overrides").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Login,
    Query,
    FileTransfer,
    Chunk,
}

impl OperationClass {
    /// Wall-clock retry budget, or `None` for "unlimited until context"
    /// (query class, spec §4.5).
    pub fn budget(self) -> Option<Duration> {
        match self {
            OperationClass::Login => Some(Duration::from_secs(60)),
            OperationClass::Query => None,
            OperationClass::FileTransfer => Some(Duration::from_secs(900)),
            OperationClass::Chunk => Some(Duration::from_secs(120)),
        }
    }

    pub fn max_attempts(self) -> u32 {
        match self {
            OperationClass::Login => 5,
            OperationClass::Query => 10,
            OperationClass::FileTransfer => 5,
            OperationClass::Chunk => 7,
        }
    }
}

/// Exponential backoff with full jitter: `delay = uniform(0, min(ceiling,
/// floor * 2^attempt))` (spec §4.5: floor 1s, ceil 16s).
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(16),
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before the `attempt`th retry (0-indexed: the
    /// first retry is `attempt == 0`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.floor.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exp.min(self.ceiling.as_secs_f64());
        let jittered = rand::thread_rng().gen_range(0.0..=capped);
        Duration::from_secs_f64(jittered)
    }
}

/// Honors a server `Retry-After` header expressed in seconds, falling
/// back to `default` when absent or unparseable (the warehouse protocol
/// does not use the HTTP-date form).
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_never_exceeds_ceiling() {
        let policy = BackoffPolicy::default();
        for attempt in 0..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay <= policy.ceiling);
        }
    }

    #[test]
    fn query_class_has_no_wall_clock_budget() {
        assert!(OperationClass::Query.budget().is_none());
    }

    #[test]
    fn login_class_budget_is_60s() {
        assert_eq!(OperationClass::Login.budget(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn retry_after_parses_seconds() {
        let d = parse_retry_after("5", Duration::from_secs(1));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn retry_after_falls_back_on_garbage() {
        let d = parse_retry_after("not-a-number", Duration::from_secs(3));
        assert_eq!(d, Duration::from_secs(3));
    }
}
