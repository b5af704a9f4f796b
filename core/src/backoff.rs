//! Exponential backoff curves named in §5: "exponential backoff (1s → 10s
//! floor, 3s → 30s for AWS-style endpoints)".
//!
//! `kube::runtime::Controller` already serializes reconciles per object key
//! and bounds concurrency (§5: "up to 10 keys per loop process in
//! parallel", wired via `.with_config(Config::default().concurrency(..))`
//! at each controller's `run()`, sized from `RuntimeConfig::concurrency`);
//! this module only supplies the requeue `Duration` an `error_policy` hands
//! back to it.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffCurve {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl BackoffCurve {
    /// `2^attempt * floor`, clamped to `ceiling`.
    pub fn next(&self, attempt: u32) -> Duration {
        let scaled = self.floor.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        scaled.min(self.ceiling)
    }
}

/// Default curve for object-store reads/writes: 1s floor, 10s ceiling.
pub const DEFAULT_BACKOFF: BackoffCurve = BackoffCurve {
    floor: Duration::from_secs(1),
    ceiling: Duration::from_secs(10),
};

/// Curve used for cloud-provider calls against AWS-style endpoints, which
/// throttle more aggressively: 3s floor, 30s ceiling.
pub const AWS_ENDPOINT_BACKOFF: BackoffCurve = BackoffCurve {
    floor: Duration::from_secs(3),
    ceiling: Duration::from_secs(30),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_doubles_until_ceiling() {
        assert_eq!(DEFAULT_BACKOFF.next(0), Duration::from_secs(1));
        assert_eq!(DEFAULT_BACKOFF.next(1), Duration::from_secs(2));
        assert_eq!(DEFAULT_BACKOFF.next(2), Duration::from_secs(4));
        assert_eq!(DEFAULT_BACKOFF.next(10), Duration::from_secs(10));
    }

    #[test]
    fn aws_backoff_floor_and_ceiling() {
        assert_eq!(AWS_ENDPOINT_BACKOFF.next(0), Duration::from_secs(3));
        assert_eq!(AWS_ENDPOINT_BACKOFF.next(5), Duration::from_secs(30));
    }
}
