//! Retry backoff policies.
//!
//! The engine sleeps for [`BackoffPolicy::delay`] after a failed attempt
//! before dispatching again. Linear backoff is the default; exponential
//! backoff mirrors the usual connection-retry shape with a clamp.

use std::time::Duration;

/// Backoff applied between dispatch attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// `delay = retry_count * unit`.
    Linear { unit: Duration },
    /// `delay = initial * multiplier^(retry_count - 1)`, clamped to `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Linear {
            unit: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Linear policy with the given unit.
    pub fn linear(unit: Duration) -> Self {
        Self::Linear { unit }
    }

    /// Delay to wait after the failure that brought the counter to
    /// `retry_count`. A count of zero never waits.
    pub fn delay(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        match self {
            Self::Linear { unit } => unit.saturating_mul(retry_count),
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(retry_count.saturating_sub(1) as i32);
                let ms = (initial.as_millis() as f64 * factor).min(max.as_millis() as f64);
                Duration::from_millis(ms as u64).min(*max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_scales_with_retry_count() {
        let policy = BackoffPolicy::linear(Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(5), Duration::from_secs(5));
    }

    #[test]
    fn zero_retries_never_waits() {
        assert_eq!(BackoffPolicy::default().delay(0), Duration::ZERO);
    }

    #[test]
    fn exponential_sequence_clamps_at_max() {
        let policy = BackoffPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        };
        let expected = [1, 2, 4, 8, 16, 30, 30];
        for (i, &secs) in expected.iter().enumerate() {
            assert_eq!(policy.delay(i as u32 + 1), Duration::from_secs(secs));
        }
    }

    #[test]
    fn exponential_custom_multiplier() {
        let policy = BackoffPolicy::Exponential {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
            multiplier: 3.0,
        };
        assert_eq!(policy.delay(2), Duration::from_secs(6));
    }
}
