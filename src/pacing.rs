//! Inter-send pacing.

use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// Supplies the delay to wait between two sends.
pub trait PacingPolicy: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Delay drawn uniformly from `[min, max]` on every call. No state, no
/// backoff.
#[derive(Debug, Clone, Copy)]
pub struct UniformPacing {
    min: Duration,
    max: Duration,
}

impl UniformPacing {
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidValue {
                key: "min_delay".to_string(),
                message: format!("{min:?} is greater than max_delay {max:?}"),
            });
        }
        Ok(Self { min, max })
    }
}

impl PacingPolicy for UniformPacing {
    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs).clamp(self.min, self.max)
    }
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl PacingPolicy for NoPacing {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_bounds() {
        let min = Duration::from_secs(2);
        let max = Duration::from_secs(8);
        let pacing = UniformPacing::new(min, max).unwrap();
        for _ in 0..1_000 {
            let d = pacing.next_delay();
            assert!(d >= min && d <= max, "{d:?} outside [{min:?}, {max:?}]");
        }
    }

    #[test]
    fn delays_are_not_constant() {
        let pacing = UniformPacing::new(Duration::from_secs(2), Duration::from_secs(8)).unwrap();
        let first = pacing.next_delay();
        assert!((0..100).any(|_| pacing.next_delay() != first));
    }

    #[test]
    fn degenerate_interval_is_fixed() {
        let d = Duration::from_millis(1500);
        let pacing = UniformPacing::new(d, d).unwrap();
        assert_eq!(pacing.next_delay(), d);
    }

    #[test]
    fn inverted_interval_rejected() {
        assert!(UniformPacing::new(Duration::from_secs(3), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn no_pacing_is_zero() {
        assert_eq!(NoPacing.next_delay(), Duration::ZERO);
    }
}
