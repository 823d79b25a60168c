use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_CHANNELS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(3);

/// Errors produced when validating limiter settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Capacity must be a finite number greater than zero.
    #[error("capacity must be finite and greater than zero, got {0}")]
    InvalidCapacity(f64),

    /// Leak rate must be a finite, non-negative number of units per second.
    #[error("leak rate must be finite and not negative, got {0}")]
    InvalidLeakRate(f64),

    /// A tick interval was zero.
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

/// Startup settings for a [`ChannelPool`](crate::ChannelPool) and the tasks that run
/// against it. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    /// Number of channels (one leaky bucket each).
    pub channels: NonZeroUsize,
    /// Maximum occupancy of each channel.
    pub capacity: f64,
    /// Units drained per second from each channel.
    pub leak_rate: f64,
    /// Period of the background leak driver.
    pub leak_interval: Duration,
    /// Period between status feed snapshots.
    pub status_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            capacity: 500.0,
            leak_rate: 250.0,
            leak_interval: Duration::from_secs(1),
            status_interval: Duration::from_secs(1),
        }
    }
}

impl LimiterConfig {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bucket(self.capacity, self.leak_rate)?;
        if self.leak_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "leak_interval",
            });
        }
        if self.status_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "status_interval",
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_bucket(capacity: f64, leak_rate: f64) -> Result<(), ConfigError> {
    if !capacity.is_finite() || capacity <= 0.0 {
        return Err(ConfigError::InvalidCapacity(capacity));
    }
    if !leak_rate.is_finite() || leak_rate < 0.0 {
        return Err(ConfigError::InvalidLeakRate(leak_rate));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_service_defaults() {
        let config = LimiterConfig::default();
        assert_eq!(config.channels.get(), 4);
        assert_eq!(config.capacity, 500.0);
        assert_eq!(config.leak_rate, 250.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_bucket_settings() {
        let mut config = LimiterConfig {
            capacity: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidCapacity(0.0)));

        config.capacity = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCapacity(_))
        ));

        config.capacity = 5.0;
        config.leak_rate = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidLeakRate(-1.0)));

        config.leak_rate = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLeakRate(_))
        ));
    }

    #[test]
    fn zero_leak_rate_is_allowed() {
        let config = LimiterConfig {
            leak_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_intervals() {
        let config = LimiterConfig {
            leak_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                field: "leak_interval"
            })
        );

        let config = LimiterConfig {
            status_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                field: "status_interval"
            })
        );
    }
}
