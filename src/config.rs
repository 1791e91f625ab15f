//! Configuration for circuit breakers.

use std::time::Duration;

use crate::error::ConfigError;

/// Immutable per-breaker settings, fixed when the breaker is created.
///
/// Every value is positive and neither timeout exceeds
/// [`MAX_TIMEOUT`](Self::MAX_TIMEOUT). The only ways to obtain one are
/// [`BreakerConfig::default`] and [`BreakerConfig::builder`], which validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    failure_threshold: u32,
    success_threshold: u32,
    call_timeout: Duration,
    reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            call_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    /// Upper bound for `call_timeout` and `reset_timeout`.
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Starts a builder seeded with the defaults.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// Starts a builder seeded with this config's values.
    pub fn to_builder(self) -> BreakerConfigBuilder {
        BreakerConfigBuilder { config: self }
    }

    pub(crate) const fn from_parts(
        failure_threshold: u32,
        success_threshold: u32,
        call_timeout: Duration,
        reset_timeout: Duration,
    ) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            call_timeout,
            reset_timeout,
        }
    }

    /// Consecutive failures that trip a closed breaker.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Consecutive half-open successes that close the breaker.
    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    /// Longest a protected call may run before it counts as a failure.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// How long an open breaker rejects calls before letting a trial call through.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::NonPositive {
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::NonPositive {
                field: "success_threshold",
            });
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "call_timeout",
            });
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "reset_timeout",
            });
        }
        for (field, timeout) in [
            ("call_timeout", self.call_timeout),
            ("reset_timeout", self.reset_timeout),
        ] {
            if timeout > Self::MAX_TIMEOUT {
                return Err(ConfigError::TooLarge {
                    field,
                    max: Self::MAX_TIMEOUT,
                });
            }
        }
        Ok(self)
    }
}

/// Builder for [`BreakerConfig`].
#[derive(Debug, Clone)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: BreakerConfig::default(),
        }
    }

    /// Sets the number of consecutive failures required to trip the circuit.
    pub fn failure_threshold(mut self, count: u32) -> Self {
        self.config.failure_threshold = count;
        self
    }

    /// Sets the number of consecutive successes required to reset the circuit.
    pub fn success_threshold(mut self, count: u32) -> Self {
        self.config.success_threshold = count;
        self
    }

    /// Sets the per-call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Sets the cooldown before an open circuit lets a trial call through.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        self.config.validate()
    }
}
