//! Circuit Breaker pattern implementation.
//!
//! Stops a batch from grinding through a dead dependency one posting at a
//! time by tracking the running error rate.
//!
//! ## Rule
//!
//! > Once at least **10** postings have been attempted, a running error
//! > rate above **50%** aborts the rest of the batch.

use crate::models::BatchConfig;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Attempts required before the rate is judged at all
    pub min_samples: usize,
    /// Highest tolerated error rate (0-1); strictly above this trips
    pub max_error_rate: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            max_error_rate: 0.5,
        }
    }
}

impl From<&BatchConfig> for CircuitBreakerConfig {
    fn from(config: &BatchConfig) -> Self {
        Self {
            min_samples: config.min_jobs_for_fail_fast,
            max_error_rate: config.error_rate_threshold,
        }
    }
}

/// Result of a circuit breaker check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitBreakerResult {
    /// Error rate within budget
    Healthy { attempted: usize, errors: usize },
    /// Too few attempts to judge yet
    Warmup { attempted: usize },
    /// Budget exceeded - abort the batch
    Tripped {
        attempted: usize,
        errors: usize,
        error_rate: f64,
    },
}

impl CircuitBreakerResult {
    pub fn is_tripped(&self) -> bool {
        matches!(self, Self::Tripped { .. })
    }
}

/// Running error budget for one batch.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    attempted: usize,
    errors: usize,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            attempted: 0,
            errors: 0,
        }
    }

    pub fn record_success(&mut self) -> CircuitBreakerResult {
        self.attempted += 1;
        self.check()
    }

    pub fn record_failure(&mut self) -> CircuitBreakerResult {
        self.attempted += 1;
        self.errors += 1;
        self.check()
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn error_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.errors as f64 / self.attempted as f64
    }

    /// Judge the counts recorded so far.
    pub fn check(&self) -> CircuitBreakerResult {
        let attempted = self.attempted;
        if attempted < self.config.min_samples {
            return CircuitBreakerResult::Warmup { attempted };
        }

        let error_rate = self.error_rate();
        if error_rate > self.config.max_error_rate {
            log::error!(
                "Circuit breaker: TRIGGERED! {}/{} postings failed ({:.1}% > {:.0}% threshold)",
                self.errors,
                attempted,
                error_rate * 100.0,
                self.config.max_error_rate * 100.0
            );
            return CircuitBreakerResult::Tripped {
                attempted,
                errors: self.errors,
                error_rate,
            };
        }

        CircuitBreakerResult::Healthy {
            attempted,
            errors: self.errors,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
