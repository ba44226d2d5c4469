//! Settlement timing and resilience settings.

use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;

/// Tunables for placement polling, the sweeper and remote calls.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Status queries made after the initial settle attempt.
    pub poll_attempts: u32,
    /// Pause between two status queries.
    pub poll_delay: Duration,
    /// Pause between the settle attempt and the first status query.
    pub initial_delay: Duration,
    /// Period of the pending reconciliation sweep.
    pub sweep_interval: Duration,
    /// Upper bound for every individual remote call.
    pub remote_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl SettlementConfig {
    /// Longest time placement can spend waiting on confirmation, excluding
    /// the remote calls themselves.
    pub fn max_confirmation_wait(&self) -> Duration {
        self.initial_delay + self.poll_delay * self.poll_attempts.saturating_sub(1)
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 5,
            poll_delay: Duration::from_millis(800),
            initial_delay: Duration::ZERO,
            sweep_interval: Duration::from_secs(30),
            remote_timeout: Duration::from_secs(3),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}
