//! Per-model circuit breakers.
//!
//! Each model key moves through three states:
//! - Closed: attempts pass through, consecutive network failures are counted
//! - Open: attempts are rejected until the cooldown elapses
//! - HalfOpen: a single trial attempt is let through; success closes,
//!   failure reopens, and other attempts are rejected while it is in flight
//!
//! All transitions for one key happen under that key's map-entry lock, so
//! concurrent requests never race a read against a write.

use crate::config::CircuitBreakerConfig;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - attempts pass through
    Closed,
    /// Failures reached the threshold - attempts are rejected
    Open,
    /// Cooldown elapsed - one trial attempt at a time tests the model
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    half_open: bool,
    trial_in_flight: bool,
}

/// Breaker state for every model key seen by the executor.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    states: DashMap<String, BreakerState>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check whether an attempt may proceed.
    ///
    /// Returns the remaining cooldown when the breaker is open. An open
    /// breaker whose cooldown has elapsed is moved to half-open here, and
    /// the caller that gets `Ok` holds the only trial slot until it records
    /// an outcome or calls [`release`](Self::release). While the trial is
    /// in flight other callers get `Err(Duration::ZERO)`.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let Some(mut state) = self.states.get_mut(key) else {
            return Ok(());
        };

        if let Some(until) = state.open_until {
            let now = Instant::now();
            if now < until {
                return Err(until - now);
            }
            state.open_until = None;
            state.half_open = true;
            info!(model = %key, "Circuit breaker entering half-open state");
        }

        if state.half_open {
            if state.trial_in_flight {
                return Err(Duration::ZERO);
            }
            state.trial_in_flight = true;
            debug!(model = %key, "Circuit breaker admitted half-open trial");
        }

        Ok(())
    }

    /// Give back a trial slot taken by `check` when the attempt ended
    /// without a success or a breaker-relevant failure.
    pub fn release(&self, key: &str) {
        if let Some(mut state) = self.states.get_mut(key) {
            if state.trial_in_flight {
                state.trial_in_flight = false;
                debug!(model = %key, "Circuit breaker trial released without outcome");
            }
        }
    }

    /// Record a successful attempt, closing the breaker
    pub fn record_success(&self, key: &str) {
        if let Some((_, state)) = self.states.remove(key) {
            if state.half_open || state.consecutive_failures > 0 {
                debug!(
                    model = %key,
                    failures = state.consecutive_failures,
                    "Circuit breaker closed"
                );
            }
        }
    }

    /// Record a network-level failure. Returns true if this opened the breaker.
    pub fn record_failure(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let mut state = self.states.entry(key.to_string()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        debug!(
            model = %key,
            failures = state.consecutive_failures,
            threshold = self.config.failure_threshold,
            "Circuit breaker failure recorded"
        );

        let reopen = state.half_open;
        if reopen || state.consecutive_failures >= self.config.failure_threshold {
            state.open_until = Some(Instant::now() + self.config.cooldown());
            state.half_open = false;
            state.trial_in_flight = false;
            if reopen {
                warn!(model = %key, "Circuit breaker failure in half-open state, reopening");
            } else {
                warn!(
                    model = %key,
                    failures = state.consecutive_failures,
                    cooldown_ms = self.config.cooldown_ms,
                    "Circuit breaker opened"
                );
            }
            return true;
        }

        false
    }

    /// Current state without triggering transitions
    pub fn state(&self, key: &str) -> CircuitState {
        match self.states.get(key) {
            None => CircuitState::Closed,
            Some(state) => match state.open_until {
                Some(until) if Instant::now() < until => CircuitState::Open,
                Some(_) => CircuitState::HalfOpen,
                None if state.half_open => CircuitState::HalfOpen,
                None => CircuitState::Closed,
            },
        }
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.states
            .get(key)
            .map_or(0, |state| state.consecutive_failures)
    }

    /// Force a breaker back to closed
    pub fn reset(&self, key: &str) {
        self.states.remove(key);
    }
}
