//! Runtime layer for Runway.
//!
//! This module provides the cascading executor that sits between callers
//! and the provider adapters. It is responsible for:
//! - Resolving context windows and token budgets per candidate
//! - Building the fallback chain for each request
//! - Gating every attempt through a per-model circuit breaker and a shared rate limiter
//! - Walking the chain until a candidate succeeds, the chain is exhausted, or the caller cancels

pub mod circuit_breaker;
pub mod executor;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreakerRegistry, CircuitState};
pub use executor::{
    CascadingExecutor, CascadingExecutorBuilder, ChainStrategy, ExecuteOptions, Execution,
    StreamExecution,
};
pub use rate_limit::RateLimiter;
