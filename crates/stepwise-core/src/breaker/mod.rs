//! Per-service circuit breakers.
//!
//! `CircuitBreaker` is the three-state failure gate for one service;
//! `CircuitBreakerManager` is the process-local registry that hands out one
//! breaker per service ID and wraps fallible calls with breaker bookkeeping.

pub mod circuit;
pub mod manager;

pub use circuit::{CircuitBreaker, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT};
pub use manager::{CircuitBreakerManager, CircuitOpenError};
