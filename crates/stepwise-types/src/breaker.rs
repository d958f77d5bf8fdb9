//! Circuit breaker state and status types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted toward the threshold.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// Trial calls are permitted; one success closes the circuit.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of one breaker (for status output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub service_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub max_failures: u32,
    pub reset_timeout_secs: u64,
    /// Seconds since the most recent recorded failure.
    pub last_failure_secs_ago: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
}
