//! Shared domain types for Stepwise.
//!
//! This crate contains the domain types used across the Stepwise workspace:
//! workflow definitions, execution snapshots and results, circuit breaker
//! status, configuration, and workflow events.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod breaker;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod workflow;
