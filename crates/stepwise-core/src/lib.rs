//! Resilience and orchestration core for Stepwise.
//!
//! This crate holds the per-service circuit breaker manager and the workflow
//! execution engine, plus the "ports" (repository and backend traits) that
//! the infrastructure layer implements. It depends only on `stepwise-types`
//! -- never on `stepwise-infra` or any network/filesystem crate.

pub mod breaker;
pub mod event;
pub mod repository;
pub mod workflow;
