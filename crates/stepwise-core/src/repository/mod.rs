//! Repository trait definitions (ports).
//!
//! The infrastructure layer (stepwise-infra) implements these traits; the
//! core crate never depends on a specific storage technology.

pub mod workflow;

pub use workflow::{DefinitionRepository, ExecutionRepository};
