//! Concrete action backends.
//!
//! The simulated `ui` backend lives in stepwise-core; this module adds the
//! backends that touch the outside world:
//! - `http`: one request per step via reqwest (circuit-breaker guarded)
//! - `shell`: one `sh -c` command per step via tokio::process

pub mod http;
pub mod shell;

pub use http::HttpBackend;
pub use shell::ShellBackend;

use stepwise_core::workflow::BackendRegistry;

/// Registry with every built-in backend: `ui`, `http`, and `shell`.
pub fn builtin_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::with_defaults();
    registry.register(HttpBackend::new());
    registry.register(ShellBackend::new());
    registry
}
