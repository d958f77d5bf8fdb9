//! Observability setup for Stepwise: the global tracing subscriber and the
//! optional OpenTelemetry span bridge.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};
