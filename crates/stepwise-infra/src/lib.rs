//! Infrastructure layer for Stepwise.
//!
//! Implements the ports defined in `stepwise-core`: filesystem-backed
//! definition and execution stores, the `config.toml` loader, and the
//! `http` and `shell` action backends.

pub mod backend;
pub mod config;
pub mod filesystem;
