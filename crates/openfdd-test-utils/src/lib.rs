#![deny(unsafe_code)]

//! Shared test utilities for the OpenFDD client workspace.
//!
//! Provides a scripted [`MockDaemon`](daemon::MockDaemon), a config builder,
//! and tracing helpers so crate tests can exercise real socket I/O without a
//! running OpenFDD daemon.
//!
//! ```toml
//! [dev-dependencies]
//! openfdd-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use daemon::{MockDaemon, Reply};
