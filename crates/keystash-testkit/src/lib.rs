//! Keystash Testing Infrastructure
//!
//! Engines with scripted behaviour for façade tests, plus tracing setup.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! keystash-testkit = { path = "../keystash-testkit" }
//! ```
//!
//! ```rust,no_run
//! use keystash_testkit::*;
//!
//! let raw = RawEngine::new();
//! raw.seed("theme", "not json");
//! ```

pub mod engines;

pub use engines::{FailingEngine, GatedEngine, RawEngine, ReadyTrigger};

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
