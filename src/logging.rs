//! Logging bootstrap for tests and standalone examples.
//!
//! This crate never installs a global `tracing` subscriber on its own — it's
//! a library, and the host process owns process bootstrap. Every component
//! logs through plain `tracing` macros; this module only exists to give
//! tests and doctests a subscriber to log into, following the non-blocking
//! `tracing_subscriber::fmt` + `EnvFilter` setup the rest of the codebase
//! uses.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a pretty, env-filtered subscriber for the current test binary.
///
/// Idempotent: safe to call from every test that wants logging, only the
/// first call takes effect.
pub fn init_test_subscriber() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("suggest_core=debug"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
