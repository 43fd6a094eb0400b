//! Diagnostic logging
//!
//! Diagnostics go to stderr through `tracing`; stdout carries only the run's
//! result. `RUST_LOG` takes precedence over the configured level.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Build the filter for `level`, letting `RUST_LOG` override it
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level)),
    }
}

/// Install the global subscriber
///
/// Only the first call installs anything; later calls are no-ops.
pub fn init_logging(level: &str) -> Result<()> {
    if INITIALISED.set(()).is_err() {
        return Ok(());
    }

    let filter = build_filter(level)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal());

    // Another subscriber (e.g. a test harness) may already be installed
    if let Err(e) = Registry::default().with(filter).with(fmt_layer).try_init() {
        tracing::debug!("Tracing subscriber already installed: {}", e);
    }
    Ok(())
}
