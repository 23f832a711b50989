//! Tracing/logging initialization for applications embedding a relay.
//!
//! The relay itself only emits `tracing` events; installing a subscriber is
//! left to the binary, which can use this helper or its own setup.

use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::RelayConfig;
use crate::error::{Error, Result};

type FmtLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Filter directive scoping `level` to this crate's events.
pub fn crate_filter(level: &str) -> String {
    format!("stream_relay={level}")
}

/// Build the filter from `RUST_LOG` when it is set and non-blank, otherwise
/// from `default_filter`.
fn build_filter(rust_log: Option<String>, default_filter: &str) -> Result<EnvFilter> {
    let directives = rust_log
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| default_filter.to_string());
    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("invalid log filter {directives:?}: {e}")))
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- filter used when `RUST_LOG` is unset
///   (e.g. `"stream_relay=debug"`).
/// * `log_json` -- emit structured JSON lines instead of the human-readable
///   format.
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<bool> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), default_filter)?;
    let fmt_layer: FmtLayer = if log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok())
}

/// Initialise tracing from a loaded [`RelayConfig`].
pub fn init_from_config(config: &RelayConfig) -> Result<bool> {
    init_tracing(&crate_filter(&config.log_level), config.log_json)
}
