//! Tracing setup for the server binary.
//!
//! The subscriber starts at `info` so configuration loading is visible, then
//! switches to `[logging] level` once the file has been read. A `RUST_LOG`
//! environment variable wins over both and is never replaced.
//!
//! Grant rejections are logged by `tollgate_auth` with the specific failure
//! kind at `warn`, while the wire response only ever says `invalid_grant`.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Connection-level crates that are noisy below `warn`.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "hyper_util=warn", "h2=warn"];

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Builds the filter directive string for a configured level.
pub fn directives(level: &str) -> String {
    std::iter::once(level.to_ascii_lowercase())
        .chain(QUIET_TARGETS.iter().map(|t| (*t).to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn env_override() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

/// Installs the global subscriber. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = env_override().unwrap_or_else(|| EnvFilter::new(directives("info")));
    let (layer, handle) = reload::Layer::new(filter);
    if FILTER.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switches to the configured level unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(directives(level))) {
        tracing::warn!(error = %e, level, "Could not change log level");
    }
}
