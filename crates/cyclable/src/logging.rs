//! Logging initialization
//!
//! Installs a `tracing` fmt subscriber filtered by `RUST_LOG`. When `RUST_LOG` is
//! not set, a default filter is used: `debug` for debug builds, `info` otherwise,
//! with the HTTP stack kept quiet. With the `profiling` feature, `profiling`
//! scopes show up as tracing spans in the same output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEBUG_FILTER: &str = "debug,hyper_util=info,reqwest::connect=info,rustls=info";
const RELEASE_FILTER: &str = "info,hyper_util=warn,reqwest=warn";

fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        DEBUG_FILTER
    } else {
        RELEASE_FILTER
    }
}

pub fn setup_logging() {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_filter()),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        tracing::warn!("Logging was already initialized");
    }
}

/// Log version info
pub fn log_version_info() {
    tracing::info!(
        "{} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
    );
}
