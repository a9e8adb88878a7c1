//! Process-wide logging setup, shared by every `frank-*` binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Human-readable, ANSI-colored logging for interactive terminal use.
///
/// Uses the `RUST_LOG` environment variable if set, otherwise falls back to
/// `default_level` (e.g. "info", "debug", "frank_cloud=debug,warn"). Safe to
/// call multiple times -- later calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (human-readable)");
}

/// Newline-delimited JSON logging for daemon/agent processes whose stdout is
/// shipped to a log collector rather than read by a human.
///
/// Uses the `RUST_LOG` environment variable if set, otherwise falls back to
/// `default_level`. Safe to call multiple times -- later calls are no-ops.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(false)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}
