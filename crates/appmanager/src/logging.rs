//! Logging setup shared by the CLI and the daemon

use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Filter directive for a base level raised by `-v` flags
pub fn level_for(default_level: &str, verbosity: u8) -> &'static str {
    let base = LEVELS
        .iter()
        .position(|level| *level == default_level)
        .unwrap_or(2);
    LEVELS[(base + verbosity as usize).min(LEVELS.len() - 1)]
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the level derived from `default_level` and
/// `verbosity`. Logs go to stderr so command output stays parseable.
pub fn init(default_level: &str, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(default_level, verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
