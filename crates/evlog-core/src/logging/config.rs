//! Diagnostics settings for the `evlog` binary.
//!
//! The `[diagnostics]` table of the evlog config, with `EVLOG_LOG` and
//! `EVLOG_LOG_FORMAT` applied, is the base; command-line flags win. A full
//! `RUST_LOG` directive set replaces the level filter at install time.

use evlog_common::{Config, Diagnostics, DiagnosticsFormat, DiagnosticsLevel};
use tracing_subscriber::filter::LevelFilter;

/// Settings to install before a command runs.
///
/// Without a loaded config (missing or broken) the table defaults apply,
/// still under the environment overrides when those parse.
pub fn resolve_diagnostics(
    config: Option<&Config>,
    level: Option<DiagnosticsLevel>,
    format: Option<DiagnosticsFormat>,
) -> Diagnostics {
    let base = match config {
        Some(config) => config.diagnostics.clone(),
        None => Diagnostics::default()
            .with_env_overrides()
            .unwrap_or_default(),
    };
    base.with_flags(level, format)
}

pub fn level_filter(level: DiagnosticsLevel) -> LevelFilter {
    match level {
        DiagnosticsLevel::Trace => LevelFilter::TRACE,
        DiagnosticsLevel::Debug => LevelFilter::DEBUG,
        DiagnosticsLevel::Info => LevelFilter::INFO,
        DiagnosticsLevel::Warn => LevelFilter::WARN,
        DiagnosticsLevel::Error => LevelFilter::ERROR,
        DiagnosticsLevel::Off => LevelFilter::OFF,
    }
}
