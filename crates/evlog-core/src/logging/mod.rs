//! Diagnostics for the pipeline itself.
//!
//! Delivery failures, rotation, and setup problems are reported through
//! `tracing`. This module installs the subscriber for the `evlog` binary,
//! human-readable on stderr by default or JSON lines with
//! `format = "jsonl"` in the `[diagnostics]` table.
//!
//! Stdout is reserved for emitted lines and command payloads.

pub mod config;
pub mod layer;

pub use config::{level_filter, resolve_diagnostics};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use std::sync::OnceLock;

use evlog_common::{Diagnostics, DiagnosticsFormat};
use evlog_redact::{RedactionPolicy, Redactor};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static REDACTOR: OnceLock<Redactor> = OnceLock::new();

/// Redactor applied to diagnostic fields. Uses the default policy unless
/// [`set_redactor`] ran first.
pub fn redactor() -> &'static Redactor {
    REDACTOR.get_or_init(|| Redactor::new(&RedactionPolicy::default()))
}

/// Install the diagnostics redactor, normally built from the same policy
/// as the event pipeline. Returns false if one is already in use.
pub fn set_redactor(redactor: Redactor) -> bool {
    REDACTOR.set(redactor).is_ok()
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &Diagnostics) {
    // a full RUST_LOG directive set wins over the resolved level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(level_filter(config.level).into())
    });

    let result = match config.format {
        DiagnosticsFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        DiagnosticsFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("diagnostics subscriber already installed");
    }
}

/// Fresh trace id for events that arrive without one.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
