//! Settings for the pipeline's own diagnostics (delivery failures, setup
//! problems), kept apart from the events the logger emits.
//!
//! ```toml
//! [diagnostics]
//! level = "info"
//! format = "jsonl"
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::env_value;
use crate::error::{Error, Result};

/// Verbosity of diagnostics on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsLevel {
    Trace,
    Debug,
    Info,
    /// Only delivery and setup problems.
    #[default]
    #[serde(alias = "warning")]
    Warn,
    Error,
    #[serde(alias = "quiet")]
    Off,
}

impl FromStr for DiagnosticsLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" | "none" | "quiet" => Ok(Self::Off),
            other => Err(format!("unknown diagnostics level: {other}")),
        }
    }
}

impl fmt::Display for DiagnosticsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        })
    }
}

/// Shape of diagnostics on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsFormat {
    #[default]
    Human,
    #[serde(alias = "json")]
    Jsonl,
}

impl FromStr for DiagnosticsFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Ok(Self::Human),
            "jsonl" | "json" => Ok(Self::Jsonl),
            other => Err(format!("unknown diagnostics format: {other}")),
        }
    }
}

impl fmt::Display for DiagnosticsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Jsonl => "jsonl",
        })
    }
}

/// The `[diagnostics]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostics {
    pub level: DiagnosticsLevel,
    pub format: DiagnosticsFormat,
    /// Timestamps on human output.
    pub timestamps: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            level: DiagnosticsLevel::Warn,
            format: DiagnosticsFormat::Human,
            timestamps: true,
        }
    }
}

impl Diagnostics {
    /// Apply `EVLOG_LOG` and `EVLOG_LOG_FORMAT`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(level) = env_value("EVLOG_LOG") {
            self.level = level
                .parse::<DiagnosticsLevel>()
                .map_err(|e| Error::invalid("EVLOG_LOG", e))?;
        }
        if let Some(format) = env_value("EVLOG_LOG_FORMAT") {
            self.format = format
                .parse::<DiagnosticsFormat>()
                .map_err(|e| Error::invalid("EVLOG_LOG_FORMAT", e))?;
        }
        Ok(self)
    }

    /// Command-line flags win over everything else.
    pub fn with_flags(
        mut self,
        level: Option<DiagnosticsLevel>,
        format: Option<DiagnosticsFormat>,
    ) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        if let Some(format) = format {
            self.format = format;
        }
        self
    }
}
