//! Logger configuration.
//!
//! A [`Config`] is loaded from a file (TOML, JSON or YAML), then overridden
//! by `EVLOG_*` environment variables, then validated. Resolution of the
//! file location lives in [`resolve`].

mod diagnostics;
mod resolve;

pub use diagnostics::{Diagnostics, DiagnosticsFormat, DiagnosticsLevel};
pub use resolve::{ConfigResolver, ConfigSource};

use std::env;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::event::Level;

/// Default sensitive field names.
pub const DEFAULT_SENSITIVE: &[&str] = &["password", "secure", "token", "accessToken"];

/// Default masking rules, `threshold:left*right`, matched in order.
pub const DEFAULT_SENSITIVE_RULE: &[&str] = &["12:4*4", "11:3*4", "7:2*2", "3:1*1", "2:1*0"];

/// Default path prefixes cut from `callStacks` frames: the crate caches, so
/// dependency frames read `name-1.2.3/src/lib.rs`.
pub const DEFAULT_TRUNCATIONS: &[&str] = &[".cargo/registry/src/", ".cargo/git/checkouts/"];

/// Maximum tick interval accepted by [`Config::validate`].
pub const MAX_TICK_MS: u64 = 1000;

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Application name; empty means resolve from the environment.
    pub name: String,
    /// Minimum level for leveled messages.
    pub level: Level,
    /// Destination URI; empty means stdout.
    #[serde(alias = "file")]
    pub destination: String,
    /// Skip redaction and key normalization.
    pub fast: bool,
    /// strftime pattern for day-based file rotation; empty disables it.
    pub split_tag: String,
    #[serde(deserialize_with = "list_or_csv")]
    pub sensitive: Vec<String>,
    #[serde(deserialize_with = "list_or_csv")]
    pub regex_sensitive: Vec<String>,
    #[serde(deserialize_with = "list_or_csv")]
    pub sensitive_rule: Vec<String>,
    /// Path prefixes cut from `callStacks` frames, applied in order.
    #[serde(deserialize_with = "list_or_csv")]
    pub truncations: Vec<String>,
    /// Maximum redaction depth.
    pub max_depth: usize,
    /// Delivery loop tick interval in milliseconds.
    pub tick_ms: u64,
    /// Queue size above which a bulk writer flushes early.
    pub bulk_threshold: usize,
    /// The pipeline's own stderr output. Last so TOML renders it as a table.
    pub diagnostics: Diagnostics,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: String::new(),
            level: Level::Info,
            destination: String::new(),
            fast: false,
            split_tag: String::new(),
            sensitive: DEFAULT_SENSITIVE.iter().map(|s| s.to_string()).collect(),
            regex_sensitive: Vec::new(),
            sensitive_rule: DEFAULT_SENSITIVE_RULE
                .iter()
                .map(|s| s.to_string())
                .collect(),
            truncations: DEFAULT_TRUNCATIONS.iter().map(|s| s.to_string()).collect(),
            max_depth: 10,
            tick_ms: 10,
            bulk_threshold: 100,
            diagnostics: Diagnostics::default(),
        }
    }
}

impl Config {
    /// Parse a config document. `format` is a file extension.
    pub fn from_str_with_format(content: &str, format: &str) -> Result<Self> {
        let config = match format.to_ascii_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            "yaml" | "yml" => serde_yaml::from_str(content)?,
            other => return Err(Error::UnsupportedFormat(other.to_string())),
        };
        Ok(config)
    }

    /// Apply `EVLOG_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(name) = env_value("EVLOG_NAME") {
            self.name = name;
        }
        if let Some(level) = env_value("EVLOG_LEVEL") {
            self.level = level
                .parse()
                .map_err(|e: String| Error::invalid("EVLOG_LEVEL", e))?;
        }
        if let Some(file) = env_value("EVLOG_FILE") {
            self.destination = file;
        }
        if let Some(tag) = env_value("EVLOG_SPLIT_TAG") {
            self.split_tag = tag;
        }
        if let Some(names) = env_value("EVLOG_SENSITIVE") {
            self.sensitive = split_csv(&names);
        }
        if let Some(patterns) = env_value("EVLOG_REGEX_SENSITIVE") {
            self.regex_sensitive = split_csv(&patterns);
        }
        if let Some(rules) = env_value("EVLOG_SENSITIVE_RULE") {
            self.sensitive_rule = split_csv(&rules);
        }
        if let Some(prefixes) = env_value("EVLOG_TRUNCATIONS") {
            self.truncations = split_csv(&prefixes);
        }
        if let Some(fast) = env_value("EVLOG_FAST") {
            self.fast = parse_bool(&fast).ok_or_else(|| {
                Error::invalid("EVLOG_FAST", format!("expected a boolean, got {fast:?}"))
            })?;
        }
        self.diagnostics = self.diagnostics.with_env_overrides()?;
        Ok(self)
    }

    /// Check invariants that deserialization cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::invalid("max_depth", "must be at least 1"));
        }
        if !(1..=MAX_TICK_MS).contains(&self.tick_ms) {
            return Err(Error::invalid(
                "tick_ms",
                format!("must be in 1..={MAX_TICK_MS}, got {}", self.tick_ms),
            ));
        }
        if !self.split_tag.is_empty()
            && StrftimeItems::new(&self.split_tag).any(|item| matches!(item, Item::Error))
        {
            return Err(Error::invalid(
                "split_tag",
                format!("not a strftime pattern: {:?}", self.split_tag),
            ));
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        ListOrCsv::Csv(s) => split_csv(&s),
    })
}
