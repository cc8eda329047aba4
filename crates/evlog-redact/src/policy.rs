//! Redaction policy configuration.
//!
//! The policy is the serializable input to [`crate::Redactor::new`]: which
//! field names are sensitive, which patterns to scan leaf text with, how to
//! mask, and how deep to look.

use evlog_common::config::{DEFAULT_SENSITIVE, DEFAULT_SENSITIVE_RULE};
use evlog_common::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default traversal depth.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Redaction policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionPolicy {
    /// Field names whose leaf values are always masked.
    #[serde(default = "default_sensitive")]
    pub sensitive: Vec<String>,

    /// Patterns applied to the text of every other string or number leaf.
    #[serde(default)]
    pub regex_sensitive: Vec<String>,

    /// Masking rules in `threshold:left*right` form, tried in order.
    #[serde(default = "default_rules")]
    pub sensitive_rule: Vec<String>,

    /// Values nested deeper than this are left as-is.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_sensitive() -> Vec<String> {
    DEFAULT_SENSITIVE.iter().map(|s| s.to_string()).collect()
}

fn default_rules() -> Vec<String> {
    DEFAULT_SENSITIVE_RULE.iter().map(|s| s.to_string()).collect()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        RedactionPolicy {
            sensitive: default_sensitive(),
            regex_sensitive: Vec::new(),
            sensitive_rule: default_rules(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RedactionPolicy {
    /// Extract the redaction settings from a logger config.
    pub fn from_config(config: &Config) -> Self {
        RedactionPolicy {
            sensitive: config.sensitive.clone(),
            regex_sensitive: config.regex_sensitive.clone(),
            sensitive_rule: config.sensitive_rule.clone(),
            max_depth: config.max_depth,
        }
    }

    /// Load a policy from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let policy: RedactionPolicy = serde_json::from_str(&content)?;
        Ok(policy)
    }

    /// Save policy to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn with_sensitive<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regex_sensitive = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_rule = rules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
