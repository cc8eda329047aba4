//! The writer abstraction and its construction parameters.

use std::path::PathBuf;

use evlog_common::Config;

use crate::error::Result;

/// Why a writer is being drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Regular tick; batched writers may hold data back.
    Periodic,
    /// Shutdown drain; everything queued must go out.
    Final,
}

/// A delivery backend.
///
/// `log` is called on producer threads and must not do I/O for queued
/// backends. `run` is called by the delivery loop (or synchronously when no
/// loop is active) and performs the I/O.
pub trait Writer: Send + Sync {
    /// Scheme this writer was built for.
    fn scheme(&self) -> &str;

    /// Accept one encoded line.
    fn log(&self, line: &str);

    /// Drain queued lines.
    fn run(&self, mode: FlushMode);

    /// Release handles after the final drain.
    fn close(&self) {}

    /// Remote writers are never drained on a producer thread.
    fn is_remote(&self) -> bool {
        false
    }

    /// Move the current output aside under `tag`. Only file writers have
    /// anything to move; the rest return `Ok(None)`.
    fn split(&self, _tag: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Everything a writer maker needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Destination URI or file path; empty means stdout.
    pub destination: String,
    /// Application name, used for bulk index naming.
    pub name: String,
    /// strftime rotation pattern for file writers.
    pub split_tag: String,
    /// Bulk queue size that triggers an early flush.
    pub bulk_threshold: usize,
}

impl WriterConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        WriterConfig {
            destination: destination.into(),
            name: String::new(),
            split_tag: String::new(),
            bulk_threshold: 100,
        }
    }

    /// Writer settings from a resolved config and application name.
    pub fn from_config(config: &Config, name: &str) -> Self {
        WriterConfig {
            destination: config.destination.clone(),
            name: name.to_string(),
            split_tag: config.split_tag.clone(),
            bulk_threshold: config.bulk_threshold,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_split_tag(mut self, split_tag: impl Into<String>) -> Self {
        self.split_tag = split_tag.into();
        self
    }

    pub fn with_bulk_threshold(mut self, threshold: usize) -> Self {
        self.bulk_threshold = threshold;
        self
    }

    /// Scheme the destination dispatches to.
    pub fn scheme(&self) -> &str {
        if self.destination.is_empty() {
            return "stdout";
        }
        match self.destination.split_once("://") {
            Some((scheme, _)) => scheme,
            None => "file",
        }
    }

    /// Destination with any `scheme://` prefix removed.
    pub fn target(&self) -> &str {
        match self.destination.split_once("://") {
            Some((_, rest)) => rest,
            None => &self.destination,
        }
    }
}
