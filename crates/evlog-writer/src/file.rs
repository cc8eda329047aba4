//! Appending file writer with time-based rotation.
//!
//! Lines are queued by `log` and written by `run`. When a split pattern
//! (strftime, e.g. `%Y%m%d`) is configured, the active file is
//! `<path>.<key>` where `key` is the clock formatted with that pattern; a
//! change of key switches files on the next drain. Without a pattern the
//! active file is `<path>` itself.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::{Result, WriterError};
use crate::writer::{FlushMode, Writer, WriterConfig};
use crate::{lock, report_failure};

/// Time source for rotation keys.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

struct ActiveFile {
    key: String,
    path: PathBuf,
    out: BufWriter<File>,
}

pub struct FileWriter {
    path: PathBuf,
    split_tag: String,
    clock: Arc<dyn Clock>,
    queue: Mutex<Vec<String>>,
    /// Held for the whole drain; rotation is decided under it.
    active: Mutex<Option<ActiveFile>>,
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("path", &self.path)
            .field("split_tag", &self.split_tag)
            .finish_non_exhaustive()
    }
}

impl FileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileWriter {
            path: path.into(),
            split_tag: String::new(),
            clock: Arc::new(SystemClock),
            queue: Mutex::new(Vec::new()),
            active: Mutex::new(None),
        }
    }

    pub fn from_config(config: &WriterConfig) -> Result<Self> {
        let target = config.target();
        if target.is_empty() {
            return Err(WriterError::invalid(&config.destination, "empty file path"));
        }
        Ok(FileWriter::new(target).with_split_tag(&config.split_tag))
    }

    pub fn with_split_tag(mut self, split_tag: impl Into<String>) -> Self {
        self.split_tag = split_tag.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotation key for the current clock reading; empty without a pattern.
    pub fn rotation_key(&self) -> String {
        if self.split_tag.is_empty() {
            return String::new();
        }
        self.clock.now().format(&self.split_tag).to_string()
    }

    /// File that lines for `key` go to.
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            self.path.clone()
        } else {
            suffixed(&self.path, key)
        }
    }

    /// Number of lines waiting for the next drain.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Move the current file aside to `<path>.<tag>` and start a fresh one.
    ///
    /// Queued lines are written to the old file first.
    pub fn split(&self, tag: &str) -> Result<PathBuf> {
        let mut active = lock(&self.active);
        let key = self.rotation_key();
        self.ensure_open(&mut active, &key)?;
        self.write_pending(&mut active);

        let current = match active.take() {
            Some(mut file) => {
                if let Err(e) = file.out.flush() {
                    report_failure("file", "failed to flush before split", &e);
                }
                file.path
            }
            None => self.path_for_key(&key),
        };

        let moved = suffixed(&self.path, tag);
        fs::rename(&current, &moved).map_err(|e| WriterError::io(&current, e))?;
        info!(from = %current.display(), to = %moved.display(), "split log file");

        self.ensure_open(&mut active, &key)?;
        Ok(moved)
    }

    /// Open the file for `key` unless it is already the active one.
    fn ensure_open(&self, active: &mut Option<ActiveFile>, key: &str) -> Result<()> {
        if active.as_ref().is_some_and(|file| file.key == key) {
            return Ok(());
        }
        let previous = active.take();
        if let Some(mut old) = previous {
            if let Err(e) = old.out.flush() {
                report_failure("file", "failed to flush rotated file", &e);
            }
            info!(from = %old.key, to = %key, "rotating log file");
        }

        let path = self.path_for_key(key);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WriterError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WriterError::io(&path, e))?;
        *active = Some(ActiveFile {
            key: key.to_string(),
            path,
            out: BufWriter::new(file),
        });
        Ok(())
    }

    /// Drain the queue into the active file. The caller holds the handle.
    fn write_pending(&self, active: &mut Option<ActiveFile>) {
        let lines = std::mem::take(&mut *lock(&self.queue));
        if lines.is_empty() {
            return;
        }
        let Some(file) = active.as_mut() else {
            report_failure(
                "file",
                "no open file, dropping lines",
                &format!("{} lines", lines.len()),
            );
            return;
        };
        for line in &lines {
            if let Err(e) = writeln!(file.out, "{line}") {
                report_failure("file", "failed to write line", &WriterError::io(&file.path, e));
                return;
            }
        }
        if let Err(e) = file.out.flush() {
            report_failure("file", "failed to flush", &WriterError::io(&file.path, e));
        }
    }
}

impl Writer for FileWriter {
    fn scheme(&self) -> &str {
        "file"
    }

    fn log(&self, line: &str) {
        lock(&self.queue).push(line.to_string());
    }

    fn run(&self, _mode: FlushMode) {
        if lock(&self.queue).is_empty() {
            return;
        }
        let mut active = lock(&self.active);
        // the key is read under the handle so a drain never writes to an
        // older file than the one before it
        let key = self.rotation_key();
        if let Err(e) = self.ensure_open(&mut active, &key) {
            report_failure("file", "failed to open log file", &e);
            // lines queued for an unopenable file are dropped
            lock(&self.queue).clear();
            return;
        }
        self.write_pending(&mut active);
    }

    fn close(&self) {
        let mut active = lock(&self.active);
        self.write_pending(&mut active);
        if let Some(mut file) = active.take() {
            if let Err(e) = file.out.flush() {
                report_failure("file", "failed to flush on close", &e);
            }
        }
    }

    fn split(&self, tag: &str) -> Result<Option<PathBuf>> {
        FileWriter::split(self, tag).map(Some)
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
