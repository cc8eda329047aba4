//! Writer that prints each line as it arrives.

use std::io::{self, Write};

use crate::writer::{FlushMode, Writer, WriterConfig};

#[derive(Debug, Default)]
pub struct StdoutWriter;

impl StdoutWriter {
    pub fn new() -> Self {
        StdoutWriter
    }

    pub fn from_config(_config: &WriterConfig) -> Self {
        StdoutWriter
    }
}

impl Writer for StdoutWriter {
    fn scheme(&self) -> &str {
        "stdout"
    }

    fn log(&self, line: &str) {
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            crate::report_failure("stdout", "failed to write line", &e);
        }
    }

    fn run(&self, _mode: FlushMode) {
        if let Err(e) = io::stdout().flush() {
            crate::report_failure("stdout", "failed to flush", &e);
        }
    }
}
