//! Logger facade: identity merge, redaction, encoding, delivery.
//!
//! A [`Logger`] is cheap to clone; clones share the writer, the redactor,
//! and the delivery context, and differ only in trace id and level.
//!
//! ```no_run
//! use evlog_common::{fields, Config};
//! use evlog_core::Logger;
//!
//! let logger = Logger::new(Config::default()).with_trace_id("req-42");
//! logger.info("order accepted", fields! { "orderId" => 1001, "password" => "hunter22" });
//! ```

use std::io::{self, Write};
use std::panic::Location;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use backtrace::Backtrace;
use chrono::Local;
use evlog_common::{
    fields, resolve_app_name, Config, ConfigResolver, Event, Fields, Identity, Level,
};
use evlog_redact::{RedactionPolicy, Redactor};
use evlog_writer::{
    report_failure, DeliveryContext, FlushMode, StdoutWriter, Writer, WriterConfig, WriterError,
    WriterRegistry,
};
use tracing::{debug, warn};

use crate::encode::{encode, encode_raw, lift_universal};

/// `logType` of events logged from a bare field mapping.
pub const DEFAULT_KIND: &str = "log";

/// Most frames recorded in `callStacks`.
pub const MAX_FRAMES: usize = 50;

/// Frames from the toolchain's own sources (std, core, the test harness).
const TOOLCHAIN_SOURCE: &str = "/rustc/";

static DEFAULT_LOGGER: OnceLock<Logger> = OnceLock::new();

#[derive(Clone)]
struct Shared {
    config: Config,
    name: String,
    redactor: Arc<Redactor>,
    writer: Arc<dyn Writer>,
    context: Arc<DeliveryContext>,
    identity: Fields,
}

#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    trace_id: String,
    level: Level,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.shared.name)
            .field("destination", &self.shared.config.destination)
            .field("trace_id", &self.trace_id)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Logger using the built-in writers and the process-wide delivery
    /// context.
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, &WriterRegistry::with_defaults(), DeliveryContext::global())
    }

    /// Logger with an explicit writer table and delivery context.
    ///
    /// Never fails: an unusable destination falls back to stdout, and every
    /// setup problem is logged once as an error event.
    pub fn with_parts(
        config: Config,
        registry: &WriterRegistry,
        context: Arc<DeliveryContext>,
    ) -> Self {
        let name = if config.name.trim().is_empty() {
            resolve_app_name()
        } else {
            config.name.trim().to_string()
        };
        let redactor = Redactor::new(&RedactionPolicy::from_config(&config));

        let writer_config = WriterConfig::from_config(&config, &name);
        let scheme = writer_config.scheme().to_string();
        let (writer, writer_error): (Arc<dyn Writer>, Option<WriterError>) =
            match registry.new_writer(&writer_config) {
                Ok(writer) => (writer, None),
                Err(e) => (Arc::new(StdoutWriter::new()), Some(e)),
            };
        if writer_error.is_none() && scheme != "stdout" {
            context.register(Arc::clone(&writer));
        }
        debug!(name = %name, scheme = %scheme, "logger created");

        let level = config.level;
        let logger = Logger {
            shared: Arc::new(Shared {
                config,
                name,
                redactor: Arc::new(redactor),
                writer,
                context,
                identity: Identity::discover().fields(),
            }),
            trace_id: String::new(),
            level,
        };

        if let Some(e) = writer_error {
            let message = match e {
                WriterError::UnknownScheme(_) => format!("unsupported logger writer {scheme}"),
                _ => format!("invalid logger writer {scheme}"),
            };
            logger.error(
                &message,
                fields! {
                    "destination" => logger.shared.config.destination.as_str(),
                    "reason" => e.to_string(),
                },
            );
        }
        for warning in logger.shared.redactor.setup_warnings() {
            logger.error("invalid redaction setting", fields! { "reason" => warning.to_string() });
        }
        logger
    }

    /// Process-wide logger built from the resolved configuration.
    pub fn default_logger() -> &'static Logger {
        DEFAULT_LOGGER.get_or_init(|| {
            let config = match ConfigResolver::with_defaults().load() {
                Ok((config, _)) => config,
                Err(e) => {
                    warn!(error = %e, code = e.code(), "config unusable, using defaults");
                    Config::default()
                }
            };
            Logger::new(config)
        })
    }

    /// Copy of this logger stamping `trace_id` on its events.
    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        Logger {
            trace_id: trace_id.into(),
            ..self.clone()
        }
    }

    /// Replace value masking with `masker` for this logger and its clones.
    pub fn with_masker<F>(mut self, masker: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let mut shared = (*self.shared).clone();
        let policy = RedactionPolicy::from_config(&shared.config);
        shared.redactor = Arc::new(Redactor::new(&policy).with_masker(masker));
        self.shared = Arc::new(shared);
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn context(&self) -> &Arc<DeliveryContext> {
        &self.shared.context
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Whether messages at `level` pass this logger's threshold.
    pub fn check_level(&self, level: Level) -> bool {
        level >= self.level
    }

    #[track_caller]
    pub fn debug(&self, message: &str, extra: Fields) {
        self.leveled(Level::Debug, message, extra, Some(Location::caller()));
    }

    pub fn info(&self, message: &str, extra: Fields) {
        self.leveled(Level::Info, message, extra, None);
    }

    pub fn warning(&self, message: &str, extra: Fields) {
        self.leveled(Level::Warning, message, extra, None);
    }

    #[track_caller]
    pub fn error(&self, message: &str, extra: Fields) {
        self.leveled(Level::Error, message, extra, Some(Location::caller()));
    }

    fn leveled(
        &self,
        level: Level,
        message: &str,
        extra: Fields,
        caller: Option<&Location<'_>>,
    ) {
        if !self.check_level(level) {
            return;
        }
        let kind = level.as_str();
        let mut event = Event::new(kind)
            .with_level(level)
            .with_fields(extra)
            .with_field(kind, message);
        if let Some(location) = caller {
            event.insert("callStacks", self.call_stacks(location));
        }
        self.log(event);
    }

    /// Source frames of the code that called into the logger, innermost
    /// first. Falls back to `caller` when the binary carries no debug info.
    fn call_stacks(&self, caller: &Location<'_>) -> Vec<String> {
        let truncations = &self.shared.config.truncations;
        let trace = Backtrace::new();
        let frames = trace
            .frames()
            .iter()
            .flat_map(|frame| frame.symbols())
            .filter_map(|symbol| {
                let file = symbol.filename()?.to_string_lossy().into_owned();
                Some((file, symbol.lineno()?))
            });
        let mut stacks = caller_frames(frames, file!(), truncations);
        if stacks.is_empty() {
            stacks.push(format!(
                "{}:{}",
                trim_path(caller.file(), truncations),
                caller.line()
            ));
        }
        stacks
    }

    /// Run one event through the pipeline.
    pub fn log(&self, mut event: Event) {
        if event.trace_id.is_empty() {
            event.trace_id.clone_from(&self.trace_id);
        }
        for (key, value) in self.shared.identity.iter() {
            event.insert_absent(key, value.clone());
        }
        let line = if self.shared.config.fast {
            encode_raw(&event)
        } else {
            encode(&self.shared.redactor.redact(&event))
        };
        self.deliver(&line);
    }

    /// Log a free-form mapping. Universal keys found in it fill the event's
    /// universal fields.
    pub fn log_fields(&self, fields: Fields) {
        let mut event = Event::new(DEFAULT_KIND);
        let rest = lift_universal(&mut event, fields);
        self.log(event.with_fields(rest));
    }

    /// Move the current log file aside as `<path>.<tag>`.
    ///
    /// `Ok(None)` for destinations that are not files.
    pub fn split(&self, tag: &str) -> evlog_writer::Result<Option<PathBuf>> {
        self.shared.writer.split(tag)
    }

    fn deliver(&self, line: &str) {
        let writer = &self.shared.writer;
        if self.shared.context.is_running() {
            writer.log(line);
            return;
        }
        if writer.is_remote() {
            write_unqueued(&mut io::stdout().lock(), line);
            return;
        }
        // no loop to drain local writers; write through
        writer.log(line);
        writer.run(FlushMode::Periodic);
    }
}

/// Print a line that reached a remote writer with no loop to drain it.
/// Returns false when `out` refused it; the failure goes to diagnostics.
fn write_unqueued(out: &mut dyn Write, line: &str) -> bool {
    let now = Local::now().format("%Y/%m/%d %H:%M:%S%.6f");
    let written = writeln!(out, "{now} writer not running")
        .and_then(|()| writeln!(out, "{now} {line}"))
        .and_then(|()| out.flush());
    match written {
        Ok(()) => true,
        Err(e) => {
            report_failure("stdout", "unqueued line dropped", &e);
            false
        }
    }
}

/// Pick the frames above the logger out of a raw `(file, line)` walk.
///
/// Frames up to and including the ones in `own_file` belong to the capture
/// itself and are dropped, as are toolchain frames.
fn caller_frames(
    frames: impl Iterator<Item = (String, u32)>,
    own_file: &str,
    truncations: &[String],
) -> Vec<String> {
    frames
        .skip_while(|(file, _)| !file.ends_with(own_file))
        .skip_while(|(file, _)| file.ends_with(own_file))
        .filter(|(file, _)| !file.contains(TOOLCHAIN_SOURCE))
        .take(MAX_FRAMES)
        .map(|(file, line)| format!("{}:{line}", trim_path(&file, truncations)))
        .collect()
}

/// Cut everything up to and including each prefix found, in order.
fn trim_path<'a>(file: &'a str, truncations: &[String]) -> &'a str {
    let mut file = file;
    for prefix in truncations.iter().filter(|p| !p.is_empty()) {
        if let Some(pos) = file.find(prefix.as_str()) {
            file = &file[pos + prefix.len()..];
        }
    }
    file
}
