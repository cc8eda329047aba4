//! evlog - structured event logging pipeline
//!
//! - `evlog view [FILE]`: render emitted lines as plain text
//! - `evlog emit`: push one event through the configured pipeline
//! - `evlog config`: print the effective configuration

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use evlog_common::{
    Config, ConfigResolver, ConfigSource, DiagnosticsFormat, DiagnosticsLevel, Event, Level, Value,
};
use evlog_core::exit_codes::ExitCode;
use evlog_core::logging::{generate_trace_id, init_logging, resolve_diagnostics, set_redactor};
use evlog_core::view::{view_line, ViewZone};
use evlog_core::Logger;
use evlog_redact::{RedactionPolicy, Redactor};
use evlog_writer::{DeliveryContext, WriterRegistry};
use tracing::{debug, error};

/// Structured event logging: emit, deliver, and view log lines
#[derive(Parser)]
#[command(name = "evlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides EVLOG_CONFIG and the XDG location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Diagnostics level on stderr (overrides [diagnostics] level)
    #[arg(long, global = true)]
    log_level: Option<DiagnosticsLevel>,

    /// Diagnostics format on stderr: human, jsonl (overrides [diagnostics] format)
    #[arg(long, global = true)]
    log_format: Option<DiagnosticsFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render log lines as plain text
    View(ViewArgs),
    /// Emit one event through the configured pipeline
    Emit(EmitArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// File to read; stdin when absent
    file: Option<PathBuf>,

    /// Show event times in UTC instead of local time
    #[arg(long)]
    utc: bool,
}

#[derive(Args, Debug)]
struct EmitArgs {
    /// Event kind (logType)
    #[arg(long, default_value = "info")]
    kind: String,

    /// Event level; defaults to the kind when the kind is a level name
    #[arg(long)]
    level: Option<Level>,

    /// Message, stored under the kind's key
    #[arg(long, short = 'm')]
    message: Option<String>,

    /// Extra field as key=value; JSON values are decoded
    #[arg(long = "field", short = 'F', value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// Trace id; a fresh one is generated when absent
    #[arg(long)]
    trace_id: Option<String>,

    /// Destination override (path, file://, es://, ess://)
    #[arg(long)]
    to: Option<String>,
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

type Loaded = evlog_common::Result<(Config, ConfigSource)>;

fn main() {
    let cli = Cli::parse();
    let loaded: Loaded = ConfigResolver::new(cli.global.config.clone()).load();
    let config = loaded.as_ref().ok().map(|(config, _)| config);
    init_logging(&resolve_diagnostics(
        config,
        cli.global.log_level,
        cli.global.log_format,
    ));
    if let Ok((config, source)) = &loaded {
        set_redactor(Redactor::new(&RedactionPolicy::from_config(config)));
        debug!(source = %source, "config resolved");
    }

    let exit_code = match &cli.command {
        Commands::View(args) => run_view(args),
        Commands::Emit(args) => run_emit(loaded, args),
        Commands::Config => run_config(&cli.global, loaded),
    };
    std::process::exit(exit_code.as_i32());
}

fn require_config(loaded: Loaded) -> Result<(Config, ConfigSource), ExitCode> {
    loaded.map_err(|e| {
        eprintln!("evlog: {e} (code {})", e.code());
        ExitCode::from(&e)
    })
}

// ============================================================================
// Commands
// ============================================================================

fn run_view(args: &ViewArgs) -> ExitCode {
    let zone = if args.utc { ViewZone::Utc } else { ViewZone::Local };
    let input: Box<dyn BufRead> = match &args.file {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                eprintln!("evlog: cannot open {}: {e}", path.display());
                return ExitCode::IoError;
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in input.split(b'\n') {
        let line = match line {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                eprintln!("evlog: read failed: {e}");
                return ExitCode::IoError;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if writeln!(out, "{}", view_line(&line, zone)).is_err() {
            // reader went away
            break;
        }
    }
    ExitCode::Clean
}

fn run_emit(loaded: Loaded, args: &EmitArgs) -> ExitCode {
    let mut config = match require_config(loaded) {
        Ok((config, _)) => config,
        Err(code) => return code,
    };
    if let Some(to) = &args.to {
        config.destination.clone_from(to);
    }

    let context = Arc::new(DeliveryContext::from_config(&config));
    let logger = Logger::with_parts(config, &WriterRegistry::with_defaults(), Arc::clone(&context));
    if let Err(e) = context.start() {
        error!(error = %e, "cannot start delivery loop");
        return ExitCode::InternalError;
    }

    let trace_id = args.trace_id.clone().unwrap_or_else(generate_trace_id);
    let mut event = Event::new(&args.kind).with_trace_id(trace_id);
    event.level = args.level.or_else(|| args.kind.parse().ok());
    for (key, raw) in &args.fields {
        if !event.insert(key.as_str(), field_value(raw)) {
            eprintln!("evlog: field {key:?} is reserved, ignored");
        }
    }
    if let Some(message) = &args.message {
        event.insert(args.kind.as_str(), message.as_str());
    }
    logger.log(event);

    context.stop();
    context.wait();
    ExitCode::Clean
}

fn run_config(global: &GlobalOpts, loaded: Loaded) -> ExitCode {
    let (path, _) = ConfigResolver::new(global.config.clone()).resolve_path();
    let (config, source) = match require_config(loaded) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    match config.to_toml() {
        Ok(text) => {
            match path {
                Some(path) => println!("# source: {source} ({})", path.display()),
                None => println!("# source: {source}"),
            }
            print!("{text}");
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("evlog: {e}");
            ExitCode::InternalError
        }
    }
}

/// `3` → Int, `true` → Bool, `{"a":1}` → Map, anything else stays text.
fn field_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from(json),
        Err(_) => Value::from(raw),
    }
}
