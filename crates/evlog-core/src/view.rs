//! Plain-text rendering of emitted lines for `evlog view`.
//!
//! ```text
//! 03-05 12:00:01.123 7f3a... info order accepted  orderId:1001  serverName:web-1
//! ```

use chrono::{DateTime, Local, Utc};
use evlog_common::{Event, Value};

use crate::encode::{value_json, UNDEFINED_KIND};
use crate::parse::{parse_line, ParsedLine};

const TIME_LAYOUT: &str = "%m-%d %H:%M:%S%.3f";

/// Keys searched for the message of a leveled event, in order.
const LEVEL_KEYS: &[&str] = &[
    "debug", "warning", "error", "info", "Debug", "Warning", "Error", "Info",
];

/// Time zone used for event timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewZone {
    #[default]
    Local,
    Utc,
}

/// Parse and render one line.
pub fn view_line(line: &str, zone: ViewZone) -> String {
    render(&parse_line(line), zone)
}

pub fn render(parsed: &ParsedLine, zone: ViewZone) -> String {
    match parsed {
        ParsedLine::Event(event) => render_event(event, zone),
        ParsedLine::BadLine { time, text } => {
            format!("{} {}", time.format(TIME_LAYOUT), text)
        }
        ParsedLine::Unparseable(line) => line.clone(),
    }
}

fn render_event(event: &Event, zone: ViewZone) -> String {
    let mut out = format_time(&event.timestamp, zone);
    out.push(' ');
    out.push_str(&event.trace_id);

    let level_key = LEVEL_KEYS
        .iter()
        .find(|key| event.extra().iter().any(|(k, _)| k == **key))
        .copied();
    out.push(' ');
    match level_key.and_then(|key| event.get(key)) {
        Some(message) => out.push_str(&value_text(message)),
        None if event.kind == UNDEFINED_KIND => out.push('-'),
        None => out.push_str(&event.kind),
    }

    let mut call_stacks = None;
    for (key, value) in event.extra().iter() {
        if Some(key) == level_key {
            continue;
        }
        if key == "callStacks" {
            call_stacks = Some(value);
            continue;
        }
        out.push_str("  ");
        out.push_str(key);
        out.push(':');
        out.push_str(&value_text(value));
    }

    match call_stacks {
        Some(Value::List(frames)) => {
            for frame in frames.iter() {
                out.push_str("\n  ");
                out.push_str(&value_text(frame));
            }
        }
        Some(other) => {
            out.push(' ');
            out.push_str(&value_text(other));
        }
        None => {}
    }
    out
}

fn format_time(timestamp: &DateTime<Utc>, zone: ViewZone) -> String {
    match zone {
        ViewZone::Local => timestamp.with_timezone(&Local).format(TIME_LAYOUT).to_string(),
        ViewZone::Utc => timestamp.format(TIME_LAYOUT).to_string(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::List(_) | Value::Map(_) | Value::Record(_) => value_json(value)
            .map(|json| json.to_string())
            .unwrap_or_else(|_| value.to_string()),
        other => other.to_string(),
    }
}
