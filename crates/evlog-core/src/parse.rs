//! Line parser, the inverse of [`crate::encode`].

use chrono::{DateTime, NaiveDateTime, Utc};
use evlog_common::{Event, Level, Value};
use serde_json::Value as Json;

/// Leading timestamp layouts of non-JSON lines, most precise first.
const BAD_LINE_LAYOUTS: &[(&str, usize)] = &[
    ("%Y/%m/%d %H:%M:%S%.6f", "2006/01/02 15:04:05.000000".len()),
    ("%Y/%m/%d %H:%M:%S", "2006/01/02 15:04:05".len()),
];

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// A structured record.
    Event(Event),
    /// Free text behind a recognizable timestamp.
    BadLine { time: NaiveDateTime, text: String },
    /// Neither of the above; the line as given.
    Unparseable(String),
}

impl ParsedLine {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            ParsedLine::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self {
            ParsedLine::Event(event) => Some(event),
            _ => None,
        }
    }
}

pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(pos) = line.find("{\"") {
        let prefix = line[..pos].trim();
        if prefix.is_empty() || leading_time(prefix).is_some_and(|(_, rest)| rest.is_empty()) {
            if let Some(event) = parse_record(&line[pos..]) {
                return ParsedLine::Event(event);
            }
        }
    }
    match leading_time(line) {
        Some((time, text)) => ParsedLine::BadLine {
            time,
            text: text.to_string(),
        },
        None => ParsedLine::Unparseable(line.to_string()),
    }
}

/// Decode one JSON record. `None` unless it is an object with a usable
/// `logTime`.
pub fn parse_record(text: &str) -> Option<Event> {
    let Json::Object(mut object) = serde_json::from_str::<Json>(text.trim()).ok()? else {
        return None;
    };

    let timestamp = match object.remove("logTime")? {
        Json::Number(n) => timestamp_from_epoch(n.as_f64()?)?,
        Json::String(s) => parse_time_text(&s)?,
        _ => return None,
    };
    let kind = take_string(&mut object, "logType");
    let trace_id = take_string(&mut object, "traceId");
    let level = match object.remove("logLevel") {
        Some(Json::String(s)) => s.parse::<Level>().ok(),
        _ => None,
    };

    let mut event = Event::new(kind)
        .with_timestamp(timestamp)
        .with_trace_id(trace_id);
    event.level = level;
    for (key, value) in object {
        event.insert(key, Value::from(value));
    }
    Some(event)
}

/// Epoch seconds (microsecond fraction) to a timestamp.
pub fn timestamp_from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1e6).round();
    if micros.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}

/// `logTime` carried as text: RFC 3339 when it has a `T`, epoch seconds
/// otherwise.
fn parse_time_text(s: &str) -> Option<DateTime<Utc>> {
    if s.contains('T') {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    } else {
        timestamp_from_epoch(s.trim().parse().ok()?)
    }
}

fn take_string(object: &mut serde_json::Map<String, Json>, key: &str) -> String {
    match object.remove(key) {
        Some(Json::String(s)) => s,
        Some(Json::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Split a leading timestamp off `line`.
fn leading_time(line: &str) -> Option<(NaiveDateTime, &str)> {
    BAD_LINE_LAYOUTS.iter().find_map(|(layout, width)| {
        let head = line.get(..*width)?;
        let time = NaiveDateTime::parse_from_str(head, layout).ok()?;
        Some((time, line[*width..].trim_start()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_parse_encoded_line() {
        let line = r#"{"logType":"info","logTime":1700000000.123456,"traceId":"abc","logLevel":"info","info":"hi","n":2}"#;
        let event = parse_line(line).into_event().unwrap();
        assert_eq!(event.kind, "info");
        assert_eq!(event.trace_id, "abc");
        assert_eq!(event.level, Some(Level::Info));
        assert_eq!(
            event.timestamp,
            Utc.timestamp_micros(1_700_000_000_123_456).unwrap()
        );
        assert_eq!(event.get("info"), Some(&Value::from("hi")));
        assert_eq!(event.get("n"), Some(&Value::Int(2)));
        assert_eq!(event.extra().len(), 2);
    }

    #[test]
    fn test_timestamp_prefix_allowed() {
        let line = r#"2024/03/05 12:00:01.000002 {"logType":"task","logTime":1.5,"traceId":"t"}"#;
        let event = parse_line(line).into_event().unwrap();
        assert_eq!(event.kind, "task");
        assert_eq!(event.timestamp.timestamp_micros(), 1_500_000);
        assert!(event.level.is_none());
    }

    #[test]
    fn test_rfc3339_log_time() {
        let line = r#"{"logType":"info","logTime":"2024-03-05T12:00:00.250+02:00","traceId":""}"#;
        let event = parse_line(line).into_event().unwrap();
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_bad_line_layouts() {
        let micro = parse_line("2024/03/05 12:00:01.123456 start changed log file");
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(12, 0, 1, 123_456)
            .unwrap();
        assert_eq!(
            micro,
            ParsedLine::BadLine {
                time: expected,
                text: "start changed log file".into()
            }
        );

        let seconds = parse_line("2024/03/05 12:00:01 plain text");
        match seconds {
            ParsedLine::BadLine { time, text } => {
                assert_eq!(time.and_utc().timestamp_subsec_micros(), 0);
                assert_eq!(text, "plain text");
            }
            other => panic!("expected bad line, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(
            parse_line("panic: runtime error"),
            ParsedLine::Unparseable("panic: runtime error".into())
        );
        // JSON behind arbitrary text is not a record
        assert!(matches!(
            parse_line(r#"note {"logType":"info","logTime":1}"#),
            ParsedLine::Unparseable(_)
        ));
        // a record needs logTime
        assert!(matches!(
            parse_line(r#"{"logType":"info"}"#),
            ParsedLine::Unparseable(_)
        ));
    }

    #[test]
    fn test_reserved_looking_extras_do_not_shadow() {
        let line = r#"{"logType":"info","logTime":2,"traceId":"a","LOGTYPE":"x"}"#;
        let event = parse_line(line).into_event().unwrap();
        assert_eq!(event.kind, "info");
        assert!(event.extra().is_empty());
    }

    #[test]
    fn test_timestamp_from_epoch_bounds() {
        assert!(timestamp_from_epoch(f64::NAN).is_none());
        assert!(timestamp_from_epoch(1e300).is_none());
        assert_eq!(
            timestamp_from_epoch(0.000001).unwrap().timestamp_micros(),
            1
        );
    }
}
