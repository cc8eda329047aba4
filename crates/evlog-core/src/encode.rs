//! Canonical line encoding.
//!
//! One JSON object per event: the universal fields (`logType`, `logTime`,
//! `traceId`, `logLevel` when set) plus every extra entry flattened to the
//! top level. `logTime` is epoch seconds with a microsecond fraction.
//!
//! Encoding never fails from the caller's point of view. A value JSON cannot
//! carry (a non-finite float, or nesting past [`MAX_NESTING`]) turns the
//! whole event into an `undefined` record holding a bounded text dump of it.
//!
//! JSON has a single object type, so a nested [`Value::Record`] reads back
//! as a [`Value::Map`]. Map keys that collide once lower-cameled keep one
//! entry: the key already spelled that way, else the first in key order.

use std::borrow::Cow;

use evlog_common::{Event, Fields, Value};
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;
use tracing::debug;

/// `logType` of the fallback record.
pub const UNDEFINED_KIND: &str = "undefined";

/// Deepest container nesting written to a line. Kept under the JSON
/// reader's recursion limit so that anything encoded parses back.
pub const MAX_NESTING: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("non-finite number at {path}")]
    NonFinite { path: String },

    #[error("nesting deeper than {limit} at {path}")]
    TooDeep { path: String, limit: usize },
}

impl EncodeError {
    /// Stable error code, in the same numbering space as the other crates.
    pub fn code(&self) -> u32 {
        match self {
            EncodeError::NonFinite { .. } => 30,
            EncodeError::TooDeep { .. } => 31,
        }
    }
}

/// Encode with lower-camel key normalization.
pub fn encode(event: &Event) -> String {
    encode_with(event, true)
}

/// Encode without touching key case (fast mode).
pub fn encode_raw(event: &Event) -> String {
    encode_with(event, false)
}

fn encode_with(event: &Event, normalize_keys: bool) -> String {
    match to_json(event, normalize_keys) {
        Ok(json) => json.to_string(),
        Err(e) => {
            debug!(kind = %event.kind, error = %e, "event not encodable, writing fallback record");
            fallback(event).to_string()
        }
    }
}

/// Structural encoding of `event`.
pub fn to_json(event: &Event, normalize_keys: bool) -> Result<Json, EncodeError> {
    let mut out = Map::new();
    for (key, value) in event.extra().iter() {
        let key = if normalize_keys {
            lower_camel(key)
        } else {
            Cow::Borrowed(key)
        };
        let keep_case = !normalize_keys || is_header_key(&key);
        let json = value_to_json(value, &key, keep_case, 0)?;
        out.insert(key.into_owned(), json);
    }
    // universal fields last so nothing in extra can replace them
    out.insert("logType".into(), Json::String(event.kind.clone()));
    out.insert("logTime".into(), log_time(event));
    out.insert("traceId".into(), Json::String(event.trace_id.clone()));
    if let Some(level) = event.level {
        out.insert("logLevel".into(), Json::String(level.as_str().into()));
    }
    Ok(Json::Object(out))
}

/// Record written in place of an event that cannot be encoded.
pub fn fallback(event: &Event) -> Json {
    let mut out = Map::new();
    out.insert("logType".into(), Json::String(UNDEFINED_KIND.into()));
    out.insert("logTime".into(), log_time(event));
    out.insert("traceId".into(), Json::String(event.trace_id.clone()));
    if let Some(level) = event.level {
        out.insert("logLevel".into(), Json::String(level.as_str().into()));
    }
    out.insert(UNDEFINED_KIND.into(), Json::String(dump(event)));
    Json::Object(out)
}

/// Text dump of `event` for the fallback record. Containers are cut off by
/// `Value`'s bounded `Display`.
fn dump(event: &Event) -> String {
    let mut out = format!("kind:{} traceId:{}", event.kind, event.trace_id);
    for (key, value) in event.extra().iter() {
        match value {
            Value::Float(x) => out.push_str(&format!(" {key}:{x:?}")),
            other => out.push_str(&format!(" {key}:{other}")),
        }
    }
    out
}

/// Epoch seconds with a microsecond fraction.
pub fn epoch_seconds(event: &Event) -> f64 {
    event.timestamp.timestamp_micros() as f64 / 1e6
}

fn log_time(event: &Event) -> Json {
    Number::from_f64(epoch_seconds(event))
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// JSON form of a single value, keys untouched.
pub fn value_json(value: &Value) -> Result<Json, EncodeError> {
    value_to_json(value, "", true, 0)
}

fn value_to_json(
    value: &Value,
    path: &str,
    keep_case: bool,
    depth: usize,
) -> Result<Json, EncodeError> {
    if depth >= MAX_NESTING && value.is_container() {
        return Err(EncodeError::TooDeep {
            path: path.to_string(),
            limit: MAX_NESTING,
        });
    }
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::Number((*n).into()),
        Value::Float(x) => Json::Number(Number::from_f64(*x).ok_or_else(|| {
            EncodeError::NonFinite {
                path: path.to_string(),
            }
        })?),
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    value_to_json(item, &format!("{path}[{i}]"), keep_case, depth + 1)
                })
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => object(
            map.iter().map(|(k, v)| (k.as_str(), v)),
            path,
            keep_case,
            depth + 1,
        )?,
        Value::Record(fields) => object(fields.iter(), path, keep_case, depth + 1)?,
    })
}

fn object<'a>(
    entries: impl Iterator<Item = (&'a str, &'a Value)>,
    path: &str,
    keep_case: bool,
    depth: usize,
) -> Result<Json, EncodeError> {
    let mut out = Map::new();
    for (key, value) in entries {
        let key = if keep_case {
            Cow::Borrowed(key)
        } else {
            lower_camel(key)
        };
        let child_path = format!("{path}.{key}");
        let respelled = matches!(key, Cow::Owned(_));
        if respelled && out.contains_key(key.as_ref()) {
            debug!(path = %child_path, "key collides after normalization, dropped");
            continue;
        }
        let json = value_to_json(value, &child_path, keep_case || is_header_key(&key), depth)?;
        out.insert(key.into_owned(), json);
    }
    Ok(Json::Object(out))
}

/// Keys under a header object keep their case.
fn is_header_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("header")
}

/// Lower the leading uppercase run of `key`.
///
/// `UserName` → `userName`, `URLPath` → `urlPath`, `ID` → `id`. When the run
/// is followed by a lowercase letter its last capital starts the next word.
pub fn lower_camel(key: &str) -> Cow<'_, str> {
    let chars: Vec<char> = key.chars().collect();
    let run = chars.iter().take_while(|c| c.is_uppercase()).count();
    if run == 0 {
        return Cow::Borrowed(key);
    }
    let lower = if run > 1 && chars.get(run).is_some_and(|c| c.is_lowercase()) {
        run - 1
    } else {
        run
    };
    let mut out = String::with_capacity(key.len());
    for (i, c) in chars.iter().enumerate() {
        if i < lower {
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    Cow::Owned(out)
}

/// Lift the universal keys out of a free-form mapping onto `event`.
///
/// Values that do not fit the field are dropped.
pub fn lift_universal(event: &mut Event, mut fields: Fields) -> Fields {
    if let Some(Value::Str(kind)) = fields.remove("logType") {
        event.kind = kind;
    }
    if let Some(Value::Str(trace_id)) = fields.remove("traceId") {
        event.trace_id = trace_id;
    }
    if let Some(level) = fields.remove("logLevel") {
        if let Some(level) = level.as_str().and_then(|s| s.parse().ok()) {
            event.level = Some(level);
        }
    }
    if let Some(time) = fields.remove("logTime") {
        if let Some(ts) = time.as_f64().and_then(crate::parse::timestamp_from_epoch) {
            event.timestamp = ts;
        }
    }
    fields
}
