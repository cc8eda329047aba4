//! Batched writer for an HTTP bulk-ingest endpoint.
//!
//! Destination form: `es://user:pass@host:port/group/sub?timeout=10s`
//! (`ess://` for TLS). Every line is queued behind an index-action header;
//! `run` posts the whole queue as one newline-delimited body to
//! `http(s)://host:port/_bulk`. Delivery is best-effort: a failed batch is
//! reported and dropped.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::{Result, WriterError};
use crate::writer::{FlushMode, Writer, WriterConfig};
use crate::{lock, report_failure};

/// Marker a successful bulk response carries.
const RESPONSE_OK: &str = r#""errors":false"#;

/// Minimum spacing between time-triggered flushes.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Parsed bulk destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkTarget {
    pub url: String,
    pub user: String,
    pub password: String,
    pub group: String,
    pub timeout: Option<Duration>,
}

impl BulkTarget {
    /// Parse an `es://` / `ess://` destination.
    pub fn parse(destination: &str) -> Result<Self> {
        let (scheme, rest) = destination
            .split_once("://")
            .ok_or_else(|| WriterError::invalid(destination, "missing scheme"))?;
        let protocol = if scheme == "ess" { "https" } else { "http" };

        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };
        let (userinfo, host) = match authority.rsplit_once('@') {
            Some((userinfo, host)) => (Some(userinfo), host),
            None => (None, authority),
        };
        if host.is_empty() {
            return Err(WriterError::invalid(destination, "missing host"));
        }
        let (user, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, password)) => (decode(user), decode(password)),
                None => (decode(info), String::new()),
            },
            None => (String::new(), String::new()),
        };

        let mut timeout = None;
        for pair in query.unwrap_or("").split('&') {
            if let Some(value) = pair.strip_prefix("timeout=") {
                timeout = Some(parse_duration(value).ok_or_else(|| {
                    WriterError::invalid(destination, format!("bad timeout {value:?}"))
                })?);
            }
        }

        Ok(BulkTarget {
            url: format!("{protocol}://{host}/_bulk"),
            user,
            password,
            group: path.trim_matches('/').replace('/', "."),
            timeout,
        })
    }

    /// Index name for application `name`.
    pub fn index_name(&self, name: &str) -> String {
        if self.group.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.group, name)
        }
    }
}

/// Percent-decode a userinfo part; `p%40ss` → `p@ss`.
fn decode(part: &str) -> String {
    percent_decode_str(part).decode_utf8_lossy().into_owned()
}

/// Parse `10s`, `500ms`, `2m`, `1h`; a bare number means seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(n)),
        "ms" => Some(Duration::from_millis(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

pub struct BulkWriter {
    scheme: String,
    target: BulkTarget,
    header: String,
    threshold: usize,
    agent: ureq::Agent,
    queue: Mutex<Vec<String>>,
    last_flush: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for BulkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkWriter")
            .field("url", &self.target.url)
            .field("header", &self.header)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl BulkWriter {
    pub fn from_config(config: &WriterConfig) -> Result<Self> {
        let target = BulkTarget::parse(&config.destination)?;
        let index = target.index_name(&config.name);
        let header = serde_json::json!({ "index": { "_index": index } }).to_string();

        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = target.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(BulkWriter {
            scheme: config.scheme().to_string(),
            target,
            header,
            threshold: config.bulk_threshold,
            agent: builder.build(),
            queue: Mutex::new(Vec::new()),
            last_flush: Mutex::new(None),
        })
    }

    pub fn target(&self) -> &BulkTarget {
        &self.target
    }

    /// Index-action line sent before every data line.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Queue entries waiting, headers included.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    fn due(&self, queued: usize, mode: FlushMode) -> bool {
        if queued == 0 {
            return false;
        }
        if queued > self.threshold || mode == FlushMode::Final {
            return true;
        }
        lock(&self.last_flush).map_or(true, |last| last.elapsed() >= FLUSH_INTERVAL)
    }

    fn post(&self, body: &str) -> Result<()> {
        let mut request = self
            .agent
            .post(&self.target.url)
            .set("Content-Type", "application/x-ndjson");
        if !self.target.user.is_empty() {
            let credentials = format!("{}:{}", self.target.user, self.target.password);
            request = request.set(
                "Authorization",
                &format!("Basic {}", STANDARD.encode(credentials)),
            );
        }

        let response = match request.send_string(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(WriterError::Status(code)),
            Err(e) => return Err(WriterError::Transport(e.to_string())),
        };
        let text = response
            .into_string()
            .map_err(|e| WriterError::Transport(e.to_string()))?;
        if !text.contains(RESPONSE_OK) {
            return Err(WriterError::Rejected(truncate(&text, 512)));
        }
        Ok(())
    }
}

impl Writer for BulkWriter {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn log(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        let mut queue = lock(&self.queue);
        queue.push(self.header.clone());
        queue.push(line.to_string());
    }

    fn run(&self, mode: FlushMode) {
        let batch = {
            let mut queue = lock(&self.queue);
            if !self.due(queue.len(), mode) {
                return;
            }
            std::mem::take(&mut *queue)
        };

        let mut body = batch.join("\n");
        body.push('\n');
        let entries = batch.len();
        match self.post(&body) {
            Ok(()) => debug!(url = %self.target.url, entries, "bulk batch delivered"),
            Err(e) => report_failure(&self.scheme, "bulk batch dropped", &e),
        }
        *lock(&self.last_flush) = Some(Instant::now());
    }

    fn is_remote(&self) -> bool {
        true
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_destination() {
        let target = BulkTarget::parse("es://elastic:s3cret@10.0.0.5:9200/logs/prod?timeout=10s")
            .unwrap();
        assert_eq!(target.url, "http://10.0.0.5:9200/_bulk");
        assert_eq!(target.user, "elastic");
        assert_eq!(target.password, "s3cret");
        assert_eq!(target.group, "logs.prod");
        assert_eq!(target.timeout, Some(Duration::from_secs(10)));
        assert_eq!(target.index_name("orders"), "logs.prod.orders");
    }

    #[test]
    fn test_parse_decodes_escaped_credentials() {
        let target = BulkTarget::parse("es://elastic:p%40ss%3Aword@localhost:9200/logs").unwrap();
        assert_eq!(target.user, "elastic");
        assert_eq!(target.password, "p@ss:word");
        assert_eq!(target.url, "http://localhost:9200/_bulk");

        let target = BulkTarget::parse("es://svc%2Bops:100%25@localhost:9200").unwrap();
        assert_eq!(target.user, "svc+ops");
        assert_eq!(target.password, "100%");
    }

    #[test]
    fn test_parse_tls_without_group() {
        let target = BulkTarget::parse("ess://search.example.com").unwrap();
        assert_eq!(target.url, "https://search.example.com/_bulk");
        assert!(target.user.is_empty());
        assert_eq!(target.index_name("orders"), "orders");
    }

    #[test]
    fn test_parse_rejects_missing_host_and_bad_timeout() {
        assert!(BulkTarget::parse("es:///group").is_err());
        assert!(BulkTarget::parse("es://h:9200?timeout=soon").is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_duration("1d"), None);
    }

    #[test]
    fn test_log_queues_header_and_line() {
        let config = WriterConfig::new("es://localhost:1/app").with_name("svc");
        let writer = BulkWriter::from_config(&config).unwrap();
        assert_eq!(writer.header(), r#"{"index":{"_index":"app.svc"}}"#);
        writer.log(r#"{"logType":"info"}"#);
        writer.log("");
        assert_eq!(writer.pending(), 2);
        assert!(writer.is_remote());
    }

    #[test]
    fn test_due_rules() {
        let config = WriterConfig::new("es://localhost:1").with_bulk_threshold(4);
        let writer = BulkWriter::from_config(&config).unwrap();
        assert!(!writer.due(0, FlushMode::Final));
        // never flushed yet
        assert!(writer.due(1, FlushMode::Periodic));
        *lock(&writer.last_flush) = Some(Instant::now());
        assert!(!writer.due(2, FlushMode::Periodic));
        assert!(writer.due(5, FlushMode::Periodic));
        assert!(writer.due(2, FlushMode::Final));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
