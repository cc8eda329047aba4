//! Full pipeline tests: logger → redaction → encoding → writer → scheduler,
//! against real files and a local HTTP bulk endpoint.

use std::fs;
use std::io::Read;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use evlog_common::{fields, Config, Level};
use evlog_core::parse::{parse_line, ParsedLine};
use evlog_core::view::{render, ViewZone};
use evlog_core::{DeliveryContext, Event, Logger};
use evlog_writer::WriterRegistry;

fn started_context() -> Arc<DeliveryContext> {
    let context = Arc::new(DeliveryContext::with_tick(Duration::from_millis(10)));
    context.start().unwrap();
    context
}

fn file_logger(path: &std::path::Path, context: Arc<DeliveryContext>) -> Logger {
    let config = Config {
        name: "billing".into(),
        destination: path.display().to_string(),
        ..Config::default()
    };
    Logger::with_parts(config, &WriterRegistry::with_defaults(), context)
}

fn events(path: &std::path::Path) -> Vec<Event> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| match parse_line(line) {
            ParsedLine::Event(event) => event,
            other => panic!("not an event line: {other:?}"),
        })
        .collect()
}

// ============================================================================
// File destination
// ============================================================================

#[test]
fn file_pipeline_filters_redacts_and_orders() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("app.log");
    let context = started_context();
    let logger = file_logger(&path, Arc::clone(&context)).with_trace_id("req-7");

    logger.debug("cache miss", fields! {});
    logger.info("order accepted", fields! { "orderId" => 1001, "password" => "hunter2222" });
    logger.error("charge failed", fields! { "Token" => "tok_abcdefghijkl" });
    logger.log_fields(fields! { "logType" => "audit", "Actor" => "ops" });

    context.stop();
    context.wait();

    let events = events(&path);
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, ["info", "error", "audit"]);
    assert!(events.iter().all(|e| e.trace_id == "req-7"));

    let info = &events[0];
    assert_eq!(info.level, Some(Level::Info));
    assert_eq!(info.get("orderId").and_then(|v| v.as_i64()), Some(1001));
    let password = info.get("password").and_then(|v| v.as_str()).unwrap();
    assert_ne!(password, "hunter2222");
    assert!(password.contains('*'));

    let error = &events[1];
    assert!(error.get("callStacks").is_some());
    let token = error.get("token").and_then(|v| v.as_str()).unwrap();
    assert!(!token.contains("abcdefgh"));

    let audit = &events[2];
    assert_eq!(audit.level, None);
    assert_eq!(audit.get("actor").and_then(|v| v.as_str()), Some("ops"));
}

#[test]
fn write_through_without_running_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let logger = file_logger(&path, Arc::new(DeliveryContext::new()));

    logger.warning("disk low", fields! { "free" => "2%" });

    let events = events(&path);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "warning");
    let text = render(&ParsedLine::Event(events[0].clone()), ViewZone::Utc);
    assert!(text.contains(" disk low  free:2%"), "{text}");
}

#[test]
fn split_moves_file_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let logger = file_logger(&path, Arc::new(DeliveryContext::new()));

    logger.info("before", fields! {});
    let moved = logger.split("20240305").unwrap().unwrap();
    assert_eq!(moved, dir.path().join("app.log.20240305"));
    logger.info("after", fields! {});

    let old = events(&moved);
    let new = events(&path);
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].get("info").and_then(|v| v.as_str()), Some("before"));
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].get("info").and_then(|v| v.as_str()), Some("after"));
}

#[test]
fn fast_mode_keeps_keys_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fast.log");
    let config = Config {
        name: "billing".into(),
        destination: path.display().to_string(),
        fast: true,
        ..Config::default()
    };
    let logger = Logger::with_parts(
        config,
        &WriterRegistry::with_defaults(),
        Arc::new(DeliveryContext::new()),
    );

    logger.info("raw", fields! { "UserName" => "z", "password" => "hunter2222" });

    let line = fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(json["UserName"], "z");
    assert_eq!(json["password"], "hunter2222");
}

#[inline(never)]
fn charge(logger: &Logger) {
    logger.error("charge failed", fields! {});
}

#[test]
fn error_call_stacks_walk_caller_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let config = Config {
        destination: path.display().to_string(),
        truncations: vec!["evlog-core/".into()],
        ..Config::default()
    };
    let logger = Logger::with_parts(
        config,
        &WriterRegistry::with_defaults(),
        Arc::new(DeliveryContext::new()),
    );

    charge(&logger);

    let events = events(&path);
    let frames: Vec<String> = match events[0].get("callStacks") {
        Some(evlog_common::Value::List(items)) => items.iter().map(|v| v.to_string()).collect(),
        other => panic!("callStacks missing: {other:?}"),
    };
    assert!(frames.len() >= 2, "{frames:?}");
    assert!(frames.len() <= evlog_core::logger::MAX_FRAMES);
    assert!(frames[0].starts_with("tests/pipeline_nomock.rs:"), "{frames:?}");
    assert!(frames[1].starts_with("tests/pipeline_nomock.rs:"), "{frames:?}");
    assert_ne!(frames[0], frames[1]);
    assert!(frames.iter().all(|f| !f.contains("/rustc/")));
}

#[test]
fn unknown_scheme_falls_back_without_panicking() {
    let config = Config {
        destination: "kafka://broker:9092/topic".into(),
        ..Config::default()
    };
    let context = Arc::new(DeliveryContext::new());
    let logger = Logger::with_parts(config, &WriterRegistry::with_defaults(), Arc::clone(&context));
    assert_eq!(context.writer_count(), 0);
    logger.info("still works", fields! {});
}

// ============================================================================
// Bulk destination
// ============================================================================

struct Captured {
    body: String,
    authorization: Option<String>,
    url: String,
}

fn bulk_endpoint() -> (String, mpsc::Receiver<Captured>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        while let Ok(Some(mut request)) = server.recv_timeout(Duration::from_secs(10)) {
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());
            let url = request.url().to_string();
            let _ = request.respond(tiny_http::Response::from_string(
                r#"{"took":1,"errors":false,"items":[]}"#,
            ));
            if tx
                .send(Captured {
                    body,
                    authorization,
                    url,
                })
                .is_err()
            {
                break;
            }
        }
    });
    (addr.to_string(), rx)
}

#[test]
fn bulk_pipeline_posts_on_final_drain() {
    let (addr, rx) = bulk_endpoint();
    let config = Config {
        name: "billing".into(),
        destination: format!("es://elastic:secret@{addr}/prod/eu"),
        ..Config::default()
    };
    let context = started_context();
    let logger = Logger::with_parts(config, &WriterRegistry::with_defaults(), Arc::clone(&context))
        .with_trace_id("bulk-1");

    logger.info("first", fields! {});
    logger.info("second", fields! {});
    context.stop();
    context.wait();

    let mut lines = Vec::new();
    let mut authorization = None;
    while let Ok(captured) = rx.recv_timeout(Duration::from_secs(2)) {
        assert_eq!(captured.url, "/_bulk");
        authorization = captured.authorization;
        lines.extend(captured.body.lines().map(str::to_string));
    }

    // "elastic:secret"
    assert_eq!(authorization.as_deref(), Some("Basic ZWxhc3RpYzpzZWNyZXQ="));
    assert_eq!(lines.len(), 4);
    for pair in lines.chunks(2) {
        let header: serde_json::Value = serde_json::from_str(&pair[0]).unwrap();
        assert_eq!(header["index"]["_index"], "prod.eu.billing");
        let event: serde_json::Value = serde_json::from_str(&pair[1]).unwrap();
        assert_eq!(event["traceId"], "bulk-1");
    }
    let messages: Vec<String> = lines
        .iter()
        .skip(1)
        .step_by(2)
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["info"].to_string())
        .collect();
    assert_eq!(messages, ["\"first\"", "\"second\""]);
}
