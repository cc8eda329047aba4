//! evlog core: the structured-event pipeline.
//!
//! An [`Event`] built by the producer is redacted, encoded to one JSON line,
//! and handed to a writer that only enqueues it. The delivery loop in
//! [`evlog_writer::DeliveryContext`] does the I/O.
//!
//! ```no_run
//! use evlog_common::{fields, Config};
//! use evlog_core::Logger;
//!
//! evlog_core::start().expect("delivery loop");
//! let logger = Logger::new(Config::default());
//! logger.info("ready", fields! { "port" => 8080 });
//! evlog_core::stop();
//! evlog_core::wait();
//! ```

pub mod encode;
pub mod exit_codes;
pub mod logger;
pub mod logging;
pub mod parse;
pub mod view;

pub use encode::{encode, encode_raw, EncodeError};
pub use logger::Logger;
pub use parse::{parse_line, ParsedLine};

pub use evlog_common::{fields, Config, Event, Fields, Level, Value};
pub use evlog_writer::DeliveryContext;

/// Start the process-wide delivery loop.
pub fn start() -> evlog_writer::Result<()> {
    DeliveryContext::global().start()
}

/// Ask the process-wide delivery loop to finish. Does not block.
pub fn stop() {
    DeliveryContext::global().stop();
}

/// Block until the process-wide loop has done its final drain.
pub fn wait() {
    DeliveryContext::global().wait();
}
