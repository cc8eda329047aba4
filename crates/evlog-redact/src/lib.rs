//! Redaction engine for evlog events.
//!
//! Sensitive data is rewritten before an event is serialized. Two mechanisms
//! run over every event:
//!
//! - **Field names**: any leaf whose (normalized) field name is in the
//!   sensitive set is masked wholesale.
//! - **Patterns**: every remaining string or number leaf is scanned with the
//!   configured regexes, and matching capture groups are masked in place.
//!
//! Masking keeps a configurable number of leading and trailing characters
//! (see [`MaskingRules`]). The engine never mutates its input: it returns a
//! new event that shares every subtree it did not rewrite.
//!
//! # Example
//!
//! ```
//! use evlog_common::{fields, Event};
//! use evlog_redact::{RedactionPolicy, Redactor};
//!
//! let redactor = Redactor::new(&RedactionPolicy::default());
//! let event = Event::new("info").with_fields(fields! { "password" => "abcd1234" });
//! let redacted = redactor.redact(&event);
//! assert_eq!(redacted.get("password").and_then(|v| v.as_str()), Some("ab****34"));
//! ```

pub mod engine;
pub mod error;
pub mod policy;
pub mod rule;

pub use engine::{normalize_field_name, Masker, Redactor};
pub use error::{RedactionError, Result};
pub use policy::RedactionPolicy;
pub use rule::{MaskingRule, MaskingRules, GENERIC_MASK};
