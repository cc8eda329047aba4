//! evlog common types, configuration, and errors.
//!
//! This crate provides the foundational types shared by every evlog crate:
//! - The event model (`Event`, `Value`, `Fields`, `Level`)
//! - Logger configuration and its resolution (file → env → defaults)
//! - Process identity fields merged into every event
//! - Common error types

pub mod config;
pub mod error;
pub mod event;
pub mod identity;

pub use config::{
    Config, ConfigResolver, ConfigSource, Diagnostics, DiagnosticsFormat, DiagnosticsLevel,
};
pub use error::{Error, Result};
pub use event::{is_reserved_field, Event, Fields, Level, Value, RESERVED_FIELDS};
pub use identity::{resolve_app_name, Identity};

/// Build a [`Fields`] payload from `key => value` pairs.
///
/// ```
/// use evlog_common::fields;
///
/// let extra = fields! { "userId" => 31123, "phone" => "13912345678" };
/// assert_eq!(extra.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(
            fields.insert($key, $value);
        )+
        fields
    }};
}
