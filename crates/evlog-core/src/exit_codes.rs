//! Exit codes for the `evlog` CLI.
//!
//! Ranges:
//! - 0: success
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Clean = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Config file unreadable or invalid
    ConfigError = 11,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Name used in JSON error payloads.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&evlog_common::Error> for ExitCode {
    fn from(error: &evlog_common::Error) -> Self {
        match error.category() {
            evlog_common::error::ErrorCategory::Config => ExitCode::ConfigError,
            evlog_common::error::ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(!ExitCode::Clean.is_error());
        assert!(ExitCode::ArgsError.is_error());
        assert_eq!(ExitCode::IoError.as_i32(), 21);
        assert_eq!(ExitCode::ConfigError.code_name(), "ERR_CONFIG");
    }

    #[test]
    fn test_from_config_error() {
        let err = evlog_common::Error::Config("bad".into());
        assert_eq!(ExitCode::from(&err), ExitCode::ConfigError);
    }
}
