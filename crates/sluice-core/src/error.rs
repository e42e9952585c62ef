//! Error types module
//!
//! Valve errors are small and local: the only failure a valve reports is a
//! configuration it cannot apply. Bookkeeping mismatches (unknown tokens) are
//! surfaced as outcomes, not errors.

use std::fmt;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for failures the caller must fix
    Error,
}

/// Metadata describing how an error should be reported by callers.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "NEGATIVE_CAPACITY")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same call could succeed
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValveError {
    #[error("Invalid capacity: {0} is negative")]
    NegativeCapacity(i64),

    #[error("Malformed capacity value: {0:?}")]
    MalformedCapacity(String),
}

impl ErrorMetadata for ValveError {
    fn error_code(&self) -> &'static str {
        match self {
            ValveError::NegativeCapacity(_) => "NEGATIVE_CAPACITY",
            ValveError::MalformedCapacity(_) => "MALFORMED_CAPACITY",
        }
    }

    fn is_recoverable(&self) -> bool {
        // No retry is meaningful without a corrected value.
        false
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Error
    }
}

pub type ValveResult<T> = Result<T, ValveError>;

/// Log an error at the level its metadata asks for.
pub fn log_error<E>(error: &E)
where
    E: ErrorMetadata + fmt::Display + ?Sized,
{
    let code = error.error_code();
    let recoverable = error.is_recoverable();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, code, recoverable, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, code, recoverable, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, code, recoverable, "Error occurred");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_recoverable() {
        let errors = [
            ValveError::NegativeCapacity(-1),
            ValveError::MalformedCapacity("lots".into()),
        ];
        for err in errors {
            assert!(!err.is_recoverable());
            assert_eq!(err.log_level(), LogLevel::Error);
        }
    }

    #[test]
    fn error_codes_and_messages() {
        let err = ValveError::NegativeCapacity(-3);
        assert_eq!(err.error_code(), "NEGATIVE_CAPACITY");
        assert_eq!(err.to_string(), "Invalid capacity: -3 is negative");

        let err = ValveError::MalformedCapacity("ten".into());
        assert_eq!(err.error_code(), "MALFORMED_CAPACITY");
        assert_eq!(err.to_string(), "Malformed capacity value: \"ten\"");
    }
}
