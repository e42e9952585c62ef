use sluice_core::{ErrorMetadata, LogLevel, ValveError};

#[derive(Debug, thiserror::Error)]
pub enum RegulatorError {
    /// The regulator task has exited; no further calls are possible.
    #[error("Regulator stopped")]
    Stopped,

    #[error(transparent)]
    Valve(#[from] ValveError),

    #[error("Invalid regulator configuration: {0}")]
    InvalidConfiguration(String),
}

impl ErrorMetadata for RegulatorError {
    fn error_code(&self) -> &'static str {
        match self {
            RegulatorError::Stopped => "REGULATOR_STOPPED",
            RegulatorError::Valve(e) => e.error_code(),
            RegulatorError::InvalidConfiguration(_) => "INVALID_REGULATOR_CONFIGURATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            RegulatorError::Valve(e) => e.is_recoverable(),
            // A stopped regulator can be replaced by a successor.
            RegulatorError::Stopped => true,
            RegulatorError::InvalidConfiguration(_) => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            RegulatorError::Stopped => LogLevel::Warn,
            RegulatorError::Valve(e) => e.log_level(),
            RegulatorError::InvalidConfiguration(_) => LogLevel::Error,
        }
    }
}

pub type RegulatorResult<T> = Result<T, RegulatorError>;
