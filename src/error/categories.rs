use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // Rejected before any network call
    ValidationError,
    OutOfRange,

    // LSP / backend communication
    TransportError,
    ParseError,

    // Local setup
    ConfigurationError,
    InternalError,
}

impl ErrorCategory {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Errors raised by local checks, before a request was attempted.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError | Self::OutOfRange | Self::ConfigurationError
        )
    }

    /// Whether a later attempt of the same operation may succeed. Nothing
    /// retries automatically; pollers use this only to pick a log level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_code())
    }
}
