use std::fmt;

use serde_json::json;
use tracing::{error, warn};

pub mod categories;

pub use categories::ErrorCategory;


/// Standard result type used by the library operations
pub type LspResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors for common error types
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::ValidationError, message)
    }

    pub fn out_of_range(value: u64, min: u64, max: u64) -> Self {
        Self::with_category(
            ErrorCategory::OutOfRange,
            format!("Channel size {value} sats is outside the allowed range [{min}, {max}]"),
        )
        .with_details(json!({ "value": value, "min": min, "max": max }))
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::TransportError, message)
    }

    /// Parse failure that keeps the offending payload for diagnostics
    pub fn parse_error(message: impl Into<String>, raw_payload: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::ParseError, message)
            .with_details(json!({ "raw_payload": raw_payload.into() }))
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::ConfigurationError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InternalError, message)
    }

    pub fn with_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Raw payload attached by [`AppError::parse_error`], if any
    pub fn raw_payload(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("raw_payload"))
            .and_then(|v| v.as_str())
    }

    /// Log the error at a level matching its category
    pub fn log(&self, operation: &str) {
        if self.category.is_validation_error() {
            warn!(
                operation = %operation,
                category = ?self.category,
                code = self.category.error_code(),
                message = %self.message,
                details = ?self.details,
                "Request rejected before reaching the LSP"
            );
        } else {
            error!(
                operation = %operation,
                category = ?self.category,
                code = self.category.error_code(),
                message = %self.message,
                details = ?self.details,
                source = ?self.source,
                "LSP operation failed"
            );
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self.category {
            ErrorCategory::TransportError => {
                format!("Could not reach the LSP: {}", self.message)
            }
            ErrorCategory::ParseError => {
                format!("The LSP returned an unexpected response: {}", self.message)
            }
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_error(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_category(
            ErrorCategory::ParseError,
            format!("JSON parsing error: {}", err),
        )
        .with_source(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let mut app_error = Self::transport_error(format!("HTTP request failed: {}", err));
        if let Some(status) = err.status() {
            app_error = app_error.with_details(json!({ "status": status.as_u16() }));
        }
        app_error.with_source(err)
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::configuration_error(format!("Invalid URL: {}", err)).with_source(err)
    }
}
