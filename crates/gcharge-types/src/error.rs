//! Error types for cockpit records and stores

use thiserror::Error;

/// Main error type for cockpit record operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CockpitError {
    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Record already exists
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: String, id: String },

    /// Record or input failed validation
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File system error
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// An external operation (upload, install) reported failure
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
}

impl CockpitError {
    /// Create a not found error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an already exists error
    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an operation failure
    pub fn operation_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if the error is recoverable by the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::Validation { .. }
                | Self::OperationFailed { .. }
        )
    }
}

impl From<std::io::Error> for CockpitError {
    fn from(err: std::io::Error) -> Self {
        CockpitError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CockpitError {
    fn from(err: serde_json::Error) -> Self {
        CockpitError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for cockpit record operations
pub type CockpitResult<T> = Result<T, CockpitError>;
