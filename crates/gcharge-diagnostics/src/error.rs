//! # Diagnostics Error Handling
//!
//! Errors raised while setting up a diagnostic run. Outcomes of individual
//! checks are never errors: a failed check is a terminal step status carried
//! by the run data, and cancellation is reported through the completion
//! channel like a natural finish.

use thiserror::Error;

/// Diagnostics error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosticsError {
    /// Invalid step list or sequencer configuration; no run was created
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A run is already in flight for the target
    #[error("Diagnostics already running for target '{target_id}'")]
    AlreadyRunningError { target_id: String },

    /// Resource not found error
    #[error("Resource not found: {resource_type} '{resource_id}'")]
    ResourceNotFoundError {
        resource_type: String,
        resource_id: String,
    },

    /// I/O error while reading or writing configuration
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DiagnosticsError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Create an already running error
    pub fn already_running(target_id: impl Into<String>) -> Self {
        Self::AlreadyRunningError {
            target_id: target_id.into(),
        }
    }

    /// Create a resource not found error
    pub fn resource_not_found(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::ResourceNotFoundError {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::IoError(message.into())
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError(message.into())
    }

    /// Check if the caller can retry the same request later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyRunningError { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigurationError(_) => "configuration",
            Self::AlreadyRunningError { .. } => "concurrency",
            Self::ResourceNotFoundError { .. } => "not_found",
            Self::IoError(_) => "io",
            Self::SerializationError(_) => "serialization",
        }
    }
}

impl From<std::io::Error> for DiagnosticsError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for DiagnosticsError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DiagnosticsError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for DiagnosticsError {
    fn from(err: toml::ser::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for diagnostics operations
pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;
