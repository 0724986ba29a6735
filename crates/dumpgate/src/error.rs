//! Error types for artifact access.

use serde::{Deserialize, Serialize};

/// Access errors.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Name is not a well-formed composite identifier.
    #[error("malformed identifier: {name} - {reason}")]
    MalformedIdentifier { name: String, reason: String },

    /// No matching event, or no file at the resolved path.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Event or policy backend unreachable or erroring.
    #[error("backend unavailable: {backend}: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Denied by the policy engine.
    #[error("access denied by policy {policy}: {message}")]
    PolicyDenied { policy: String, message: String },

    /// Step-up escalation was attempted and not approved.
    #[error("step-up required or failed for {scope}: {reason}")]
    StepUpFailed { scope: String, reason: String },

    /// Mutating operation on a read-only deployment.
    #[error("unsupported operation on read-only storage: {operation}")]
    UnsupportedOperation { operation: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Stable error kind, for callers that render their own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    MalformedIdentifier,
    NotFound,
    BackendUnavailable,
    PolicyDenied,
    StepUpFailed,
    UnsupportedOperation,
    Config,
}

impl AccessError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub(crate) fn unavailable(backend: &str, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(operation: &str) -> Self {
        Self::UnsupportedOperation {
            operation: operation.to_string(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedIdentifier { .. } => ErrorKind::MalformedIdentifier,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            Self::StepUpFailed { .. } => ErrorKind::StepUpFailed,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Bad input / config
            Self::MalformedIdentifier { .. } => 1,
            Self::Config { .. } => 1,
            Self::NotFound { .. } => 1,

            // Denials
            Self::PolicyDenied { .. } => 2,
            Self::StepUpFailed { .. } => 3,

            // Network/transient
            Self::BackendUnavailable { .. } => 5,

            Self::UnsupportedOperation { .. } => 6,
        }
    }

    /// Whether the request was refused, as opposed to failing.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::PolicyDenied { .. } | Self::StepUpFailed { .. })
    }
}

impl From<reqwest::Error> for AccessError {
    fn from(err: reqwest::Error) -> Self {
        let backend = err
            .url()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| "http".to_string());
        Self::BackendUnavailable {
            backend,
            message: err.to_string(),
        }
    }
}

/// Result type for access operations.
pub type AccessResult<T> = Result<T, AccessError>;
