//! Error types for the Consul herald

use thiserror::Error;

/// Failure talking to the registry backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Registry answered with a non-success status
    #[error("Registry error {status}: {message}")]
    Status { status: u16, message: String },

    /// Registry answered with a body we could not understand
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Backend refused the call (in-process backends, injected faults)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Herald error
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Invalid port {port:?}: {reason}")]
    InvalidPort { port: String, reason: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Failed to encode service definition: {0}")]
    Encoding(String),

    #[error("Failed to decode service definition at {key}: {reason}")]
    Decoding { key: String, reason: String },

    #[error("No service definition at {0}")]
    NotFound(String),

    #[error("No active registration for instance {0}")]
    UnknownInstance(String),

    #[error("Instance {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Herald not initialized, call init() first")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for herald operations
pub type Result<T> = std::result::Result<T, HeraldError>;
