//! Error type for session operations.

use thiserror::Error;

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error type for session control operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session id is not registered (never spawned, exited or killed)
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// The spawn request was rejected before any process was created
    #[error("invalid command {command:?}: {reason}")]
    InvalidCommand { command: String, reason: String },

    /// Opening the PTY, spawning or signalling the child failed
    #[error("pty operation failed: {0}")]
    Pty(#[from] anyhow::Error),

    /// Writing to the PTY failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Shorthand for [`SessionError::SessionNotFound`]
    pub fn not_found(id: impl Into<String>) -> Self {
        SessionError::SessionNotFound { id: id.into() }
    }
}
