//! Error types for the iotree runtime
//!
//! Protocol-level outcomes (misrouted requests, dead children, deadlines) are
//! never errors; they surface as readings or as silence. The types here cover
//! the edges: configuration, boot, and caller-side asks.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file could not be read or written
    #[error("Config file error for {path}: {source}")]
    ConfigFile {
        /// Path of the config file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A caller-side request did not complete
    #[error("Ask error: {0}")]
    Ask(#[from] AskError),
}

/// Failure of a caller-side request/response exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AskError {
    /// No reply arrived within the caller's deadline
    #[error("no reply from {target} within {timeout:?}")]
    TimedOut {
        /// Path of the entity that was asked
        target: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// The entity had exited before the request could be delivered
    #[error("entity {0} is no longer running")]
    Gone(String),

    /// Every copy of the reply address was dropped without a reply
    #[error("request to {0} was dropped without a reply")]
    Unanswered(String),
}

/// Failure raised by an entity handler
///
/// A handler error stops the entity; it is never restarted.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The handler hit a state it cannot continue from
    #[error("Handler failed: {0}")]
    HandlerFailed(String),
}

/// Convenience result alias for entity handlers
pub type ActorResult<T> = std::result::Result<T, ActorError>;

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;
