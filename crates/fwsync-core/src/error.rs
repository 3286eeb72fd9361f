//! Error types for fwsync
//!
//! Every failure kind the engine and the adapters can surface lives here.
//! Errors propagate unwrapped to the invocation boundary; nothing is retried.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for fwsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fwsync
#[derive(Error, Debug)]
pub enum Error {
    /// No config record exists at the expected location
    #[error("configuration not found at {}; run `fwsync init` first", .0.display())]
    ConfigNotFound(PathBuf),

    /// The config record exists but cannot be decoded
    #[error("malformed configuration at {}: {message}", .path.display())]
    ConfigMalformed {
        /// Location of the record
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// Another fwsync process holds the config record
    #[error(
        "configuration is in use by another fwsync process (lock {})",
        .0.display()
    )]
    ConfigLocked(PathBuf),

    /// Invalid settings (CLI arguments or record contents)
    #[error("configuration error: {0}")]
    Config(String),

    /// The public IP could not be discovered
    #[error("public IP discovery failed: {0}")]
    Discovery(String),

    /// Credential or handshake failure surfaced by an adapter
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The named firewall resource does not exist remotely
    #[error("firewall not found: {0}")]
    NotFound(String),

    /// More than one remote firewall matches a lookup
    #[error("ambiguous firewall lookup: {0}")]
    Ambiguous(String),

    /// The remote push failed after the local record was already persisted
    #[error(
        "local configuration was updated, but syncing the firewall failed: {0}; run `fwsync sync` to retry"
    )]
    Sync(#[source] Box<Error>),

    /// The configured provider tag maps to no registered adapter
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The call that timed out
        operation: String,
        /// The deadline that elapsed
        after: Duration,
    },

    /// Provider-specific error passed through from the backend
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an ambiguity error
    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::Ambiguous(msg.into())
    }

    /// Create an invalid provider error
    pub fn invalid_provider(name: impl Into<String>) -> Self {
        Self::InvalidProvider(name.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wrap a push failure that happened after the local record was saved
    pub fn sync(source: Error) -> Self {
        Self::Sync(Box::new(source))
    }

    /// True for the not-found class
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for errors caused by local configuration rather than the network
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigMalformed { .. }
                | Self::ConfigLocked(_)
                | Self::Config(_)
                | Self::InvalidProvider(_)
        )
    }
}
