//! Error types shared across the relay.
//!
//! Each concern gets its own enum so callers can tell fatal startup problems
//! (`RelayError`, `BrokerError` during setup) apart from per-message failures
//! (`PublishError`, `ValidationError`) that are only ever logged.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by the in-process broker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("unsupported broker url '{0}', expected memory://")]
    UnsupportedUrl(String),

    #[error("broker connection is closed")]
    ConnectionClosed,

    #[error("queue '{name}' already declared with different properties")]
    RedeclarationConflict { name: String },

    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    #[error("publish deadline passed before the broker accepted the message")]
    DeadlineExceeded,
}

/// Outcome of a failed publish attempt. Always transient from the caller's
/// point of view: it is logged and the message is dropped.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish to '{queue}' timed out after {timeout:?}")]
    Timeout { queue: String, timeout: Duration },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PublishError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PublishError::Timeout { .. } | PublishError::Broker(BrokerError::DeadlineExceeded)
        )
    }
}

/// Why a credential check did not produce a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Fatal errors. Any of these during startup terminates the process.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("broker setup failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
