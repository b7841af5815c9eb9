//! Spout error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, SpoutError>;

/// Errors that can abort spout construction.
///
/// Per-line conditions (malformed payloads, queue overflow) are never
/// surfaced here; they are folded into the drop counter and the stream
/// keeps going. Per-connection failures are resolved internally by
/// reconnecting.
#[derive(Error, Debug)]
pub enum SpoutError {
    /// Invalid subscription parameters (unsupported data kind, bad URL).
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// Registration was rejected or did not yield a redirect.
    #[error("stream setup failed: {reason}")]
    Setup { reason: String },

    /// HTTP transport failure during registration.
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },
}

impl SpoutError {
    /// Create a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a setup error.
    pub fn setup(reason: impl Into<String>) -> Self {
        Self::Setup {
            reason: reason.into(),
        }
    }
}
