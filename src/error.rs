//! Error types for the signal pipeline.
//!
//! Only construction and the explicit `send` path surface these to callers.
//! Everything on the fire-and-forget path is logged and swallowed.

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::dispatch::TransportError;

/// Crate-level error.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport rejected or failed to deliver a batch.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local storage failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, SignalError>;
