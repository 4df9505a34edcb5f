//! Error Types
//!
//! Defines the crate-wide error taxonomy. All errors are raised synchronously
//! at the point of detection and carry the offending values (shapes, indices,
//! counts) in their message; nothing in the core recovers internally.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, ActiveSslError>;

/// Errors produced by the active/semi-supervised learning core
#[derive(Debug, Error)]
pub enum ActiveSslError {
    /// Invalid percentage/size configuration detected at build time
    #[error("configuration error: {0}")]
    Config(String),

    /// A matrix had a different shape than the one expected
    #[error("shape mismatch: expected {expected:?} but got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// An index batch had a different length than the configured batch shape
    #[error("length mismatch: expected {expected} but got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A caller broke a bookkeeping invariant (e.g. re-pooling a pooled index)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A selection round requested more growth than the unpool set can supply
    #[error("insufficient samples: requested {requested} but only {available} unpooled")]
    InsufficientSamples { requested: usize, available: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(String),
}
