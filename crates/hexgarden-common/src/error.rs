//! Error types for Hexgarden.
//!
//! Expected simulation failures (missing soil, occupied space) are reported
//! through return values, not errors. These types cover plant snapshots;
//! configuration files report through the sim crate's `ConfigError`.

use thiserror::Error;

/// Top-level error type for Hexgarden operations.
#[derive(Debug, Error)]
pub enum HexGardenError {
    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// Result type alias for Hexgarden operations.
pub type HexGardenResult<T> = Result<T, HexGardenError>;
