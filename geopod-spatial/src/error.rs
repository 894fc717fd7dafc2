//! Error types for the spatial index.

use thiserror::Error;

/// Spatial index errors.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// Error surfaced by the container binding.
    #[error("Container error: {0}")]
    Core(#[from] geopod_core::Error),

    /// Geometry blob could not be decoded.
    #[error("Geometry decode error: {0}")]
    Decode(String),

    /// Query against a table with no built index backend.
    #[error("Table is not indexed: {0}")]
    NotIndexed(String),

    /// Backend-specific surface used before that backend was created.
    #[error("Index backend not created: {0}")]
    NotCreated(String),

    /// Operation the runtime environment cannot support.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Coordinate reference transform failure.
    #[error("Projection transform error: {0}")]
    Transform(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for spatial operations.
pub type Result<T> = std::result::Result<T, SpatialError>;
