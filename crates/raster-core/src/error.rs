//! Error types for the raster engine.

use thiserror::Error;

/// Result type alias using RasterError.
pub type RasterResult<T> = Result<T, RasterError>;

/// Primary error type for raster storage operations.
#[derive(Debug, Error)]
pub enum RasterError {
    // === Structural Errors ===
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Layer {layer} out of range (raster has {layer_count} layers)")]
    LayerOutOfRange { layer: usize, layer_count: usize },

    #[error("Invalid raster name: {0}")]
    InvalidName(String),

    // === Data Errors ===
    #[error("Raster not found: {0}")]
    NotFound(String),

    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Coordinate ({row}, {col}) is outside the valid cell set")]
    OutOfMask { row: u32, col: u32 },

    // === Backend Errors ===
    #[error("Write denied: {0}")]
    WriteDenied(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

// Conversion from common error types
impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        RasterError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for RasterError {
    fn from(err: serde_json::Error) -> Self {
        RasterError::MalformedHeader(format!("header document: {}", err))
    }
}
