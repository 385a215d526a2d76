//! Error types for the tile pipeline.

use raster_common::RasterError;
use raster_io::RasterIoError;
use thiserror::Error;

/// Errors that can occur while building or running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invariant violation from the windowing/normalization core.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Reading or writing an artifact failed.
    #[error(transparent)]
    Io(RasterIoError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),
}

impl From<RasterIoError> for PipelineError {
    fn from(err: RasterIoError) -> Self {
        // Keep the core taxonomy visible when it crossed the I/O layer.
        match err {
            RasterIoError::Raster(e) => Self::Raster(e),
            other => Self::Io(other),
        }
    }
}

impl PipelineError {
    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Short, stable name of the error kind for logs and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Raster(e) => e.kind(),
            PipelineError::Io(_) => "IoError",
            PipelineError::InvalidConfig(_) => "ConfigError",
            PipelineError::UnknownProduct(_) => "UnknownProductError",
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
