//! Error types for raster and vector I/O.

use raster_common::RasterError;
use thiserror::Error;

/// Errors that can occur while reading or writing rasters and tile grids.
#[derive(Error, Debug)]
pub enum RasterIoError {
    /// Failed to open a raster or vector source.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Other filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// The file uses a layout the reader does not handle.
    #[error("unsupported raster layout: {0}")]
    Unsupported(String),

    /// Invariant violation in the data read or written.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// The AOI tile grid could not be interpreted.
    #[error("invalid tile grid: {0}")]
    TileGrid(String),

    /// An external tool exited unsuccessfully or could not be started.
    #[error("external command failed: {0}")]
    Command(String),
}

impl RasterIoError {
    /// Create an Open error.
    pub fn open(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a TileGrid error.
    pub fn tile_grid(msg: impl Into<String>) -> Self {
        Self::TileGrid(msg.into())
    }
}

impl From<tiff::TiffError> for RasterIoError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Tiff(err.to_string())
    }
}

impl From<serde_json::Error> for RasterIoError {
    fn from(err: serde_json::Error) -> Self {
        Self::TileGrid(err.to_string())
    }
}

/// Result type for raster I/O operations.
pub type Result<T> = std::result::Result<T, RasterIoError>;
