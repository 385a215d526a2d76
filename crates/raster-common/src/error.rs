//! Error taxonomy for raster windowing, normalization and compositing.

use thiserror::Error;

/// Result type alias using RasterError.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors raised by the numeric core.
///
/// The first seven variants are invariant violations. Callers at the
/// orchestration boundary log them per (tile, product) and keep going;
/// nothing in the core clamps them away.
#[derive(Debug, Error)]
pub enum RasterError {
    // === Window Errors ===
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    // === Value Errors ===
    #[error("Degenerate value range: {0}")]
    DegenerateRange(String),

    #[error("Input data violates assumption: {0}")]
    DataAssumption(String),

    #[error("Inconsistent nodata values: {0:?}")]
    InconsistentNodata(Vec<Option<f64>>),

    // === Compositing Errors ===
    #[error("Shape mismatch: expected {expected:?}, found {found:?} in {source_name}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
        source_name: String,
    },

    #[error("Missing input artifact: {0}")]
    MissingInput(String),

    // === General ===
    #[error("Invalid raster data: {0}")]
    InvalidData(String),
}

impl RasterError {
    /// Create an InvalidWindow error.
    pub fn invalid_window(msg: impl Into<String>) -> Self {
        Self::InvalidWindow(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create a DegenerateRange error.
    pub fn degenerate_range(msg: impl Into<String>) -> Self {
        Self::DegenerateRange(msg.into())
    }

    /// Create a DataAssumption error.
    pub fn data_assumption(msg: impl Into<String>) -> Self {
        Self::DataAssumption(msg.into())
    }

    /// Create a MissingInput error.
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Create an InvalidData error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Short, stable name of the error kind for logs and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RasterError::InvalidWindow(_) => "InvalidWindowError",
            RasterError::InvalidGeometry(_) => "InvalidGeometryError",
            RasterError::DegenerateRange(_) => "DegenerateRangeError",
            RasterError::DataAssumption(_) => "DataAssumptionError",
            RasterError::InconsistentNodata(_) => "InconsistentNodataError",
            RasterError::ShapeMismatch { .. } => "ShapeMismatchError",
            RasterError::MissingInput(_) => "MissingInputError",
            RasterError::InvalidData(_) => "InvalidDataError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        assert_eq!(
            RasterError::invalid_window("w <= 0").kind(),
            "InvalidWindowError"
        );
        assert_eq!(
            RasterError::InconsistentNodata(vec![Some(0.0), None]).kind(),
            "InconsistentNodataError"
        );
        assert_eq!(
            RasterError::ShapeMismatch {
                expected: (10, 10),
                found: (5, 10),
                source_name: "b.tif".to_string(),
            }
            .kind(),
            "ShapeMismatchError"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = RasterError::ShapeMismatch {
            expected: (100, 100),
            found: (100, 99),
            source_name: "total_biomass-tile-435.tif".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("total_biomass-tile-435.tif"));
        assert!(msg.contains("(100, 99)"));
    }
}
