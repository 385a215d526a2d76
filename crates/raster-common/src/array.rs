//! In-memory raster buffers.

use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crs::Crs;
use crate::error::{RasterError, RasterResult};
use crate::transform::GeoTransform;

/// Sample encoding of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Bits per sample.
    pub fn bits(&self) -> u16 {
        match self {
            SampleType::U8 => 8,
            SampleType::U16 | SampleType::I16 => 16,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 32,
            SampleType::F64 => 64,
        }
    }

    /// Bytes per sample.
    pub fn size(&self) -> usize {
        self.bits() as usize / 8
    }

    /// TIFF SampleFormat code: 1 = unsigned, 2 = signed, 3 = IEEE float.
    pub fn sample_format(&self) -> u16 {
        match self {
            SampleType::U8 | SampleType::U16 | SampleType::U32 => 1,
            SampleType::I16 | SampleType::I32 => 2,
            SampleType::F32 | SampleType::F64 => 3,
        }
    }

    /// Inverse of [`bits`](Self::bits) + [`sample_format`](Self::sample_format).
    pub fn from_tiff(bits: u16, sample_format: u16) -> Option<Self> {
        match (sample_format, bits) {
            (1, 8) => Some(SampleType::U8),
            (1, 16) => Some(SampleType::U16),
            (1, 32) => Some(SampleType::U32),
            (2, 16) => Some(SampleType::I16),
            (2, 32) => Some(SampleType::I32),
            (3, 32) => Some(SampleType::F32),
            (3, 64) => Some(SampleType::F64),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::F32 | SampleType::F64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::U8 => "uint8",
            SampleType::U16 => "uint16",
            SampleType::I16 => "int16",
            SampleType::U32 => "uint32",
            SampleType::I32 => "int32",
            SampleType::F32 => "float32",
            SampleType::F64 => "float64",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `bands × rows × cols` raster buffer with its georeferencing.
///
/// Values are held as `f64` regardless of the on-disk encoding; every
/// integer type the tiler reads (up to 32 bits) is exactly representable.
/// `sample_type` records the encoding to use when the array is written.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterArray {
    pub data: Array3<f64>,
    pub sample_type: SampleType,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
    pub nodata: Option<f64>,
}

impl RasterArray {
    pub fn new(
        data: Array3<f64>,
        sample_type: SampleType,
        transform: GeoTransform,
        crs: Option<Crs>,
        nodata: Option<f64>,
    ) -> Self {
        Self {
            data,
            sample_type,
            transform,
            crs,
            nodata,
        }
    }

    /// Wrap an 8-bit product (normalized values or masks).
    pub fn from_u8(
        data: Array3<u8>,
        transform: GeoTransform,
        crs: Option<Crs>,
        nodata: Option<f64>,
    ) -> Self {
        Self::new(data.mapv(f64::from), SampleType::U8, transform, crs, nodata)
    }

    /// Wrap a floating-point product (z-scores).
    pub fn from_f32(
        data: Array3<f32>,
        transform: GeoTransform,
        crs: Option<Crs>,
        nodata: Option<f64>,
    ) -> Self {
        Self::new(data.mapv(f64::from), SampleType::F32, transform, crs, nodata)
    }

    pub fn bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// `(bands, rows, cols)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Zero-based band view.
    pub fn band(&self, index: usize) -> RasterResult<ArrayView2<'_, f64>> {
        if index >= self.bands() {
            return Err(RasterError::invalid_data(format!(
                "band {} requested from a {}-band array",
                index,
                self.bands()
            )));
        }
        Ok(self.data.index_axis(Axis(0), index))
    }

    /// Whether `value` is nodata under this array's convention. NaN is
    /// always treated as nodata.
    pub fn is_nodata(&self, value: f64) -> bool {
        is_nodata_value(value, self.nodata)
    }
}

/// NaN, or equal to the declared nodata value.
pub fn is_nodata_value(value: f64, nodata: Option<f64>) -> bool {
    value.is_nan() || nodata.map_or(false, |nd| value == nd)
}

/// Collapse per-band nodata values into one.
///
/// The values must be all absent or all equal (NaN matching NaN);
/// anything else is an `InconsistentNodata` error.
pub fn resolve_nodata(per_band: &[Option<f64>]) -> RasterResult<Option<f64>> {
    let first = match per_band.first() {
        Some(v) => *v,
        None => return Ok(None),
    };

    let same = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => false,
    };

    if per_band.iter().all(|v| same(*v, first)) {
        Ok(first)
    } else {
        Err(RasterError::InconsistentNodata(per_band.to_vec()))
    }
}
