//! Georeferencing profile of a raster file.

use std::collections::BTreeMap;

use raster_common::{
    resolve_nodata, Crs, GeoTransform, RasterArray, RasterResult, SampleType, Window,
};
use serde::{Deserialize, Serialize};

/// Everything needed to interpret or recreate a raster file except its
/// pixels: dimensions, encoding, georeferencing, nodata and metadata items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub sample_type: SampleType,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
    /// One entry per band.
    pub nodata: Vec<Option<f64>>,
    /// Free-form `GDAL_METADATA` items (e.g. `top_species`).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RasterProfile {
    /// Profile describing an in-memory array.
    pub fn for_array(array: &RasterArray) -> Self {
        Self {
            width: array.width(),
            height: array.height(),
            count: array.bands(),
            sample_type: array.sample_type,
            transform: array.transform,
            crs: array.crs,
            nodata: vec![array.nodata; array.bands()],
            metadata: BTreeMap::new(),
        }
    }

    /// The single nodata value shared by all bands.
    pub fn resolved_nodata(&self) -> RasterResult<Option<f64>> {
        resolve_nodata(&self.nodata)
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Full-extent window of this raster.
    pub fn full_window(&self) -> RasterResult<Window> {
        Window::full(self.width, self.height)
    }
}
