//! Common types shared by the forest raster tiler crates.
//!
//! - [`BoundingBox`]: world-space extent of a tile or raster
//! - [`GeoTransform`]: six-coefficient affine transform (GDAL ordering)
//! - [`Window`] / [`PixelBox`]: integral pixel rectangles
//! - [`RasterArray`]: a `bands × rows × cols` buffer with its georeferencing
//! - [`RasterError`]: the error taxonomy of the windowing/normalization core

pub mod array;
pub mod bbox;
pub mod crs;
pub mod error;
pub mod transform;
pub mod window;

pub use array::{is_nodata_value, resolve_nodata, RasterArray, SampleType};
pub use bbox::{BboxParseError, BoundingBox};
pub use crs::Crs;
pub use error::{RasterError, RasterResult};
pub use transform::GeoTransform;
pub use window::{PixelBox, Window};
