//! Test data generators for creating synthetic forest-inventory rasters.
//!
//! These generators create predictable, verifiable patterns that can be
//! used across the test suite. All of them return `f64` arrays, matching
//! the in-memory representation of `RasterArray`.

use ndarray::{Array2, Array3, Axis};
use raster_common::{Crs, GeoTransform, RasterArray, SampleType};

use crate::fixtures::transforms;

/// Creates a test band with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that windows are read correctly by
/// checking that `band[[row, col]] == col * 1000 + row`.
///
/// # Example
///
/// ```
/// use test_utils::create_test_band;
///
/// let band = create_test_band(10, 5);
/// assert_eq!(band.dim(), (5, 10));
/// assert_eq!(band[[0, 1]], 1000.0); // col=1, row=0
/// assert_eq!(band[[1, 0]], 1.0);    // col=0, row=1
/// ```
pub fn create_test_band(width: usize, height: usize) -> Array2<f64> {
    Array2::from_shape_fn((height, width), |(row, col)| (col * 1000 + row) as f64)
}

/// Creates a band ramping linearly from `min` at the top-left pixel to
/// `max` at the bottom-right pixel (row-major order).
///
/// Useful for normalization tests: the extremes are exactly `min` and
/// `max`, so they must map to 1 and 255.
pub fn create_gradient_band(width: usize, height: usize, min: f64, max: f64) -> Array2<f64> {
    let last = (width * height).saturating_sub(1).max(1) as f64;
    Array2::from_shape_fn((height, width), |(row, col)| {
        let i = (row * width + col) as f64;
        min + (max - min) * i / last
    })
}

/// Creates a band with `nodata` at the listed `(col, row)` positions and the
/// values of [`create_gradient_band`] elsewhere.
pub fn create_band_with_nodata(
    width: usize,
    height: usize,
    min: f64,
    max: f64,
    nodata: f64,
    positions: &[(usize, usize)],
) -> Array2<f64> {
    let mut band = create_gradient_band(width, height, min, max);
    for &(col, row) in positions {
        if col < width && row < height {
            band[[row, col]] = nodata;
        }
    }
    band
}

/// Creates a year-of-establishment band for reference year 2019.
///
/// Years step down from 2019 so that the youngest stand has age 0 and
/// the oldest is `max_age` years old (which may exceed the 150-year cap).
pub fn create_establishment_year_band(width: usize, height: usize, max_age: u32) -> Array2<f64> {
    let ages = create_gradient_band(width, height, 0.0, max_age as f64);
    // Fractional years floor toward the establishment year.
    ages.mapv(|age| 2019.0 - age.round() + 0.25)
}

/// Land cover codes cycled over the band in row-major order.
pub const LANDCOVER_CYCLE: [u8; 8] = [81, 20, 210, 33, 220, 230, 40, 50];

/// Creates a land cover band that cycles through [`LANDCOVER_CYCLE`].
/// Half of the codes are forest classes.
pub fn create_landcover_band(width: usize, height: usize) -> Array2<f64> {
    Array2::from_shape_fn((height, width), |(row, col)| {
        LANDCOVER_CYCLE[(row * width + col) % LANDCOVER_CYCLE.len()] as f64
    })
}

/// Creates a percentage band covering 0..=100 in integer steps.
pub fn create_percentage_band(width: usize, height: usize) -> Array2<f64> {
    Array2::from_shape_fn((height, width), |(row, col)| ((row * width + col) % 101) as f64)
}

/// Creates a species probability stack where band `i` holds the constant
/// value `values[i]`, so band means are exactly `values`.
pub fn create_species_stack(width: usize, height: usize, values: &[u8]) -> Array3<f64> {
    Array3::from_shape_fn((values.len(), height, width), |(band, _, _)| {
        values[band] as f64
    })
}

/// Stacks single bands into a `bands × rows × cols` array.
///
/// # Panics
///
/// Panics if the bands differ in shape.
pub fn stack_bands(bands: &[Array2<f64>]) -> Array3<f64> {
    let views: Vec<_> = bands.iter().map(|b| b.view()).collect();
    ndarray::stack(Axis(0), &views).expect("bands must share a shape")
}

/// Wraps data in a `RasterArray` georeferenced with
/// [`transforms::LAMBERT_30M`] in Canada Atlas Lambert.
pub fn create_raster(data: Array3<f64>, sample_type: SampleType, nodata: Option<f64>) -> RasterArray {
    RasterArray::new(
        data,
        sample_type,
        transforms::LAMBERT_30M,
        Some(Crs::CANADA_ATLAS_LAMBERT),
        nodata,
    )
}

/// Wraps a single band in a one-band `RasterArray` (see [`create_raster`]).
pub fn create_single_band_raster(
    band: Array2<f64>,
    sample_type: SampleType,
    nodata: Option<f64>,
) -> RasterArray {
    create_raster(band.insert_axis(Axis(0)), sample_type, nodata)
}

/// Creates a raster with an explicit transform, for window resolution tests.
pub fn create_raster_with_transform(
    data: Array3<f64>,
    sample_type: SampleType,
    transform: GeoTransform,
    nodata: Option<f64>,
) -> RasterArray {
    RasterArray::new(
        data,
        sample_type,
        transform,
        Some(Crs::CANADA_ATLAS_LAMBERT),
        nodata,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_band() {
        let band = create_test_band(10, 5);
        assert_eq!(band.dim(), (5, 10));
        assert_eq!(band[[0, 0]], 0.0);
        assert_eq!(band[[0, 1]], 1000.0);
        assert_eq!(band[[4, 9]], 9004.0);
    }

    #[test]
    fn test_create_gradient_band_extremes() {
        let band = create_gradient_band(4, 3, 10.0, 32.0);
        assert_eq!(band[[0, 0]], 10.0);
        assert_eq!(band[[2, 3]], 32.0);
        assert!(band.iter().all(|v| (10.0..=32.0).contains(v)));
    }

    #[test]
    fn test_create_band_with_nodata() {
        let band = create_band_with_nodata(4, 4, 1.0, 2.0, -9999.0, &[(1, 2), (10, 10)]);
        assert_eq!(band[[2, 1]], -9999.0);
        assert_eq!(band.iter().filter(|v| **v == -9999.0).count(), 1);
    }

    #[test]
    fn test_establishment_years() {
        let band = create_establishment_year_band(5, 5, 200);
        let youngest = band.iter().cloned().fold(f64::MIN, f64::max);
        let oldest = band.iter().cloned().fold(f64::MAX, f64::min);
        assert_eq!(2019.0 - youngest.floor(), 0.0);
        assert_eq!(2019.0 - oldest.floor(), 200.0);
    }

    #[test]
    fn test_create_landcover_band() {
        let band = create_landcover_band(4, 2);
        assert_eq!(band[[0, 0]], 81.0);
        assert_eq!(band[[1, 3]], 50.0);
    }

    #[test]
    fn test_create_percentage_band() {
        let band = create_percentage_band(11, 11);
        assert_eq!(band[[0, 0]], 0.0);
        assert_eq!(band[[9, 2]], 100.0);
        assert!(band.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_create_species_stack() {
        let stack = create_species_stack(3, 2, &[5, 0, 9]);
        assert_eq!(stack.dim(), (3, 2, 3));
        assert_eq!(stack[[2, 1, 1]], 9.0);
    }

    #[test]
    fn test_create_single_band_raster() {
        let raster = create_single_band_raster(create_test_band(3, 2), SampleType::F32, None);
        assert_eq!(raster.shape(), (1, 2, 3));
        assert_eq!(raster.crs, Some(Crs::CANADA_ATLAS_LAMBERT));
    }
}
