//! Affine pixel ↔ world transforms.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{RasterError, RasterResult};

/// Six-coefficient affine transform in GDAL ordering.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// North-up rasters have zero rotations and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with the top-left corner at `(origin_x, origin_y)`
    /// and square-or-rectangular pixels of `res_x × res_y` (both positive).
    pub fn north_up(origin_x: f64, origin_y: f64, res_x: f64, res_y: f64) -> Self {
        Self {
            origin_x,
            pixel_width: res_x,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -res_y,
        }
    }

    /// Build from the GDAL `GetGeoTransform` array.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    /// The GDAL `GetGeoTransform` array.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// True when both rotation terms are zero.
    pub fn is_rectilinear(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }

    /// World coordinate of the top-left corner of pixel `(col, row)`.
    /// Fractional inputs address positions inside a pixel.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Fractional `(col, row)` of a world coordinate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> RasterResult<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det == 0.0 || !det.is_finite() {
            return Err(RasterError::invalid_window(format!(
                "transform {:?} is not invertible",
                self.to_gdal()
            )));
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.row_rotation) / det;
        let row = (dy * self.pixel_width - dx * self.col_rotation) / det;
        Ok((col, row))
    }

    /// Transform of a sub-array whose top-left pixel is `(col_off, row_off)`.
    pub fn shifted(&self, col_off: usize, row_off: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_world(col_off as f64, row_off as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// World extent covered by a `width × height` raster.
    pub fn extent(&self, width: usize, height: usize) -> BoundingBox {
        let corners = [
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(width as f64, 0.0),
            self.pixel_to_world(0.0, height as f64),
            self.pixel_to_world(width as f64, height as f64),
        ];
        // Non-empty corner list, so from_points always yields Some.
        BoundingBox::from_points(corners).unwrap_or(BoundingBox::new(
            self.origin_x,
            self.origin_y,
            self.origin_x,
            self.origin_y,
        ))
    }

    /// Absolute pixel size along x and y.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.pixel_width.hypot(self.col_rotation),
            self.row_rotation.hypot(self.pixel_height),
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landsat_30m() -> GeoTransform {
        GeoTransform::north_up(-2_341_500.0, 3_833_500.0, 30.0, 30.0)
    }

    #[test]
    fn test_pixel_world_roundtrip() {
        let gt = landsat_30m();
        let (x, y) = gt.pixel_to_world(100.0, 200.0);
        assert_eq!(x, -2_341_500.0 + 3000.0);
        assert_eq!(y, 3_833_500.0 - 6000.0);

        let (col, row) = gt.world_to_pixel(x, y).unwrap();
        assert!((col - 100.0).abs() < 1e-9);
        assert!((row - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_singular_transform_rejected() {
        let gt = GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, -30.0]);
        assert!(matches!(
            gt.world_to_pixel(1.0, 1.0),
            Err(RasterError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_shifted_origin() {
        let gt = landsat_30m().shifted(10, 5);
        assert_eq!(gt.origin_x, -2_341_500.0 + 300.0);
        assert_eq!(gt.origin_y, 3_833_500.0 - 150.0);
        assert_eq!(gt.pixel_width, 30.0);
        assert_eq!(gt.pixel_height, -30.0);
    }

    #[test]
    fn test_extent_north_up() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0, 10.0);
        assert_eq!(gt.extent(5, 4), BoundingBox::new(0.0, 60.0, 50.0, 100.0));
    }

    #[test]
    fn test_gdal_roundtrip() {
        let arr = [1.0, 30.0, 0.0, 2.0, 0.0, -30.0];
        assert_eq!(GeoTransform::from_gdal(arr).to_gdal(), arr);
    }
}
