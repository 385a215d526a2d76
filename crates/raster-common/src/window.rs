//! Integral pixel rectangles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::bbox::{parse_four, BboxParseError};
use crate::error::{RasterError, RasterResult};
use crate::transform::GeoTransform;

/// A validated pixel window: non-negative offsets and a positive size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    /// Create a window, rejecting zero width or height.
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> RasterResult<Self> {
        if width == 0 || height == 0 {
            return Err(RasterError::invalid_window(format!(
                "window {}x{} at ({}, {}) has an empty dimension",
                width, height, col_off, row_off
            )));
        }
        Ok(Self {
            col_off,
            row_off,
            width,
            height,
        })
    }

    /// Window covering a whole `width × height` raster.
    pub fn full(width: usize, height: usize) -> RasterResult<Self> {
        Self::new(0, 0, width, height)
    }

    /// Column indices covered by the window.
    pub fn col_range(&self) -> Range<usize> {
        self.col_off..self.col_off + self.width
    }

    /// Row indices covered by the window.
    pub fn row_range(&self) -> Range<usize> {
        self.row_off..self.row_off + self.height
    }

    /// `(rows, cols)` of the data this window reads.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Fail unless the window lies inside a `width × height` raster.
    pub fn ensure_within(&self, width: usize, height: usize) -> RasterResult<()> {
        if self.col_off + self.width > width || self.row_off + self.height > height {
            return Err(RasterError::invalid_window(format!(
                "{} exceeds raster extent {}x{}",
                self, width, height
            )));
        }
        Ok(())
    }

    /// Georeferencing of the array read through this window.
    pub fn transform(&self, source: &GeoTransform) -> GeoTransform {
        source.shifted(self.col_off, self.row_off)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Window(col_off={}, row_off={}, width={}, height={})",
            self.col_off, self.row_off, self.width, self.height
        )
    }
}

/// A user-supplied sub-box `(col_off, row_off, width, height)` relative to
/// a tile window.
///
/// Fields are signed and unvalidated: a negative offset is legitimate as
/// long as the refined window stays non-negative, while a non-positive
/// width or height is rejected when the box is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct PixelBox {
    pub col_off: i64,
    pub row_off: i64,
    pub width: i64,
    pub height: i64,
}

impl PixelBox {
    pub fn new(col_off: i64, row_off: i64, width: i64, height: i64) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Filename suffix encoding the four components, e.g. `-0-0-500-500`.
    pub fn suffix(&self) -> String {
        format!(
            "-{}-{}-{}-{}",
            self.col_off, self.row_off, self.width, self.height
        )
    }
}

impl From<[i64; 4]> for PixelBox {
    fn from(v: [i64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<PixelBox> for [i64; 4] {
    fn from(b: PixelBox) -> Self {
        [b.col_off, b.row_off, b.width, b.height]
    }
}

impl FromStr for PixelBox {
    type Err = BboxParseError;

    /// Accepts "0,0,500,500" and "(0, 0, 500, 500)".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_four::<i64>(s).map(PixelBox::from)
    }
}

impl fmt::Display for PixelBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.col_off, self.row_off, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rejects_empty() {
        assert!(Window::new(0, 0, 0, 10).is_err());
        assert!(Window::new(0, 0, 10, 0).is_err());
        assert!(Window::new(3, 4, 1, 1).is_ok());
    }

    #[test]
    fn test_ensure_within() {
        let w = Window::new(90, 0, 10, 10).unwrap();
        assert!(w.ensure_within(100, 10).is_ok());
        assert!(matches!(
            w.ensure_within(99, 10),
            Err(RasterError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_ranges_and_shape() {
        let w = Window::new(2, 3, 4, 5).unwrap();
        assert_eq!(w.col_range(), 2..6);
        assert_eq!(w.row_range(), 3..8);
        assert_eq!(w.shape(), (5, 4));
    }

    #[test]
    fn test_pixel_box_parse_and_suffix() {
        let b: PixelBox = "(0, 0, 500, 500)".parse().unwrap();
        assert_eq!(b, PixelBox::new(0, 0, 500, 500));
        assert_eq!(b.suffix(), "-0-0-500-500");

        let neg: PixelBox = "-10,5,20,20".parse().unwrap();
        assert_eq!(neg.col_off, -10);
        assert_eq!(neg.suffix(), "--10-5-20-20");

        assert!("1,2,3".parse::<PixelBox>().is_err());
        assert!("1,2,3,4.5".parse::<PixelBox>().is_err());
    }

    #[test]
    fn test_pixel_box_serde_as_array() {
        let b = PixelBox::new(1, 2, 3, 4);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1,2,3,4]");
        let back: PixelBox = serde_json::from_str("[0,0,500,500]").unwrap();
        assert_eq!(back, PixelBox::new(0, 0, 500, 500));
    }
}
