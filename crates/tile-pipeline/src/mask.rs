//! Land cover classification → binary forest mask.

use std::collections::HashSet;

use ndarray::{Array2, ArrayView2};
use raster_common::is_nodata_value;
use serde::{Deserialize, Serialize};

/// Forest classes of the land cover product: wetland-treed, coniferous,
/// broadleaf and mixed-wood.
pub const DEFAULT_FOREST_CODES: [i64; 4] = [81, 210, 220, 230];

/// Which value marks forest pixels in the mask. Nodata pixels of the land
/// cover band are 0 under either polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolarity {
    /// Forest → 1, everything else → 0.
    #[default]
    ForestIsOne,
    /// Forest → 0, everything else → 1.
    ForestIsZero,
}

impl MaskPolarity {
    #[inline]
    fn value(self, is_forest: bool) -> u8 {
        match self {
            MaskPolarity::ForestIsOne => is_forest as u8,
            MaskPolarity::ForestIsZero => !is_forest as u8,
        }
    }
}

/// Class code membership for one pixel; non-integral values and NaN are
/// never members.
#[inline]
fn is_member(value: f64, codes: &HashSet<i64>) -> bool {
    value.is_finite() && value.fract() == 0.0 && codes.contains(&(value as i64))
}

/// Binary mask of a classification band.
///
/// Pixels equal to `nodata`, and NaN pixels, become 0 whatever the polarity.
/// The mask is written without a nodata tag, so with `ForestIsZero` they
/// would otherwise read as non-forest.
pub fn build_mask(
    band: ArrayView2<'_, f64>,
    forest_codes: &HashSet<i64>,
    polarity: MaskPolarity,
    nodata: Option<f64>,
) -> Array2<u8> {
    band.mapv(|v| {
        if is_nodata_value(v, nodata) {
            0
        } else {
            polarity.value(is_member(v, forest_codes))
        }
    })
}
