//! Coordinate reference system identifiers carried through the pipeline.
//!
//! The tiler never reprojects; it only needs to copy the source CRS onto
//! every artifact it writes. An EPSG code plus the model type (geographic
//! or projected) is what the GeoTIFF key directory stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG-coded CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u16,
    pub geographic: bool,
}

impl Crs {
    /// Canada Atlas Lambert, the CRS of the national forest mosaics.
    pub const CANADA_ATLAS_LAMBERT: Crs = Crs {
        epsg: 3978,
        geographic: false,
    };

    /// WGS84 geographic.
    pub const WGS84: Crs = Crs {
        epsg: 4326,
        geographic: true,
    };

    /// Build from an EPSG code, inferring the model type for the common
    /// geographic codes.
    pub fn from_epsg(epsg: u16) -> Self {
        Self {
            epsg,
            geographic: matches!(epsg, 4326 | 4269 | 4267 | 4617),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}
