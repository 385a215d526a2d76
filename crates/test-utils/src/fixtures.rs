//! Common test fixtures for forest-tiler tests.
//!
//! This module provides pre-defined georeferencing, tile and product data
//! that mirror the national mosaics the tiler runs against.

/// Common affine transforms.
pub mod transforms {
    use raster_common::GeoTransform;

    /// 30 m north-up grid in Canada Atlas Lambert, origin at (1_000_000, 1_500_000).
    pub const LAMBERT_30M: GeoTransform = GeoTransform {
        origin_x: 1_000_000.0,
        pixel_width: 30.0,
        row_rotation: 0.0,
        origin_y: 1_500_000.0,
        col_rotation: 0.0,
        pixel_height: -30.0,
    };

    /// Unit grid with the origin at (0, 0), rows increasing southward.
    pub const UNIT: GeoTransform = GeoTransform {
        origin_x: 0.0,
        pixel_width: 1.0,
        row_rotation: 0.0,
        origin_y: 0.0,
        col_rotation: 0.0,
        pixel_height: -1.0,
    };

    /// A rotated grid (windows cannot be resolved against it).
    pub const ROTATED: GeoTransform = GeoTransform {
        origin_x: 0.0,
        pixel_width: 30.0,
        row_rotation: 5.0,
        origin_y: 0.0,
        col_rotation: 5.0,
        pixel_height: -30.0,
    };
}

/// Tile ids and AOI grid helpers.
pub mod tiles {
    use raster_common::BoundingBox;

    /// Tiles of the BC (Quesnel) study area.
    pub const BC_TILES: [i64; 4] = [435, 436, 396, 397];

    /// Renders `(id, bounds)` pairs as a GeoJSON `FeatureCollection` of
    /// rectangular polygons with an `Id` property.
    pub fn geojson_grid(tiles: &[(i64, BoundingBox)]) -> String {
        let features: Vec<String> = tiles
            .iter()
            .map(|(id, b)| {
                format!(
                    r#"{{"type":"Feature","properties":{{"Id":{}}},"geometry":{{"type":"Polygon","coordinates":[[[{},{}],[{},{}],[{},{}],[{},{}],[{},{}]]]}}}}"#,
                    id,
                    b.min_x, b.min_y,
                    b.max_x, b.min_y,
                    b.max_x, b.max_y,
                    b.min_x, b.max_y,
                    b.min_x, b.min_y,
                )
            })
            .collect();
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }
}

/// Product names as they appear in the catalogue.
pub mod products {
    pub const ELEV_P95: &str = "elev_p95";
    pub const ELEV_CV: &str = "elev_cv";
    pub const LOREYS_HEIGHT: &str = "loreys_height";
    pub const GROSS_STEM_VOLUME: &str = "gross_stem_volume";
    pub const TOTAL_BIOMASS: &str = "total_biomass";
    pub const AGE: &str = "age";
    pub const LANDCOVER: &str = "landcover";
    pub const SPECIES: &str = "species";

    /// Species codes used for probability stack file names
    /// (`CA_forest_<code>.tif`).
    pub const SPECIES_CODES: [&str; 8] = [
        "ABIE_BAL", "ABIE_LAS", "BETU_PAP", "LARI_LAR", "PICE_GLA", "PICE_MAR", "PINU_BAN",
        "POPU_TRE",
    ];
}

/// Common nodata values.
pub mod nodata {
    /// Sentinel used by the continuous structure mosaics.
    pub const STRUCTURE: f64 = -9999.0;

    /// Reserved value of every 8-bit normalized product.
    pub const NORMALIZED: f64 = 0.0;
}
