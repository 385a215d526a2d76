//! AOI tile grid.
//!
//! Tiles come from a vector layer whose features carry an integer `Id`
//! property and polygon geometry. Only the bounds of each geometry are kept.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use raster_common::BoundingBox;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{RasterIoError, Result};

/// One AOI tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: i64,
    pub bounds: BoundingBox,
}

impl Tile {
    pub fn new(id: i64, bounds: BoundingBox) -> Self {
        Self { id, bounds }
    }
}

/// Anything that can enumerate the tiles of an AOI.
pub trait TileSource {
    fn load_tiles(&self) -> Result<Vec<Tile>>;
}

impl TileSource for Vec<Tile> {
    fn load_tiles(&self) -> Result<Vec<Tile>> {
        Ok(self.clone())
    }
}

/// A GeoJSON `FeatureCollection` on disk.
#[derive(Debug, Clone)]
pub struct GeoJsonTileGrid {
    path: PathBuf,
}

impl GeoJsonTileGrid {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse tiles from GeoJSON text.
    pub fn parse(text: &str) -> Result<Vec<Tile>> {
        let doc: Value = serde_json::from_str(text)?;
        if doc.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            return Err(RasterIoError::tile_grid("expected a FeatureCollection"));
        }
        let features = doc
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| RasterIoError::tile_grid("FeatureCollection has no features array"))?;

        let mut seen = HashSet::new();
        let mut tiles = Vec::with_capacity(features.len());

        for (index, feature) in features.iter().enumerate() {
            let id = feature_id(feature)
                .ok_or_else(|| RasterIoError::tile_grid(format!("feature {} has no integer Id", index)))?;
            if !seen.insert(id) {
                return Err(RasterIoError::tile_grid(format!("duplicate tile Id {}", id)));
            }

            let geometry = feature
                .get("geometry")
                .ok_or_else(|| RasterIoError::tile_grid(format!("tile {} has no geometry", id)))?;
            match geometry.get("type").and_then(Value::as_str) {
                Some("Polygon") | Some("MultiPolygon") => {}
                other => {
                    return Err(RasterIoError::tile_grid(format!(
                        "tile {} has unsupported geometry type {:?}",
                        id, other
                    )))
                }
            }

            let mut points = Vec::new();
            if let Some(coords) = geometry.get("coordinates") {
                collect_positions(coords, &mut points);
            }
            let bounds = BoundingBox::from_points(points)
                .ok_or_else(|| RasterIoError::tile_grid(format!("tile {} has empty geometry", id)))?;

            tiles.push(Tile::new(id, bounds));
        }

        Ok(tiles)
    }
}

impl TileSource for GeoJsonTileGrid {
    fn load_tiles(&self) -> Result<Vec<Tile>> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| RasterIoError::open(&self.path, e))?;
        let tiles = Self::parse(&text)?;
        debug!(path = %self.path.display(), count = tiles.len(), "Loaded tile grid");
        Ok(tiles)
    }
}

fn feature_id(feature: &Value) -> Option<i64> {
    let id = feature.get("properties")?.get("Id")?;
    if let Some(v) = id.as_i64() {
        return Some(v);
    }
    // Shapefile exports often carry integral ids as floats.
    id.as_f64()
        .filter(|v| v.fract() == 0.0 && v.is_finite())
        .map(|v| v as i64)
}

/// Gather every `[x, y, ...]` position nested anywhere in a coordinates array.
fn collect_positions(value: &Value, out: &mut Vec<(f64, f64)>) {
    let Some(items) = value.as_array() else { return };
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => out.push((x, y)),
        _ => {
            for item in items {
                collect_positions(item, out);
            }
        }
    }
}
