//! Deterministic artifact paths under the output root.
//!
//! ```text
//! <out>/tile_<id>/[structure/]<name>/<name>-tile-<id>[-c-r-w-h].tif
//! <out>/tile_<id>/[structure/]<name>/<name>-tile-<id>-norm[-c-r-w-h].tif
//! <out>/tile_<id>/species/species-tile-<id>-norm[-c-r-w-h].tif
//! <out>/tile_<id>/structure/merged/<code1>-...-tile-<id>[-c-r-w-h].tif
//! ```

use std::path::{Path, PathBuf};

use raster_common::PixelBox;

use crate::config::ProductConfig;

pub const STRUCTURE_DIR: &str = "structure";
pub const MERGED_DIR: &str = "merged";
pub const SPECIES_DIR: &str = "species";
pub const ARTIFACT_EXT: &str = "tif";

/// Path builder for one output root and optional bbox override.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    suffix: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, bbox: Option<&PixelBox>) -> Self {
        Self {
            root: root.into(),
            suffix: bbox.map(PixelBox::suffix).unwrap_or_default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `-c-r-w-h` when a bbox override is active, else empty.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn tile_dir(&self, tile_id: i64) -> PathBuf {
        self.root.join(format!("tile_{}", tile_id))
    }

    pub fn product_dir(&self, tile_id: i64, product: &ProductConfig) -> PathBuf {
        let tile_dir = self.tile_dir(tile_id);
        if product.is_structure() {
            tile_dir.join(STRUCTURE_DIR).join(&product.name)
        } else {
            tile_dir.join(&product.name)
        }
    }

    pub fn raw_path(&self, tile_id: i64, product: &ProductConfig) -> PathBuf {
        self.product_dir(tile_id, product).join(format!(
            "{}-tile-{}{}.{}",
            product.name, tile_id, self.suffix, ARTIFACT_EXT
        ))
    }

    pub fn normalized_path(&self, tile_id: i64, product: &ProductConfig) -> PathBuf {
        self.product_dir(tile_id, product).join(format!(
            "{}-tile-{}-norm{}.{}",
            product.name, tile_id, self.suffix, ARTIFACT_EXT
        ))
    }

    pub fn species_path(&self, tile_id: i64) -> PathBuf {
        self.tile_dir(tile_id).join(SPECIES_DIR).join(format!(
            "species-tile-{}-norm{}.{}",
            tile_id, self.suffix, ARTIFACT_EXT
        ))
    }

    pub fn composite_path(&self, tile_id: i64, products: &[&ProductConfig]) -> PathBuf {
        let codes: Vec<String> = products.iter().map(|p| p.short_code()).collect();
        self.tile_dir(tile_id)
            .join(STRUCTURE_DIR)
            .join(MERGED_DIR)
            .join(format!(
                "{}-tile-{}{}.{}",
                codes.join("-"),
                tile_id,
                self.suffix,
                ARTIFACT_EXT
            ))
    }
}

/// Directory holding the blocks cropped from `artifact`.
pub fn crop_dir(artifact: &Path, block_width: usize, block_height: usize) -> PathBuf {
    let parent = artifact.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("cropped-{}-{}", block_width, block_height))
}

/// Path of the `n`th block (1-based) cropped from `artifact`.
pub fn crop_block_path(artifact: &Path, block_width: usize, block_height: usize, n: usize) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    crop_dir(artifact, block_width, block_height).join(format!("{}-win-{}.{}", stem, n, ARTIFACT_EXT))
}
