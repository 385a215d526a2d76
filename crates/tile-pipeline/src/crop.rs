//! Sub-tile block cropping of an existing artifact.

use std::path::{Path, PathBuf};

use raster_common::RasterArray;
use raster_io::{GeoTiffDataset, GeoTiffWriter, RasterSource};
use tracing::{debug, info};

use crate::error::Result;
use crate::naming::crop_block_path;
use crate::normalize::{normalize_linear, NODATA_BYTE};
use crate::window::split_into_blocks;

/// Split `artifact` into equal `block_width × block_height` blocks, each
/// linearly normalized to bytes on its own.
///
/// Blocks are numbered from 1 in column-major order and written to
/// `cropped-<w>-<h>/<stem>-win-<n>.tif` next to the artifact.
pub fn crop_into_blocks(
    artifact: &Path,
    block_width: usize,
    block_height: usize,
) -> Result<Vec<PathBuf>> {
    let mut dataset = GeoTiffDataset::open(artifact)?;
    let profile = dataset.profile().clone();
    let nodata = profile.resolved_nodata()?;
    let windows = split_into_blocks(profile.width, profile.height, block_width, block_height)?;

    let mut written = Vec::with_capacity(windows.len());
    for (i, window) in windows.iter().enumerate() {
        let block = dataset.read_window(window)?;
        let bytes = normalize_linear(block.data.view(), nodata)?;
        let out = RasterArray::from_u8(bytes, block.transform, block.crs, Some(f64::from(NODATA_BYTE)));

        let path = crop_block_path(artifact, block_width, block_height, i + 1);
        GeoTiffWriter::new(&out).write(&path)?;
        debug!(window = %window, path = %path.display(), "Wrote block");
        written.push(path);
    }

    info!(
        artifact = %artifact.display(),
        blocks = written.len(),
        "Cropped artifact into blocks"
    );

    Ok(written)
}
