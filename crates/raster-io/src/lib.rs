//! Raster and vector I/O for the forest raster tiler.
//!
//! Everything that touches the filesystem lives here so the numeric core
//! in `tile-pipeline` can stay pure:
//!
//! - [`geotiff`]: windowed GeoTIFF reads (only the strips/tiles a window
//!   touches are decoded) and pixel-interleaved GeoTIFF writes
//! - [`source`]: the [`RasterSource`] seam over an opened raster
//! - [`catalog`]: locating product files inside the mosaic catalogue
//! - [`tiles`]: the AOI tile grid ([`TileSource`])
//! - [`interleave`]: optional external pixel-interleave conversion
//!
//! # Example
//!
//! ```ignore
//! use raster_io::{GeoTiffDataset, RasterSource};
//!
//! let mut src = GeoTiffDataset::open("mosaiced/structure/elev_p95/elev_p95_2019.dat")?;
//! let window = raster_common::Window::new(1000, 2000, 5000, 5000)?;
//! let array = src.read_window(&window)?;
//! ```

pub mod catalog;
pub mod error;
pub mod geotiff;
pub mod interleave;
pub mod profile;
pub mod source;
pub mod tiles;

pub use catalog::{find_file, find_files};
pub use error::{RasterIoError, Result};
pub use geotiff::{read_geotiff, write_geotiff, GeoTiffDataset, GeoTiffWriter};
pub use interleave::{finalize_artifact, tmp_path, FinalizeOutcome, InterleaveConverter};
pub use profile::RasterProfile;
pub use source::RasterSource;
pub use tiles::{GeoJsonTileGrid, Tile, TileSource};
