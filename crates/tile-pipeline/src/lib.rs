//! Per-tile extraction, normalization and compositing of forest inventory
//! rasters.
//!
//! The numeric core is pure:
//!
//! - [`window`]: tile bounds → pixel windows, bbox refinement, block splits
//! - [`normalize`]: value policies mapping products onto `[1, 255]` bytes
//! - [`mask`]: land cover codes → binary forest mask
//! - [`composite`]: band stacking and top-K species selection
//!
//! [`TilePipeline`] drives it over every (tile, product) pair and writes
//! the artifacts laid out by [`OutputLayout`].
//!
//! # Example
//!
//! ```ignore
//! use raster_io::GeoJsonTileGrid;
//! use tile_pipeline::{PipelineConfig, TilePipeline};
//!
//! let config = PipelineConfig::from_env();
//! let pipeline = TilePipeline::new(config.clone())?;
//! let report = pipeline.run(&GeoJsonTileGrid::new(&config.aoi_path))?;
//! ```

pub mod composite;
pub mod config;
pub mod crop;
pub mod error;
pub mod mask;
pub mod naming;
pub mod normalize;
pub mod pipeline;
pub mod products;
pub mod window;

pub use composite::{select_top_species, stack, stack_arrays, CompositeArtifact, SpeciesSelection};
pub use config::{
    CatalogConfig, MaskConfig, MergeConfig, MergeSource, PipelineConfig, ProductConfig,
};
pub use crop::crop_into_blocks;
pub use error::{PipelineError, Result};
pub use mask::{build_mask, MaskPolarity};
pub use naming::OutputLayout;
pub use normalize::{normalize, NormalizationPolicy};
pub use pipeline::{RunReport, TilePipeline, TileReport, UnitFailure};
pub use products::{ProductCatalog, ProductLocation, RasterProduct};
