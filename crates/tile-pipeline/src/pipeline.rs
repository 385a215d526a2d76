//! Tile pipeline orchestrator.
//!
//! For every AOI tile and every configured product:
//!
//! ```text
//! skip? → resolve window → read → normalize | mask → write raw → write transformed
//! ```
//!
//! followed by the optional structure composite. Failures are confined to
//! the (tile, product) unit that raised them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Axis};
use raster_common::{PixelBox, RasterArray, RasterError, SampleType, Window};
use raster_io::{GeoTiffDataset, GeoTiffWriter, RasterProfile, RasterSource, Tile, TileSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::composite::{self, select_top_species, TOP_SPECIES_KEY};
use crate::config::{MergeSource, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::mask::build_mask;
use crate::naming::OutputLayout;
use crate::normalize::{self, nodata_mask, normalize_percentage, NormalizationPolicy};
use crate::products::{ProductCatalog, ProductLocation, RasterProduct};
use crate::window;

/// Product name recorded for composite failures.
pub const MERGED_UNIT: &str = "merged";

/// A failed (tile, product) unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub tile_id: i64,
    pub product: String,
    /// Stable error kind, e.g. `DegenerateRangeError`.
    pub kind: String,
    pub message: String,
}

impl UnitFailure {
    fn new(tile_id: i64, product: &str, err: &PipelineError) -> Self {
        Self {
            tile_id,
            product: product.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one tile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileReport {
    pub tile_id: i64,
    pub skipped: bool,
    pub artifacts: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
}

impl TileReport {
    fn skipped(tile_id: i64) -> Self {
        Self {
            tile_id,
            skipped: true,
            ..Default::default()
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tiles_processed: usize,
    pub tiles_skipped: usize,
    pub artifacts: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives window resolution, normalization and compositing over a tile grid.
///
/// `process_tile` only takes `&self` and only writes under `tile_<id>/`,
/// so tiles are independent units of work.
#[derive(Debug)]
pub struct TilePipeline {
    config: PipelineConfig,
    catalog: ProductCatalog,
    layout: OutputLayout,
}

impl TilePipeline {
    /// Validate the configuration and discover every product.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(PipelineError::invalid_config)?;
        let catalog = ProductCatalog::discover(&config)?;
        Ok(Self::with_catalog(config, catalog))
    }

    /// Build a pipeline over an already discovered catalogue.
    pub fn with_catalog(config: PipelineConfig, catalog: ProductCatalog) -> Self {
        let layout = OutputLayout::new(config.out_dir.clone(), config.bbox.as_ref());
        Self {
            config,
            catalog,
            layout,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Process every tile of `tiles` in order.
    pub fn run<S: TileSource>(&self, tiles: &S) -> Result<RunReport> {
        let started_at = Utc::now();
        let tiles = tiles.load_tiles()?;

        info!(
            tiles = tiles.len(),
            products = self.catalog.len(),
            out_dir = %self.layout.root().display(),
            "Starting tile run"
        );

        let mut report = RunReport {
            started_at,
            finished_at: started_at,
            tiles_processed: 0,
            tiles_skipped: 0,
            artifacts: Vec::new(),
            failures: Vec::new(),
        };

        for tile in &tiles {
            let tile_report = self.process_tile(tile);
            if tile_report.skipped {
                report.tiles_skipped += 1;
            } else {
                report.tiles_processed += 1;
            }
            report.artifacts.extend(tile_report.artifacts);
            report.failures.extend(tile_report.failures);
        }

        report.finished_at = Utc::now();

        info!(
            processed = report.tiles_processed,
            skipped = report.tiles_skipped,
            artifacts = report.artifacts.len(),
            failures = report.failures.len(),
            "Tile run complete"
        );

        Ok(report)
    }

    /// Process every product of one tile, then its composite.
    #[instrument(skip(self, tile), fields(tile_id = tile.id))]
    pub fn process_tile(&self, tile: &Tile) -> TileReport {
        if self.config.is_excluded(tile.id) {
            debug!("Skipping excluded tile");
            return TileReport::skipped(tile.id);
        }

        let mut report = TileReport {
            tile_id: tile.id,
            ..Default::default()
        };

        for product in self.catalog.iter() {
            match self.process_product(tile, product) {
                Ok(paths) => report.artifacts.extend(paths),
                Err(e) => {
                    error!(
                        product = %product.name(),
                        kind = e.kind(),
                        error = %e,
                        "Product failed"
                    );
                    report
                        .failures
                        .push(UnitFailure::new(tile.id, product.name(), &e));
                }
            }
        }

        if self.config.merge.enabled {
            match self.merge_structures(tile.id, &report.artifacts) {
                Ok(path) => report.artifacts.push(path),
                Err(e) => {
                    error!(kind = e.kind(), error = %e, "Composite failed");
                    report
                        .failures
                        .push(UnitFailure::new(tile.id, MERGED_UNIT, &e));
                }
            }
        }

        info!(
            artifacts = report.artifacts.len(),
            failures = report.failures.len(),
            "Tile done"
        );
        report
    }

    fn process_product(&self, tile: &Tile, product: &RasterProduct) -> Result<Vec<PathBuf>> {
        match &product.location {
            ProductLocation::Layers(paths) => {
                let k = match product.policy() {
                    NormalizationPolicy::SpeciesTopK { k } => *k,
                    other => {
                        return Err(RasterError::invalid_data(format!(
                            "{} layers cannot use the {} policy",
                            product.name(),
                            other.name()
                        ))
                        .into())
                    }
                };
                let path = self.process_species(tile, product, paths, k)?;
                Ok(vec![path])
            }
            ProductLocation::Mosaic(path) => self.process_mosaic(tile, product, path),
        }
    }

    fn process_mosaic(
        &self,
        tile: &Tile,
        product: &RasterProduct,
        path: &Path,
    ) -> Result<Vec<PathBuf>> {
        let raw = read_tile(path, tile, self.config.bbox.as_ref(), product.nodata)?;

        let transformed = match product.policy() {
            NormalizationPolicy::CategoricalMask => {
                let codes = self.config.mask.code_set();
                let mask = build_mask(raw.band(0)?, &codes, self.config.mask.polarity, raw.nodata);
                RasterArray::from_u8(mask.insert_axis(Axis(0)), raw.transform, raw.crs, None)
            }
            policy if policy.uses_template() => {
                let template = match &product.config.template {
                    Some(name) => Some(self.read_template(tile, name, &raw)?),
                    None => None,
                };
                normalize::normalize(&raw, policy, template.as_ref().map(|m| m.view()))?
            }
            policy => normalize::normalize(&raw, policy, None)?,
        };

        // Nothing is written for a product whose transform fails.
        let raw_path = self.layout.raw_path(tile.id, &product.config);
        GeoTiffWriter::new(&raw).write(&raw_path)?;
        debug!(product = %product.name(), path = %raw_path.display(), "Wrote raw artifact");

        let norm_path = self.layout.normalized_path(tile.id, &product.config);
        GeoTiffWriter::new(&transformed).write(&norm_path)?;

        info!(
            product = %product.name(),
            policy = product.policy().name(),
            path = %norm_path.display(),
            "Wrote transformed artifact"
        );

        Ok(vec![raw_path, norm_path])
    }

    /// Nodata mask of the template product over the same tile.
    fn read_template(
        &self,
        tile: &Tile,
        name: &str,
        raw: &RasterArray,
    ) -> Result<Array2<bool>> {
        let template = self.catalog.get(name)?;
        let path = match &template.location {
            ProductLocation::Mosaic(path) => path,
            ProductLocation::Layers(_) => {
                return Err(PipelineError::invalid_config(format!(
                    "template '{}' must be a single mosaic",
                    name
                )))
            }
        };

        let array = read_tile(path, tile, self.config.bbox.as_ref(), template.nodata)?;
        if (array.height(), array.width()) != (raw.height(), raw.width()) {
            return Err(RasterError::ShapeMismatch {
                expected: (raw.height(), raw.width()),
                found: (array.height(), array.width()),
                source_name: path.display().to_string(),
            }
            .into());
        }
        Ok(nodata_mask(&array))
    }

    fn process_species(
        &self,
        tile: &Tile,
        product: &RasterProduct,
        paths: &[PathBuf],
        k: usize,
    ) -> Result<PathBuf> {
        let names = product.layer_names();
        let mut stack: Option<Array3<f64>> = None;
        let mut georef = None;

        for (i, path) in paths.iter().enumerate() {
            let layer = read_tile(path, tile, self.config.bbox.as_ref(), product.nodata)?;
            let bytes = normalize_percentage(layer.data.view(), layer.nodata)?;
            let band = bytes.index_axis(Axis(0), 0).mapv(f64::from);

            let stack = stack.get_or_insert_with(|| {
                georef = Some((layer.transform, layer.crs));
                Array3::zeros((paths.len(), band.nrows(), band.ncols()))
            });
            if band.dim() != (stack.dim().1, stack.dim().2) {
                return Err(RasterError::ShapeMismatch {
                    expected: (stack.dim().1, stack.dim().2),
                    found: band.dim(),
                    source_name: path.display().to_string(),
                }
                .into());
            }
            stack.index_axis_mut(Axis(0), i).assign(&band);
        }

        let (stack, (transform, crs)) = match (stack, georef) {
            (Some(stack), Some(georef)) => (stack, georef),
            _ => {
                return Err(RasterError::missing_input(format!(
                    "no species layers for {}",
                    product.name()
                ))
                .into())
            }
        };

        let selection = select_top_species(stack.view(), &names, k)?;
        let metadata = selection.metadata_value();
        let array = RasterArray::new(
            selection.bands,
            SampleType::U8,
            transform,
            crs,
            Some(f64::from(normalize::NODATA_BYTE)),
        );

        let out = self.layout.species_path(tile.id);
        GeoTiffWriter::new(&array)
            .item(TOP_SPECIES_KEY, metadata.as_str())
            .write(&out)?;

        info!(
            product = %product.name(),
            layers = paths.len(),
            top_species = %metadata,
            path = %out.display(),
            "Wrote species composite"
        );

        Ok(out)
    }

    /// Stack this run's structure artifacts into the merged composite.
    ///
    /// Only artifacts written for this tile during this run qualify; a
    /// stale file from an earlier run is treated as missing.
    fn merge_structures(&self, tile_id: i64, written: &[PathBuf]) -> Result<PathBuf> {
        let products = self.config.merge_products();
        let mut inputs = Vec::with_capacity(products.len());

        for product in &products {
            let path = match self.config.merge.source {
                MergeSource::Raw => self.layout.raw_path(tile_id, product),
                MergeSource::Normalized => self.layout.normalized_path(tile_id, product),
            };
            if !written.contains(&path) {
                return Err(RasterError::missing_input(format!(
                    "{} was not produced for tile {}",
                    product.name, tile_id
                ))
                .into());
            }
            inputs.push(path);
        }

        let dest = self.layout.composite_path(tile_id, &products);
        let artifact = composite::stack(&inputs, &dest, self.config.interleave.as_ref())?;
        Ok(artifact.path)
    }
}

/// Read the pixels of `path` covering `tile`, refined by `bbox` if given.
///
/// A file without a nodata tag takes the nodata its product declared at
/// discovery, so species layers after the first follow the first layer.
fn read_tile(
    path: &Path,
    tile: &Tile,
    bbox: Option<&PixelBox>,
    declared_nodata: Option<f64>,
) -> Result<RasterArray> {
    let mut dataset = GeoTiffDataset::open(path)?;
    let window = tile_window(dataset.profile(), tile, bbox)?;
    debug!(path = %path.display(), window = %window, "Reading window");
    let mut array = dataset.read_window(&window)?;
    if array.nodata.is_none() {
        array.nodata = declared_nodata;
    }
    Ok(array)
}

/// Tile window, refined by `bbox`. Refined windows are bounds-checked by the read.
fn tile_window(profile: &RasterProfile, tile: &Tile, bbox: Option<&PixelBox>) -> Result<Window> {
    let base = window::resolve(&profile.transform, profile.width, profile.height, &tile.bounds)?;
    match bbox {
        Some(sub) => Ok(window::refine(&base, sub)?),
        None => Ok(base),
    }
}
