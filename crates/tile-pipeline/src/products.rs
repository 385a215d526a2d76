//! Product catalogue discovery.
//!
//! Products are located once at pipeline start. Every configured product
//! must resolve to at least one file; a missing product is fatal before
//! any tile is touched.

use std::path::{Path, PathBuf};

use raster_common::RasterError;
use raster_io::{find_file, find_files, GeoTiffDataset, RasterSource};
use tracing::{debug, info};

use crate::config::{PipelineConfig, ProductConfig};
use crate::error::{PipelineError, Result};
use crate::naming::STRUCTURE_DIR;
use crate::normalize::NormalizationPolicy;

/// Where a product's pixels live.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductLocation {
    /// One mosaic covering the whole study area.
    Mosaic(PathBuf),
    /// One single-band layer per species, sorted by file name.
    Layers(Vec<PathBuf>),
}

impl ProductLocation {
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            ProductLocation::Mosaic(path) => vec![path.as_path()],
            ProductLocation::Layers(paths) => paths.iter().map(PathBuf::as_path).collect(),
        }
    }
}

/// A configured product resolved against the catalogue.
#[derive(Debug, Clone)]
pub struct RasterProduct {
    pub config: ProductConfig,
    pub location: ProductLocation,
    /// Nodata declared in the header of the (first) source file.
    pub nodata: Option<f64>,
}

impl RasterProduct {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn policy(&self) -> &NormalizationPolicy {
        &self.config.policy
    }

    /// Species names, one per layer, taken from the file stems.
    pub fn layer_names(&self) -> Vec<String> {
        self.location
            .paths()
            .iter()
            .map(|p| {
                p.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// All products of a run, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<RasterProduct>,
}

impl ProductCatalog {
    /// Resolve every configured product under `config.catalog_dir`.
    pub fn discover(config: &PipelineConfig) -> Result<Self> {
        let mut products = Vec::with_capacity(config.products.len());

        for product in &config.products {
            let dir = product_dir(&config.catalog_dir, product);
            if !dir.is_dir() {
                return Err(RasterError::missing_input(format!(
                    "catalogue directory {} for {}",
                    dir.display(),
                    product.name
                ))
                .into());
            }

            let location = if matches!(product.policy, NormalizationPolicy::SpeciesTopK { .. }) {
                let layers = find_files(
                    &dir,
                    &config.catalog.species_prefix,
                    &config.catalog.species_extension,
                )?;
                if layers.is_empty() {
                    return Err(RasterError::missing_input(format!(
                        "no {}*{} layers in {}",
                        config.catalog.species_prefix,
                        config.catalog.species_extension,
                        dir.display()
                    ))
                    .into());
                }
                ProductLocation::Layers(layers)
            } else {
                let path = find_file(&dir, &config.catalog.extension)?.ok_or_else(|| {
                    RasterError::missing_input(format!(
                        "no {} file in {}",
                        config.catalog.extension,
                        dir.display()
                    ))
                })?;
                ProductLocation::Mosaic(path)
            };

            let first = location.paths()[0].to_path_buf();
            let nodata = GeoTiffDataset::open(&first)?.profile().resolved_nodata()?;

            debug!(
                product = %product.name,
                path = %first.display(),
                nodata = ?nodata,
                "Discovered product"
            );

            products.push(RasterProduct {
                config: product.clone(),
                location,
                nodata,
            });
        }

        info!(
            catalog = %config.catalog_dir.display(),
            products = products.len(),
            "Product catalogue loaded"
        );

        Ok(Self { products })
    }

    pub fn from_products(products: Vec<RasterProduct>) -> Self {
        Self { products }
    }

    pub fn get(&self, name: &str) -> Result<&RasterProduct> {
        self.products
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| PipelineError::UnknownProduct(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RasterProduct> {
        self.products.iter()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Catalogue directory of a product.
pub fn product_dir(catalog_dir: &Path, product: &ProductConfig) -> PathBuf {
    if product.is_structure() {
        catalog_dir.join(STRUCTURE_DIR).join(&product.name)
    } else {
        catalog_dir.join(&product.name)
    }
}
