//! Configuration for the tile pipeline.

use std::collections::HashSet;
use std::path::PathBuf;

use raster_common::PixelBox;
use raster_io::InterleaveConverter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::mask::{MaskPolarity, DEFAULT_FOREST_CODES};
use crate::normalize::NormalizationPolicy;

/// Lidar-derived structure metrics. These live under `structure/` in both
/// the catalogue and the output tree.
pub const STRUCTURE_PRODUCTS: [&str; 5] = [
    "loreys_height",
    "elev_p95",
    "elev_cv",
    "gross_stem_volume",
    "total_biomass",
];

/// Short codes used in composite file names.
pub fn structure_short_name(name: &str) -> Option<&'static str> {
    match name {
        "loreys_height" => Some("lh"),
        "elev_p95" => Some("p95"),
        "elev_cv" => Some("cv"),
        "gross_stem_volume" => Some("vol"),
        "total_biomass" => Some("bio"),
        _ => None,
    }
}

/// Tile ids of the provincial study areas.
pub fn study_area_tiles(area: &str) -> Option<&'static [i64]> {
    match area.to_lowercase().as_str() {
        "bc" => Some(&[435, 436, 396, 397]),
        "ab" => Some(&[399, 438, 439, 478]),
        "on" => Some(&[292, 293, 294, 254, 258, 259, 219, 220]),
        "nb" => Some(&[305, 306, 266, 267, 268]),
        _ => None,
    }
}

/// One raster product to process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Catalogue directory name, also used in output names.
    pub name: String,

    #[serde(default)]
    pub policy: NormalizationPolicy,

    /// Override for whether the product is a structure metric.
    #[serde(default)]
    pub structure: Option<bool>,

    /// Code used in composite names; defaults to the structure short name.
    #[serde(default)]
    pub short_name: Option<String>,

    /// Product whose nodata pixels are forced to 0 (age policies only).
    #[serde(default)]
    pub template: Option<String>,
}

impl ProductConfig {
    pub fn new(name: impl Into<String>, policy: NormalizationPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            structure: None,
            short_name: None,
            template: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn is_structure(&self) -> bool {
        self.structure
            .unwrap_or_else(|| STRUCTURE_PRODUCTS.contains(&self.name.as_str()))
    }

    pub fn short_code(&self) -> String {
        self.short_name
            .clone()
            .or_else(|| structure_short_name(&self.name).map(str::to_string))
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Where products are found inside the catalogue directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Extension of single-file mosaics.
    pub extension: String,
    /// File name prefix of species probability layers.
    pub species_prefix: String,
    /// Extension of species probability layers.
    pub species_extension: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            extension: ".dat".to_string(),
            species_prefix: "CA_forest".to_string(),
            species_extension: ".tif".to_string(),
        }
    }
}

/// Categorical mask settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub forest_codes: Vec<i64>,
    /// Land cover nodata maps to 0 under either polarity.
    pub polarity: MaskPolarity,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            forest_codes: DEFAULT_FOREST_CODES.to_vec(),
            polarity: MaskPolarity::ForestIsOne,
        }
    }
}

impl MaskConfig {
    pub fn code_set(&self) -> HashSet<i64> {
        self.forest_codes.iter().copied().collect()
    }
}

/// Which per-product artifact goes into the structure composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeSource {
    Raw,
    #[default]
    Normalized,
}

/// Structure composite settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MergeConfig {
    pub enabled: bool,
    /// Products to merge, in band order. Empty means every configured
    /// structure product, in configuration order.
    pub products: Vec<String>,
    pub source: MergeSource,
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the mosaic catalogue.
    pub catalog_dir: PathBuf,

    /// AOI tile grid (GeoJSON).
    pub aoi_path: PathBuf,

    /// Root of the output tree.
    pub out_dir: PathBuf,

    pub products: Vec<ProductConfig>,

    /// Tiles that are never processed.
    pub excluded_tiles: Vec<i64>,

    /// Explicit allow-list of tile ids.
    pub tiles: Option<Vec<i64>>,

    /// Restrict to a provincial study area (`bc`, `ab`, `on`, `nb`).
    pub study_area: Option<String>,

    /// Crop relative to each tile window.
    pub bbox: Option<PixelBox>,

    pub catalog: CatalogConfig,
    pub mask: MaskConfig,
    pub merge: MergeConfig,

    /// External tool converting composites to pixel interleave.
    pub interleave: Option<InterleaveConverter>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("mosaiced"),
            aoi_path: PathBuf::from("aoi_tiles.geojson"),
            out_dir: PathBuf::from("processed_tiles"),
            products: STRUCTURE_PRODUCTS
                .iter()
                .map(|name| ProductConfig::new(*name, NormalizationPolicy::Linear))
                .collect(),
            excluded_tiles: Vec::new(),
            tiles: None,
            study_area: None,
            bbox: None,
            catalog: CatalogConfig::default(),
            mask: MaskConfig::default(),
            merge: MergeConfig::default(),
            interleave: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `TILER_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("TILER_CATALOG_DIR") {
            self.catalog_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TILER_AOI_PATH") {
            self.aoi_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TILER_OUT_DIR") {
            self.out_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TILER_STUDY_AREA") {
            self.study_area = Some(val);
        }

        if let Ok(val) = std::env::var("TILER_BBOX") {
            match val.parse::<PixelBox>() {
                Ok(bbox) => self.bbox = Some(bbox),
                Err(e) => warn!(value = %val, error = %e, "Ignoring malformed TILER_BBOX"),
            }
        }

        if let Ok(val) = std::env::var("TILER_EXCLUDED_TILES") {
            let (ids, invalid) = parse_id_list(&val);
            if !invalid.is_empty() {
                warn!(
                    invalid = ?invalid,
                    "Ignoring malformed TILER_EXCLUDED_TILES entries"
                );
            }
            self.excluded_tiles = ids;
        }

        if let Ok(val) = std::env::var("TILER_MERGE_STRUCTURES") {
            self.merge.enabled = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("TILER_INTERLEAVE") {
            self.interleave = match val.to_lowercase().as_str() {
                "" | "none" | "false" | "0" => None,
                _ => Some(InterleaveConverter::gdal_translate()),
            };
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.products.is_empty() {
            return Err("at least one product must be configured".to_string());
        }

        let mut names = HashSet::new();
        for product in &self.products {
            if product.name.trim().is_empty() {
                return Err("product names must not be empty".to_string());
            }
            if !names.insert(product.name.as_str()) {
                return Err(format!("product '{}' is configured twice", product.name));
            }
        }

        for product in &self.products {
            match product.policy {
                NormalizationPolicy::AgeFixed { upper_age, .. }
                | NormalizationPolicy::AgeZScore { upper_age, .. }
                    if upper_age == 0 =>
                {
                    return Err(format!("{}: upper_age must be > 0", product.name));
                }
                NormalizationPolicy::SpeciesTopK { k } if k == 0 => {
                    return Err(format!("{}: k must be > 0", product.name));
                }
                _ => {}
            }

            if let Some(template) = &product.template {
                if !product.policy.uses_template() {
                    return Err(format!(
                        "{}: templates only apply to age policies",
                        product.name
                    ));
                }
                if !names.contains(template.as_str()) || template == &product.name {
                    return Err(format!(
                        "{}: template '{}' is not another configured product",
                        product.name, template
                    ));
                }
            }
        }

        if let Some(area) = &self.study_area {
            if study_area_tiles(area).is_none() {
                return Err(format!("unknown study area '{}'", area));
            }
        }

        if let Some(bbox) = &self.bbox {
            if bbox.width <= 0 || bbox.height <= 0 {
                return Err(format!("bbox {} must have positive width and height", bbox));
            }
        }

        if self.mask.forest_codes.is_empty() {
            return Err("mask.forest_codes must not be empty".to_string());
        }

        if self.catalog.extension.is_empty() {
            return Err("catalog.extension must not be empty".to_string());
        }

        for name in &self.merge.products {
            if !names.contains(name.as_str()) {
                return Err(format!("merge product '{}' is not configured", name));
            }
        }
        if self.merge.enabled && self.merge_products().is_empty() {
            return Err("merge is enabled but no structure products are configured".to_string());
        }

        Ok(())
    }

    /// Configured product by name.
    pub fn product(&self, name: &str) -> Option<&ProductConfig> {
        self.products.iter().find(|p| p.name == name)
    }

    /// Products merged into the structure composite, in band order.
    pub fn merge_products(&self) -> Vec<&ProductConfig> {
        if self.merge.products.is_empty() {
            self.products.iter().filter(|p| p.is_structure()).collect()
        } else {
            self.merge
                .products
                .iter()
                .filter_map(|name| self.product(name))
                .collect()
        }
    }

    /// Whether a tile is skipped before any I/O.
    pub fn is_excluded(&self, tile_id: i64) -> bool {
        if self.excluded_tiles.contains(&tile_id) {
            return true;
        }
        if let Some(allowed) = &self.tiles {
            if !allowed.contains(&tile_id) {
                return true;
            }
        }
        if let Some(allowed) = self.study_area.as_deref().and_then(study_area_tiles) {
            if !allowed.contains(&tile_id) {
                return true;
            }
        }
        false
    }
}

/// Parse `"1, 2,3"` into ids. Entries that are not integers come back in
/// the second list; blank entries are skipped.
pub fn parse_id_list(s: &str) -> (Vec<i64>, Vec<String>) {
    let mut ids = Vec::new();
    let mut invalid = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse() {
            Ok(id) => ids.push(id),
            Err(_) => invalid.push(part.to_string()),
        }
    }
    (ids, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.products.len(), 5);
        assert!(config.products.iter().all(|p| p.is_structure()));
    }

    #[test]
    fn test_short_codes() {
        assert_eq!(ProductConfig::new("elev_p95", Default::default()).short_code(), "p95");
        assert_eq!(ProductConfig::new("age", Default::default()).short_code(), "age");
        let mut p = ProductConfig::new("total_biomass", Default::default());
        p.short_name = Some("tb".to_string());
        assert_eq!(p.short_code(), "tb");
    }

    #[test]
    fn test_structure_flag_override() {
        let mut p = ProductConfig::new("canopy_cover", Default::default());
        assert!(!p.is_structure());
        p.structure = Some(true);
        assert!(p.is_structure());
    }

    #[test]
    fn test_tile_filters() {
        let mut config = PipelineConfig::default();
        config.excluded_tiles = vec![396];
        config.study_area = Some("bc".to_string());
        assert!(!config.is_excluded(435));
        assert!(config.is_excluded(396));
        assert!(config.is_excluded(1));

        config.study_area = None;
        config.tiles = Some(vec![1, 2]);
        assert!(!config.is_excluded(2));
        assert!(config.is_excluded(435));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_unknowns() {
        let mut config = PipelineConfig::default();
        config.products.push(ProductConfig::new("elev_p95", Default::default()));
        assert!(config.validate().unwrap_err().contains("twice"));

        let mut config = PipelineConfig::default();
        config.study_area = Some("qc".to_string());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.merge.products = vec!["age".to_string()];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.bbox = Some(PixelBox::new(0, 0, 0, 10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_templates() {
        let mut config = PipelineConfig::default();
        config.products.push(
            ProductConfig::new("age", NormalizationPolicy::age_fixed()).with_template("landcover"),
        );
        assert!(config.validate().is_err());

        config
            .products
            .push(ProductConfig::new("landcover", NormalizationPolicy::CategoricalMask));
        assert!(config.validate().is_ok());

        config.products[0].template = Some("age".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_products_order() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.merge_products().len(), 5);
        config.merge.products = vec!["total_biomass".to_string(), "elev_p95".to_string()];
        let names: Vec<_> = config.merge_products().iter().map(|p| p.short_code()).collect();
        assert_eq!(names, vec!["bio", "p95"]);
    }

    #[test]
    fn test_parse_id_list() {
        let (ids, invalid) = parse_id_list("1, 2,x,3, 4O5,");
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(invalid, vec!["x".to_string(), "4O5".to_string()]);

        let (ids, invalid) = parse_id_list("");
        assert!(ids.is_empty());
        assert!(invalid.is_empty());
    }

    #[test]
    fn test_yaml_policies() {
        let yaml = r#"
catalog_dir: /data/mosaiced
products:
  - name: elev_p95
  - name: age
    policy: { type: age_fixed, upper_age: 120 }
    template: landcover
  - name: landcover
    policy: { type: categorical_mask }
mask:
  polarity: forest_is_zero
bbox: [0, 0, 500, 500]
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.products.len(), 3);
        assert_eq!(
            config.products[1].policy,
            NormalizationPolicy::AgeFixed {
                reference_year: 2019,
                upper_age: 120
            }
        );
        assert_eq!(config.mask.polarity, MaskPolarity::ForestIsZero);
        assert_eq!(config.mask.forest_codes, vec![81, 210, 220, 230]);
        assert_eq!(config.bbox, Some(PixelBox::new(0, 0, 500, 500)));
        assert!(config.validate().is_ok());
    }
}
