//! End-to-end pipeline runs over a synthetic catalogue written to disk.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use raster_common::{BoundingBox, PixelBox, RasterArray, SampleType};
use raster_io::{read_geotiff, write_geotiff, GeoJsonTileGrid, GeoTiffDataset, RasterSource, Tile};
use tempfile::TempDir;
use test_utils::{
    create_band_with_nodata, create_gradient_band, create_landcover_band, create_raster,
    create_single_band_raster, nodata, products, stack_bands, temp_test_dir,
    transforms,
};
use test_utils::tiles::geojson_grid;
use tile_pipeline::normalize::percentage_to_byte;
use tile_pipeline::{
    MaskPolarity, NormalizationPolicy, PipelineConfig, ProductConfig, TilePipeline,
};

const WIDTH: usize = 40;
const HEIGHT: usize = 20;
const TILE: usize = 20;

/// Pixel (col, row) of the structure rasters holding nodata.
const NODATA_PIXELS: [(usize, usize); 2] = [(5, 3), (27, 11)];

/// Species layers in file-name order and their constant percentages.
const SPECIES: [(&str, u8); 8] = [
    ("CA_forest_A", 10),
    ("CA_forest_B", 5),
    ("CA_forest_C", 40),
    ("CA_forest_D", 30),
    ("CA_forest_E", 0),
    ("CA_forest_F", 20),
    ("CA_forest_G", 50),
    ("CA_forest_H", 3),
];

fn tile_bounds(tile_col: usize) -> BoundingBox {
    let t = transforms::LAMBERT_30M;
    let min_x = t.origin_x + (tile_col * TILE) as f64 * t.pixel_width;
    BoundingBox::new(
        min_x,
        t.origin_y + TILE as f64 * t.pixel_height,
        min_x + TILE as f64 * t.pixel_width,
        t.origin_y,
    )
}

fn tiles() -> Vec<Tile> {
    vec![Tile::new(1, tile_bounds(0)), Tile::new(2, tile_bounds(1))]
}

fn write(dir: &Path, file: &str, raster: &RasterArray) {
    std::fs::create_dir_all(dir).unwrap();
    write_geotiff(raster, dir.join(file)).unwrap();
}

/// Ages cycle through 0..=199 inside every tile, so each tile sees age 0
/// and ages past the 150-year cap.
fn establishment_years() -> Array2<f64> {
    Array2::from_shape_fn((HEIGHT, WIDTH), |(row, col)| {
        let age = ((row % TILE) * TILE + col % TILE) % 200;
        2019.0 - age as f64 + 0.25
    })
}

fn build_catalogue(root: &Path) {
    let structure = |min, max| {
        create_single_band_raster(
            create_band_with_nodata(WIDTH, HEIGHT, min, max, nodata::STRUCTURE, &NODATA_PIXELS),
            SampleType::F32,
            Some(nodata::STRUCTURE),
        )
    };
    write(
        &root.join("structure").join(products::ELEV_P95),
        "elev_p95_2019.dat",
        &structure(0.0, 40.0),
    );
    write(
        &root.join("structure").join(products::TOTAL_BIOMASS),
        "total_biomass_2019.dat",
        &structure(10.0, 600.0),
    );
    write(
        &root.join(products::AGE),
        "age_2019.dat",
        &create_single_band_raster(establishment_years(), SampleType::F32, None),
    );
    write(
        &root.join(products::LANDCOVER),
        "landcover_2019.dat",
        &create_single_band_raster(create_landcover_band(WIDTH, HEIGHT), SampleType::U8, None),
    );

    let species_dir = root.join(products::SPECIES);
    for (name, value) in SPECIES {
        let band = Array2::from_elem((HEIGHT, WIDTH), f64::from(value));
        write(
            &species_dir,
            &format!("{}.tif", name),
            &create_single_band_raster(band, SampleType::U8, None),
        );
    }
}

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        catalog_dir: root.join("catalogue"),
        out_dir: root.join("out"),
        products: vec![
            ProductConfig::new(products::ELEV_P95, NormalizationPolicy::Linear),
            ProductConfig::new(products::TOTAL_BIOMASS, NormalizationPolicy::Linear),
            ProductConfig::new(products::AGE, NormalizationPolicy::age_fixed())
                .with_template(products::ELEV_P95),
            ProductConfig::new(products::LANDCOVER, NormalizationPolicy::CategoricalMask),
            ProductConfig::new(products::SPECIES, NormalizationPolicy::species_top_k()),
        ],
        excluded_tiles: vec![3],
        ..Default::default()
    };
    config.merge.enabled = true;
    config
}

fn setup() -> (TempDir, PipelineConfig) {
    let tmp = temp_test_dir();
    build_catalogue(&tmp.path().join("catalogue"));
    let config = config(tmp.path());
    (tmp, config)
}

fn band(path: &Path) -> Array2<f64> {
    read_geotiff(path)
        .unwrap()
        .data
        .index_axis(Axis(0), 0)
        .to_owned()
}

#[test]
fn test_run_writes_every_artifact() {
    let (_tmp, config) = setup();
    let pipeline = TilePipeline::new(config.clone()).unwrap();

    let mut all = tiles();
    all.push(Tile::new(3, tile_bounds(0)));
    let report = pipeline.run(&all).unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.tiles_processed, 2);
    assert_eq!(report.tiles_skipped, 1);
    // Raw + norm for four mosaics, species, merged.
    assert_eq!(report.artifacts.len(), 2 * (4 * 2 + 1 + 1));
    for path in &report.artifacts {
        assert!(path.is_file(), "missing {}", path.display());
    }

    let out = &config.out_dir;
    assert!(out.join("tile_1/structure/elev_p95/elev_p95-tile-1.tif").is_file());
    assert!(out.join("tile_1/structure/elev_p95/elev_p95-tile-1-norm.tif").is_file());
    assert!(out.join("tile_2/age/age-tile-2-norm.tif").is_file());
    assert!(out.join("tile_2/landcover/landcover-tile-2-norm.tif").is_file());
    assert!(out.join("tile_1/species/species-tile-1-norm.tif").is_file());
    assert!(out.join("tile_1/structure/merged/p95-bio-tile-1.tif").is_file());
    assert!(!out.join("tile_3").exists());
}

#[test]
fn test_run_from_geojson_grid() {
    let (tmp, mut config) = setup();
    config.aoi_path = tmp.path().join("aoi_tiles.geojson");
    std::fs::write(
        &config.aoi_path,
        geojson_grid(&[(2, tile_bounds(1)), (7, tile_bounds(0))]),
    )
    .unwrap();
    config.tiles = Some(vec![2]);

    let pipeline = TilePipeline::new(config.clone()).unwrap();
    let report = pipeline.run(&GeoJsonTileGrid::new(&config.aoi_path)).unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.tiles_processed, 1);
    assert_eq!(report.tiles_skipped, 1);
    assert!(config.out_dir.join("tile_2").is_dir());
    assert!(!config.out_dir.join("tile_7").exists());
}

#[test]
fn test_raw_artifact_matches_source_window() {
    let (_tmp, config) = setup();
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let raw = read_geotiff(
        config
            .out_dir
            .join("tile_2/structure/total_biomass/total_biomass-tile-2.tif"),
    )
    .unwrap();
    assert_eq!(raw.sample_type, SampleType::F32);
    assert_eq!(raw.nodata, Some(nodata::STRUCTURE));
    assert_eq!(raw.shape(), (1, TILE, TILE));

    let source = create_band_with_nodata(WIDTH, HEIGHT, 10.0, 600.0, nodata::STRUCTURE, &NODATA_PIXELS);
    let expected = source.slice(ndarray::s![.., TILE..]).mapv(|v| v as f32 as f64);
    assert_eq!(raw.data.index_axis(Axis(0), 0), expected);

    let t = transforms::LAMBERT_30M;
    assert_eq!(raw.transform.origin_x, t.origin_x + TILE as f64 * t.pixel_width);
    assert_eq!(raw.transform.origin_y, t.origin_y);
}

#[test]
fn test_linear_artifact_reserves_zero_for_nodata() {
    let (_tmp, config) = setup();
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let norm = read_geotiff(
        config
            .out_dir
            .join("tile_1/structure/elev_p95/elev_p95-tile-1-norm.tif"),
    )
    .unwrap();
    assert_eq!(norm.sample_type, SampleType::U8);
    assert_eq!(norm.nodata, Some(0.0));

    let band = norm.data.index_axis(Axis(0), 0);
    assert_eq!(band[[3, 5]], 0.0);
    let valid: Vec<f64> = band.iter().copied().filter(|v| *v != 0.0).collect();
    assert_eq!(valid.len(), TILE * TILE - 1);
    assert_eq!(valid.iter().cloned().fold(f64::INFINITY, f64::min), 1.0);
    assert_eq!(valid.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 255.0);
}

#[test]
fn test_age_respects_template_nodata() {
    let (_tmp, config) = setup();
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let age = band(&config.out_dir.join("tile_2/age/age-tile-2-norm.tif"));
    // (27, 11) is structure nodata, i.e. local (7, 11) in tile 2.
    assert_eq!(age[[11, 7]], 0.0);
    // Age 0 maps to 1, capped ages map to 255.
    assert_eq!(age[[0, 0]], 1.0);
    assert_eq!(age[[9, 19]], 255.0);
    assert!(age.iter().all(|v| (0.0..=255.0).contains(v)));
}

#[test]
fn test_mask_follows_land_cover_codes() {
    let (_tmp, mut config) = setup();
    config.mask.polarity = MaskPolarity::ForestIsZero;
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let path = config
        .out_dir
        .join("tile_1/landcover/landcover-tile-1-norm.tif");
    let dataset = GeoTiffDataset::open(&path).unwrap();
    assert_eq!(dataset.profile().nodata, vec![None]);
    drop(dataset);

    let mask = band(&path);
    let landcover = create_landcover_band(WIDTH, HEIGHT);
    for ((row, col), v) in mask.indexed_iter() {
        let code = landcover[[row, col]] as i64;
        let forest = [81, 210, 220, 230].contains(&code);
        assert_eq!(*v, if forest { 0.0 } else { 1.0 }, "code {}", code);
    }
}

#[test]
fn test_species_composite_top_five_and_rest() {
    let (_tmp, config) = setup();
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let path = config.out_dir.join("tile_1/species/species-tile-1-norm.tif");
    let dataset = GeoTiffDataset::open(&path).unwrap();
    assert_eq!(dataset.profile().count, 6);
    assert_eq!(
        dataset.profile().metadata.get("top_species").map(String::as_str),
        Some("CA_forest_G,CA_forest_C,CA_forest_D,CA_forest_F,CA_forest_A")
    );
    drop(dataset);

    let species = read_geotiff(&path).unwrap();
    let expected = [50, 40, 30, 20, 10].map(percentage_to_byte);
    for (band, value) in species.data.outer_iter().zip(expected) {
        assert!(band.iter().all(|v| *v == f64::from(value)));
    }
    let rest = f64::from(percentage_to_byte(5)) + f64::from(percentage_to_byte(3));
    assert!(species.data.index_axis(Axis(0), 5).iter().all(|v| *v == rest));
}

#[test]
fn test_merged_composite_stacks_normalized_bands() {
    let (_tmp, config) = setup();
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let out = &config.out_dir;
    let merged = read_geotiff(out.join("tile_2/structure/merged/p95-bio-tile-2.tif")).unwrap();
    assert_eq!(merged.bands(), 2);
    assert_eq!(
        merged.data.index_axis(Axis(0), 0),
        band(&out.join("tile_2/structure/elev_p95/elev_p95-tile-2-norm.tif"))
    );
    assert_eq!(
        merged.data.index_axis(Axis(0), 1),
        band(&out.join("tile_2/structure/total_biomass/total_biomass-tile-2-norm.tif"))
    );
    assert!(!out
        .join("tile_2/structure/merged/p95-bio-tile-2_tmp.tif")
        .exists());
}

#[test]
fn test_rerun_is_idempotent() {
    let (_tmp, config) = setup();
    let pipeline = TilePipeline::new(config).unwrap();

    let first = pipeline.run(&tiles()).unwrap();
    let snapshot: Vec<(PathBuf, Vec<u8>)> = first
        .artifacts
        .iter()
        .map(|p| (p.clone(), std::fs::read(p).unwrap()))
        .collect();

    let second = pipeline.run(&tiles()).unwrap();
    assert_eq!(first.artifacts, second.artifacts);
    for (path, bytes) in snapshot {
        assert_eq!(std::fs::read(&path).unwrap(), bytes, "{} changed", path.display());
    }
}

#[test]
fn test_bbox_override_names_and_shapes() {
    let (_tmp, mut config) = setup();
    config.bbox = Some(PixelBox::new(2, 4, 10, 8));
    TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();

    let out = &config.out_dir;
    let raw = read_geotiff(out.join("tile_1/structure/elev_p95/elev_p95-tile-1-2-4-10-8.tif")).unwrap();
    assert_eq!(raw.shape(), (1, 8, 10));
    assert!(out
        .join("tile_1/structure/elev_p95/elev_p95-tile-1-norm-2-4-10-8.tif")
        .is_file());
    assert!(out
        .join("tile_2/species/species-tile-2-norm-2-4-10-8.tif")
        .is_file());
    assert!(out
        .join("tile_2/structure/merged/p95-bio-tile-2-2-4-10-8.tif")
        .is_file());
}

#[test]
fn test_bbox_past_the_raster_fails_each_unit() {
    let (_tmp, mut config) = setup();
    config.bbox = Some(PixelBox::new(15, 0, 10, 10));
    config.merge.enabled = false;
    let report = TilePipeline::new(config).unwrap().run(&tiles()).unwrap();

    // Tile 1 can extend into tile 2's pixels; tile 2 runs off the raster.
    let tile_2: Vec<_> = report.failures.iter().filter(|f| f.tile_id == 2).collect();
    assert_eq!(tile_2.len(), 5);
    assert!(tile_2.iter().all(|f| f.kind == "InvalidWindowError"));
    assert!(report.failures.iter().all(|f| f.tile_id == 2));
}

#[test]
fn test_failure_is_confined_to_its_unit() {
    let (tmp, config) = setup();
    // A constant biomass mosaic cannot be linearly scaled.
    let flat = create_raster(
        stack_bands(&[create_gradient_band(WIDTH, HEIGHT, 7.0, 7.0)]),
        SampleType::F32,
        None,
    );
    write(
        &tmp.path().join("catalogue/structure/total_biomass"),
        "total_biomass_2019.dat",
        &flat,
    );

    let report = TilePipeline::new(config.clone()).unwrap().run(&tiles()).unwrap();
    assert_eq!(report.tiles_processed, 2);

    for tile_id in [1, 2] {
        let failures: Vec<_> = report
            .failures
            .iter()
            .filter(|f| f.tile_id == tile_id)
            .collect();
        assert_eq!(failures.len(), 2, "{:?}", failures);
        assert_eq!(failures[0].product, products::TOTAL_BIOMASS);
        assert_eq!(failures[0].kind, "DegenerateRangeError");
        assert_eq!(failures[1].product, "merged");
        assert_eq!(failures[1].kind, "MissingInputError");
    }

    let out = &config.out_dir;
    assert!(out.join("tile_1/structure/elev_p95/elev_p95-tile-1-norm.tif").is_file());
    assert!(!out.join("tile_1/structure/merged/p95-bio-tile-1.tif").exists());
    // Neither artifact of the failed product is left behind.
    for tile_id in [1, 2] {
        let dir = out.join(format!("tile_{}/structure/total_biomass", tile_id));
        assert!(!dir.join(format!("total_biomass-tile-{}.tif", tile_id)).exists());
        assert!(!dir.join(format!("total_biomass-tile-{}-norm.tif", tile_id)).exists());
    }
}

#[test]
fn test_missing_product_fails_before_any_tile() {
    let (tmp, mut config) = setup();
    config
        .products
        .push(ProductConfig::new(products::ELEV_CV, NormalizationPolicy::Linear));

    let err = TilePipeline::new(config.clone()).unwrap_err();
    assert_eq!(err.kind(), "MissingInputError");
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, mut config) = setup();
    config.products.clear();
    let err = TilePipeline::new(config).unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
}
