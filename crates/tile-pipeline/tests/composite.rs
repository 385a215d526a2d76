//! Band stacking and block cropping against real files.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use raster_common::SampleType;
use raster_io::{read_geotiff, write_geotiff, FinalizeOutcome, InterleaveConverter};
use test_utils::{create_gradient_band, create_single_band_raster, create_test_band, temp_test_dir};
use tile_pipeline::{crop_into_blocks, stack};

fn write_band(dir: &Path, name: &str, band: Array2<f64>) -> PathBuf {
    let path = dir.join(name);
    write_geotiff(&create_single_band_raster(band, SampleType::U8, Some(0.0)), &path).unwrap();
    path
}

fn constant(value: f64) -> Array2<f64> {
    Array2::from_elem((12, 16), value)
}

#[test]
fn test_stack_keeps_declared_band_order() {
    let tmp = temp_test_dir();
    let a = write_band(tmp.path(), "a.tif", constant(11.0));
    let b = write_band(tmp.path(), "b.tif", create_gradient_band(16, 12, 1.0, 255.0).mapv(f64::round));
    let c = write_band(tmp.path(), "c.tif", constant(33.0));

    let dest = tmp.path().join("merged/c-a-b.tif");
    let artifact = stack(&[c.clone(), a.clone(), b.clone()], &dest, None).unwrap();

    assert_eq!(artifact.path, dest);
    assert_eq!(artifact.outcome, FinalizeOutcome::Renamed);
    assert_eq!(artifact.profile.count, 3);
    assert_eq!(artifact.sources, vec![c.clone(), a.clone(), b.clone()]);

    let merged = read_geotiff(&dest).unwrap();
    assert_eq!(merged.shape(), (3, 12, 16));
    assert_eq!(merged.nodata, Some(0.0));
    for (i, source) in [c, a, b].iter().enumerate() {
        let original = read_geotiff(source).unwrap();
        assert_eq!(
            merged.data.index_axis(Axis(0), i),
            original.data.index_axis(Axis(0), 0)
        );
    }
    assert!(!tmp.path().join("merged/c-a-b_tmp.tif").exists());
}

#[test]
fn test_stack_missing_input_writes_nothing() {
    let tmp = temp_test_dir();
    let a = write_band(tmp.path(), "a.tif", constant(1.0));
    let dest = tmp.path().join("merged.tif");

    let err = stack(&[a, tmp.path().join("gone.tif")], &dest, None).unwrap_err();
    assert_eq!(err.kind(), "MissingInputError");
    assert!(!dest.exists());
}

#[test]
fn test_stack_shape_mismatch() {
    let tmp = temp_test_dir();
    let a = write_band(tmp.path(), "a.tif", constant(1.0));
    let b = write_band(tmp.path(), "b.tif", Array2::from_elem((12, 15), 2.0));
    let dest = tmp.path().join("merged.tif");

    let err = stack(&[a, b], &dest, None).unwrap_err();
    assert_eq!(err.kind(), "ShapeMismatchError");
    assert!(!dest.exists());
    assert!(!tmp.path().join("merged_tmp.tif").exists());
}

#[test]
fn test_failed_conversion_still_places_composite() {
    let tmp = temp_test_dir();
    let a = write_band(tmp.path(), "a.tif", constant(1.0));
    let b = write_band(tmp.path(), "b.tif", constant(2.0));
    let dest = tmp.path().join("merged.tif");

    let converter = InterleaveConverter::new("definitely-not-a-real-tool", vec![]);
    let artifact = stack(&[a, b], &dest, Some(&converter)).unwrap();

    assert!(matches!(artifact.outcome, FinalizeOutcome::ConversionFailed(_)));
    assert_eq!(read_geotiff(&dest).unwrap().bands(), 2);
}

#[test]
fn test_crop_into_blocks_column_major() {
    let tmp = temp_test_dir();
    let source = create_single_band_raster(create_test_band(8, 6), SampleType::F32, None);
    let artifact = tmp.path().join("tile_1/vol-bio-tile-1.tif");
    write_geotiff(&source, &artifact).unwrap();

    let blocks = crop_into_blocks(&artifact, 4, 3).unwrap();
    assert_eq!(blocks.len(), 4);
    assert_eq!(
        blocks[1],
        tmp.path().join("tile_1/cropped-4-3/vol-bio-tile-1-win-2.tif")
    );

    // Block 2 is the lower-left one: columns 0..4, rows 3..6.
    let block = read_geotiff(&blocks[1]).unwrap();
    assert_eq!(block.shape(), (1, 3, 4));
    assert_eq!(block.sample_type, SampleType::U8);
    assert_eq!(block.nodata, Some(0.0));
    assert_eq!(block.transform.origin_y, source.transform.origin_y + 3.0 * source.transform.pixel_height);

    let values = block.data.index_axis(Axis(0), 0);
    // col * 1000 + row: minimum at (row 3, col 0), maximum at (row 5, col 3).
    assert_eq!(values[[0, 0]], 1.0);
    assert_eq!(values[[2, 3]], 255.0);
}

#[test]
fn test_crop_rejects_uneven_blocks() {
    let tmp = temp_test_dir();
    let artifact = tmp.path().join("a.tif");
    write_geotiff(
        &create_single_band_raster(create_test_band(8, 6), SampleType::F32, None),
        &artifact,
    )
    .unwrap();

    let err = crop_into_blocks(&artifact, 3, 3).unwrap_err();
    assert_eq!(err.kind(), "InvalidWindowError");
}

#[test]
fn test_stack_rejects_mixed_sample_types() {
    let tmp = temp_test_dir();
    let a = write_band(tmp.path(), "a.tif", constant(7.0));
    let b = tmp.path().join("b.tif");
    write_geotiff(
        &create_single_band_raster(constant(312.75), SampleType::F32, Some(0.0)),
        &b,
    )
    .unwrap();

    let dest = tmp.path().join("merged.tif");
    let err = stack(&[a, b], &dest, None).unwrap_err();
    assert_eq!(err.kind(), "InvalidDataError");
    assert!(!dest.exists());
    assert!(!tmp.path().join("merged_tmp.tif").exists());
}
