//! Window resolution: world bounds → pixel windows.

use raster_common::{BoundingBox, GeoTransform, PixelBox, RasterError, RasterResult, Window};

/// Fractional pixel edges closer than this to an integer snap onto it, so
/// bounds that sit exactly on the pixel grid do not grow by a pixel due to
/// floating-point noise.
const SNAP_TOLERANCE: f64 = 1e-6;

/// Pixel window of `raster_width × raster_height` covering `bounds`.
///
/// Offsets floor and far edges ceil, so the window covers the whole
/// geometry; the result is clipped to the raster.
pub fn resolve(
    transform: &GeoTransform,
    raster_width: usize,
    raster_height: usize,
    bounds: &BoundingBox,
) -> RasterResult<Window> {
    if !bounds.is_valid() {
        return Err(RasterError::invalid_geometry(format!(
            "bounds {:?} are not a finite, non-empty box",
            bounds
        )));
    }
    if !transform.is_rectilinear() {
        return Err(RasterError::invalid_window(
            "cannot resolve windows against a rotated transform",
        ));
    }
    if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
        return Err(RasterError::invalid_window("transform has a zero pixel size"));
    }

    let (c0, r0) = transform.world_to_pixel(bounds.min_x, bounds.max_y)?;
    let (c1, r1) = transform.world_to_pixel(bounds.max_x, bounds.min_y)?;

    let cols = edges(c0, c1, raster_width);
    let rows = edges(r0, r1, raster_height);

    match (cols, rows) {
        (Some((col_off, col_end)), Some((row_off, row_end))) => {
            Window::new(col_off, row_off, col_end - col_off, row_end - row_off)
        }
        _ => Err(RasterError::invalid_geometry(format!(
            "bounds {:?} do not intersect the {}x{} raster extent {:?}",
            bounds,
            raster_width,
            raster_height,
            transform.extent(raster_width, raster_height)
        ))),
    }
}

/// Integer `[start, end)` covering the fractional span between `a` and `b`,
/// clipped to `[0, limit)`. `None` when nothing is left after clipping.
fn edges(a: f64, b: f64, limit: usize) -> Option<(usize, usize)> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let start = snap(lo).floor().max(0.0);
    let end = snap(hi).ceil().min(limit as f64);
    if end > start {
        Some((start as usize, end as usize))
    } else {
        None
    }
}

fn snap(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < SNAP_TOLERANCE {
        nearest
    } else {
        v
    }
}

/// Crop relative to `base`: offsets add, size is taken from `sub` verbatim.
///
/// Only the window arithmetic is checked here; callers still need
/// [`Window::ensure_within`] against the raster they read.
pub fn refine(base: &Window, sub: &PixelBox) -> RasterResult<Window> {
    if sub.width <= 0 || sub.height <= 0 {
        return Err(RasterError::invalid_window(format!(
            "sub-box {} has non-positive width or height",
            sub
        )));
    }

    let col_off = base.col_off as i64 + sub.col_off;
    let row_off = base.row_off as i64 + sub.row_off;
    if col_off < 0 || row_off < 0 {
        return Err(RasterError::invalid_window(format!(
            "sub-box {} moves {} to negative offsets ({}, {})",
            sub, base, col_off, row_off
        )));
    }

    Window::new(
        col_off as usize,
        row_off as usize,
        sub.width as usize,
        sub.height as usize,
    )
}

/// Split a `width × height` raster into equal `block_width × block_height`
/// windows, column by column.
pub fn split_into_blocks(
    width: usize,
    height: usize,
    block_width: usize,
    block_height: usize,
) -> RasterResult<Vec<Window>> {
    if block_width == 0 || block_height == 0 {
        return Err(RasterError::invalid_window("block size must be positive"));
    }
    if width % block_width != 0 || height % block_height != 0 {
        return Err(RasterError::invalid_window(format!(
            "{}x{} raster is not divisible into {}x{} blocks",
            width, height, block_width, block_height
        )));
    }

    let mut windows = Vec::with_capacity((width / block_width) * (height / block_height));
    for col_off in (0..width).step_by(block_width) {
        for row_off in (0..height).step_by(block_height) {
            windows.push(Window::new(col_off, row_off, block_width, block_height)?);
        }
    }
    Ok(windows)
}
