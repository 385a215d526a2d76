//! The seam between the numeric core and raster storage.

use raster_common::{RasterArray, Window};

use crate::error::Result;
use crate::profile::RasterProfile;

/// An opened raster that can be read window by window.
pub trait RasterSource {
    /// Header information of the whole raster.
    fn profile(&self) -> &RasterProfile;

    /// Read all bands inside `window`. The returned array carries the
    /// window's transform and the raster's resolved nodata value.
    fn read_window(&mut self, window: &Window) -> Result<RasterArray>;

    /// Read the full extent.
    fn read_all(&mut self) -> Result<RasterArray> {
        let window = self.profile().full_window()?;
        self.read_window(&window)
    }
}
