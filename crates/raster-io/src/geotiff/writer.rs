//! Pixel-interleaved GeoTIFF writing.
//!
//! Arbitrary band counts go through the low-level directory encoder, so the
//! same code path handles single-band normalized products, the 6-band
//! species composite and stacked structure composites.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use raster_common::{RasterArray, RasterError, SampleType};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::debug;

use super::{build_geokey_directory, format_gdal_metadata, format_nodata, GDAL_METADATA};
use crate::error::{RasterIoError, Result};

/// Target uncompressed strip size.
const STRIP_BYTES: usize = 256 * 1024;

/// Builder for a GeoTIFF file written from a [`RasterArray`].
pub struct GeoTiffWriter<'a> {
    array: &'a RasterArray,
    metadata: BTreeMap<String, String>,
}

impl<'a> GeoTiffWriter<'a> {
    pub fn new(array: &'a RasterArray) -> Self {
        Self {
            array,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach dataset-level metadata items (written as `GDAL_METADATA`).
    pub fn metadata(mut self, items: BTreeMap<String, String>) -> Self {
        self.metadata = items;
        self
    }

    /// Add a single metadata item.
    pub fn item(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Write to a file, creating parent directories as needed.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path).map_err(|e| RasterIoError::open(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;

        debug!(
            path = %path.display(),
            bands = self.array.bands(),
            height = self.array.height(),
            width = self.array.width(),
            sample_type = %self.array.sample_type,
            "Wrote GeoTIFF"
        );
        Ok(())
    }

    /// Write to any seekable sink.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let (bands, height, width) = self.array.shape();
        if bands == 0 || height == 0 || width == 0 {
            return Err(RasterError::invalid_data(format!(
                "cannot write an empty {}x{}x{} array",
                bands, height, width
            ))
            .into());
        }
        let sample_type = self.array.sample_type;

        let mut encoder = TiffEncoder::new(writer)?;
        let mut dir = encoder.new_directory()?;

        dir.write_tag(Tag::ImageWidth, width as u32)?;
        dir.write_tag(Tag::ImageLength, height as u32)?;
        dir.write_tag(Tag::BitsPerSample, vec![sample_type.bits(); bands].as_slice())?;
        dir.write_tag(Tag::Compression, 1u16)?;
        dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
        dir.write_tag(Tag::SamplesPerPixel, bands as u16)?;
        dir.write_tag(
            Tag::SampleFormat,
            vec![sample_type.sample_format(); bands].as_slice(),
        )?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        if bands > 1 {
            dir.write_tag(Tag::ExtraSamples, vec![0u16; bands - 1].as_slice())?;
        }

        self.write_geotiff_tags(&mut dir)?;

        let row_bytes = width * bands * sample_type.size();
        let rows_per_strip = (STRIP_BYTES / row_bytes).clamp(1, height);
        dir.write_tag(Tag::RowsPerStrip, rows_per_strip as u32)?;

        let mut offsets = Vec::new();
        let mut byte_counts = Vec::new();
        let mut row = 0;
        while row < height {
            let end = (row + rows_per_strip).min(height);
            let bytes = self.encode_rows(row, end);
            let offset = dir.write_data(bytes.as_slice())?;
            offsets.push(u32::try_from(offset).map_err(|_| {
                RasterIoError::unsupported("output exceeds the classic TIFF 4 GiB limit")
            })?);
            byte_counts.push(bytes.len() as u32);
            row = end;
        }

        dir.write_tag(Tag::StripOffsets, offsets.as_slice())?;
        dir.write_tag(Tag::StripByteCounts, byte_counts.as_slice())?;
        dir.finish()?;

        Ok(())
    }

    fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
        &self,
        dir: &mut DirectoryEncoder<W, K>,
    ) -> Result<()> {
        let t = &self.array.transform;

        if t.is_rectilinear() && t.pixel_height < 0.0 {
            let pixel_scale = [t.pixel_width, -t.pixel_height, 0.0];
            dir.write_tag(Tag::ModelPixelScaleTag, pixel_scale.as_slice())?;

            let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
            dir.write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())?;
        } else {
            let matrix = [
                t.pixel_width,
                t.row_rotation,
                0.0,
                t.origin_x,
                t.col_rotation,
                t.pixel_height,
                0.0,
                t.origin_y,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                1.0,
            ];
            dir.write_tag(Tag::ModelTransformationTag, matrix.as_slice())?;
        }

        if let Some(crs) = &self.array.crs {
            let geokeys = build_geokey_directory(crs);
            dir.write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())?;
        }

        if let Some(nodata) = self.array.nodata {
            dir.write_tag(Tag::GdalNodata, format_nodata(nodata).as_str())?;
        }

        if !self.metadata.is_empty() {
            let xml = format_gdal_metadata(&self.metadata);
            dir.write_tag(Tag::Unknown(GDAL_METADATA), xml.as_str())?;
        }

        Ok(())
    }

    /// Pixel-interleaved bytes for rows `start..end`, in native byte order
    /// to match the header the encoder writes.
    fn encode_rows(&self, start: usize, end: usize) -> Vec<u8> {
        let (bands, _, width) = self.array.shape();
        let sample_type = self.array.sample_type;
        let mut bytes = Vec::with_capacity((end - start) * width * bands * sample_type.size());

        for row in start..end {
            for col in 0..width {
                for band in 0..bands {
                    encode_sample(self.array.data[[band, row, col]], sample_type, &mut bytes);
                }
            }
        }
        bytes
    }
}

/// Saturating cast of one value to the on-disk sample type.
fn encode_sample(value: f64, sample_type: SampleType, out: &mut Vec<u8>) {
    match sample_type {
        SampleType::U8 => out.push(value as u8),
        SampleType::U16 => out.extend_from_slice(&(value as u16).to_ne_bytes()),
        SampleType::I16 => out.extend_from_slice(&(value as i16).to_ne_bytes()),
        SampleType::U32 => out.extend_from_slice(&(value as u32).to_ne_bytes()),
        SampleType::I32 => out.extend_from_slice(&(value as i32).to_ne_bytes()),
        SampleType::F32 => out.extend_from_slice(&(value as f32).to_ne_bytes()),
        SampleType::F64 => out.extend_from_slice(&value.to_ne_bytes()),
    }
}
