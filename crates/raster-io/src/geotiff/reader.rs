//! Windowed GeoTIFF reading.
//!
//! The decoder is kept open for the lifetime of a [`GeoTiffDataset`]; a
//! window read decodes only the strips or tiles that overlap the window and
//! copies the overlapping samples into a band-major array.
//!
//! The tiff decoder only expands single-sample gray chunks, so pixel-interleaved
//! multi-band files are read from the raw chunk bytes instead. Those must be
//! uncompressed, which is what [`GeoTiffWriter`](super::GeoTiffWriter) produces.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use raster_common::{GeoTransform, RasterArray, SampleType, Window};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use super::{parse_gdal_metadata, parse_geokey_directory, parse_nodata, GDAL_METADATA};
use crate::error::{RasterIoError, Result};
use crate::profile::RasterProfile;
use crate::source::RasterSource;

/// An opened GeoTIFF file.
pub struct GeoTiffDataset {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    profile: RasterProfile,
    /// Set for multi-band files.
    raw: Option<RawChunks>,
}

/// Direct access to uncompressed chunk bytes.
struct RawChunks {
    reader: BufReader<File>,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    little_endian: bool,
}

impl RawChunks {
    fn open(path: &Path, decoder: &mut Decoder<BufReader<File>>) -> Result<Self> {
        let compression = decoder
            .find_tag_unsigned::<u16>(Tag::Compression)?
            .unwrap_or(1);
        if compression != 1 {
            return Err(RasterIoError::unsupported(format!(
                "multi-band file with compression {}",
                compression
            )));
        }
        let predictor = decoder.find_tag_unsigned::<u16>(Tag::Predictor)?.unwrap_or(1);
        if predictor != 1 {
            return Err(RasterIoError::unsupported(format!(
                "multi-band file with predictor {}",
                predictor
            )));
        }

        let (offsets_tag, counts_tag) = match decoder.find_tag(Tag::TileOffsets)? {
            Some(_) => (Tag::TileOffsets, Tag::TileByteCounts),
            None => (Tag::StripOffsets, Tag::StripByteCounts),
        };
        let offsets = decoder
            .find_tag_unsigned_vec::<u64>(offsets_tag)?
            .unwrap_or_default();
        let byte_counts = decoder
            .find_tag_unsigned_vec::<u64>(counts_tag)?
            .unwrap_or_default();
        if offsets.len() != byte_counts.len() {
            return Err(RasterIoError::Tiff(format!(
                "{} chunk offsets but {} byte counts",
                offsets.len(),
                byte_counts.len()
            )));
        }

        let file = File::open(path).map_err(|e| RasterIoError::open(path, e))?;
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic)?;
        let little_endian = match &magic {
            b"II" => true,
            b"MM" => false,
            _ => return Err(RasterIoError::Tiff("missing TIFF byte order mark".into())),
        };

        Ok(Self {
            reader,
            offsets,
            byte_counts,
            little_endian,
        })
    }

    fn read_chunk(&mut self, index: usize, sample_type: SampleType) -> Result<Vec<f64>> {
        let (Some(&offset), Some(&len)) = (self.offsets.get(index), self.byte_counts.get(index))
        else {
            return Err(RasterIoError::Tiff(format!("chunk {} is out of range", index)));
        };

        let mut bytes = vec![0u8; len as usize];
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(&mut bytes)?;

        Ok(bytes
            .chunks_exact(sample_type.size())
            .map(|b| decode_sample(b, sample_type, self.little_endian))
            .collect())
    }
}

impl std::fmt::Debug for GeoTiffDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffDataset")
            .field("path", &self.path)
            .field("profile", &self.profile)
            .finish()
    }
}

impl GeoTiffDataset {
    /// Open a GeoTIFF and read its header tags.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RasterIoError::open(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());
        let profile = read_profile(&mut decoder)?;
        let raw = if profile.count > 1 {
            Some(RawChunks::open(path, &mut decoder)?)
        } else {
            None
        };

        debug!(
            path = %path.display(),
            width = profile.width,
            height = profile.height,
            bands = profile.count,
            sample_type = %profile.sample_type,
            "Opened GeoTIFF"
        );

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            profile,
            raw,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode_window(&mut self, window: &Window) -> Result<Array3<f64>> {
        let (width, height) = (self.profile.width, self.profile.height);
        let bands = self.profile.count;
        let (chunk_w, chunk_h) = self.decoder.chunk_dimensions();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        if chunk_w == 0 || chunk_h == 0 {
            return Err(RasterIoError::unsupported("zero-sized strips or tiles"));
        }

        // Strips span the full width; tiles are laid out row by row.
        let chunks_across = width.div_ceil(chunk_w);

        let mut out = Array3::<f64>::zeros((bands, window.height, window.width));
        let win_cols = window.col_range();
        let win_rows = window.row_range();

        let first_cx = win_cols.start / chunk_w;
        let last_cx = (win_cols.end - 1) / chunk_w;
        let first_cy = win_rows.start / chunk_h;
        let last_cy = (win_rows.end - 1) / chunk_h;

        for cy in first_cy..=last_cy {
            for cx in first_cx..=last_cx {
                let index = cy * chunks_across + cx;
                let values = match self.raw.as_mut() {
                    Some(raw) => raw.read_chunk(index, self.profile.sample_type)?,
                    None => decoded_to_f64(self.decoder.read_chunk(index as u32)?),
                };

                let x0 = cx * chunk_w;
                let y0 = cy * chunk_h;
                let data_w = chunk_w.min(width - x0);
                let data_h = chunk_h.min(height - y0);

                // Edge tiles come back either cropped or padded to the full
                // tile size depending on the encoder; accept both.
                let stride = if values.len() >= chunk_w * data_h * bands {
                    chunk_w
                } else if values.len() >= data_w * data_h * bands {
                    data_w
                } else {
                    return Err(RasterIoError::Tiff(format!(
                        "chunk {} holds {} samples, expected at least {}",
                        index,
                        values.len(),
                        data_w * data_h * bands
                    )));
                };

                let cols = win_cols.start.max(x0)..win_cols.end.min(x0 + data_w);
                let rows = win_rows.start.max(y0)..win_rows.end.min(y0 + data_h);

                for row in rows {
                    let src_row = (row - y0) * stride;
                    let dst_row = row - win_rows.start;
                    for col in cols.clone() {
                        let base = (src_row + (col - x0)) * bands;
                        let dst_col = col - win_cols.start;
                        for band in 0..bands {
                            out[[band, dst_row, dst_col]] = values[base + band];
                        }
                    }
                }
            }
        }

        Ok(out)
    }
}

impl RasterSource for GeoTiffDataset {
    fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    fn read_window(&mut self, window: &Window) -> Result<RasterArray> {
        window.ensure_within(self.profile.width, self.profile.height)?;
        let data = self.decode_window(window)?;
        let nodata = self.profile.resolved_nodata()?;

        Ok(RasterArray::new(
            data,
            self.profile.sample_type,
            window.transform(&self.profile.transform),
            self.profile.crs,
            nodata,
        ))
    }
}

fn read_profile(decoder: &mut Decoder<BufReader<File>>) -> Result<RasterProfile> {
    let (width, height) = decoder.dimensions()?;
    let count = decoder
        .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
        .unwrap_or(1) as usize;
    if count == 0 {
        return Err(RasterIoError::unsupported("SamplesPerPixel is 0"));
    }

    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
        .unwrap_or(1);
    if planar != 1 && count > 1 {
        return Err(RasterIoError::unsupported(
            "band-sequential (planar) sample layout",
        ));
    }

    let bits = uniform_tag(decoder, Tag::BitsPerSample, 1)?;
    let format = uniform_tag(decoder, Tag::SampleFormat, 1)?;
    let sample_type = SampleType::from_tiff(bits, format).ok_or_else(|| {
        RasterIoError::unsupported(format!(
            "{}-bit samples with SampleFormat {}",
            bits, format
        ))
    })?;

    let transform = read_transform(decoder)?;

    let crs = decoder
        .find_tag_unsigned_vec::<u16>(Tag::GeoKeyDirectoryTag)?
        .and_then(|keys| parse_geokey_directory(&keys));

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => parse_nodata(&value.into_string()?),
        None => None,
    };

    let metadata = match decoder.find_tag(Tag::Unknown(GDAL_METADATA))? {
        Some(value) => parse_gdal_metadata(&value.into_string()?),
        None => Default::default(),
    };

    Ok(RasterProfile {
        width: width as usize,
        height: height as usize,
        count,
        sample_type,
        transform,
        crs,
        nodata: vec![nodata; count],
        metadata,
    })
}

/// A per-sample tag whose entries must all agree.
fn uniform_tag(decoder: &mut Decoder<BufReader<File>>, tag: Tag, default: u16) -> Result<u16> {
    let values = decoder
        .find_tag_unsigned_vec::<u16>(tag)?
        .unwrap_or_else(|| vec![default]);
    let first = values.first().copied().unwrap_or(default);
    if values.iter().any(|v| *v != first) {
        return Err(RasterIoError::unsupported(format!(
            "mixed {:?} values {:?}",
            tag, values
        )));
    }
    Ok(first)
}

fn read_transform(decoder: &mut Decoder<BufReader<File>>) -> Result<GeoTransform> {
    if let Some(value) = decoder.find_tag(Tag::ModelTransformationTag)? {
        let m = value.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let (i, j, x, y) = (t[0], t[1], t[3], t[4]);
            Ok(GeoTransform::north_up(x - i * s[0], y + j * s[1], s[0], s[1]))
        }
        _ => {
            warn!("GeoTIFF has no usable georeferencing tags; using identity transform");
            Ok(GeoTransform::default())
        }
    }
}

fn decoded_to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

/// One sample of `sample_type` from its on-disk bytes.
fn decode_sample(bytes: &[u8], sample_type: SampleType, little_endian: bool) -> f64 {
    macro_rules! num {
        ($t:ty, $n:literal) => {{
            let mut buf = [0u8; $n];
            buf.copy_from_slice(&bytes[..$n]);
            if little_endian {
                <$t>::from_le_bytes(buf) as f64
            } else {
                <$t>::from_be_bytes(buf) as f64
            }
        }};
    }

    match sample_type {
        SampleType::U8 => f64::from(bytes[0]),
        SampleType::U16 => num!(u16, 2),
        SampleType::I16 => num!(i16, 2),
        SampleType::U32 => num!(u32, 4),
        SampleType::I32 => num!(i32, 4),
        SampleType::F32 => num!(f32, 4),
        SampleType::F64 => num!(f64, 8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sample_byte_orders() {
        assert_eq!(decode_sample(&[0x01, 0x02], SampleType::U16, true), 513.0);
        assert_eq!(decode_sample(&[0x01, 0x02], SampleType::U16, false), 258.0);
        assert_eq!(
            decode_sample(&(-2i16).to_be_bytes(), SampleType::I16, false),
            -2.0
        );
        assert_eq!(
            decode_sample(&312.75f32.to_le_bytes(), SampleType::F32, true),
            312.75
        );
        assert_eq!(decode_sample(&[200], SampleType::U8, true), 200.0);
    }
}
