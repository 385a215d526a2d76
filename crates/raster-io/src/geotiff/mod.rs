//! GeoTIFF encoding of raster arrays.
//!
//! Only the subset of GeoTIFF the tiler needs is handled: strip or tile
//! organised, uncompressed or codec-compressed (decoding), pixel-interleaved
//! samples, an affine transform from either ModelPixelScale + ModelTiepoint
//! or ModelTransformation, an EPSG code from the GeoKey directory, and the
//! GDAL nodata/metadata tags.

mod reader;
mod writer;

use std::collections::BTreeMap;
use std::path::Path;

use raster_common::{Crs, RasterArray};

use crate::error::Result;
use crate::source::RasterSource;

pub use reader::GeoTiffDataset;
pub use writer::GeoTiffWriter;

// GDAL private tag the tiff crate has no name for. The GeoTIFF model tags,
// the GeoKey directory and GDAL_NODATA decode as named `Tag` variants and
// must be looked up by those.
pub(crate) const GDAL_METADATA: u16 = 42112;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Read a whole GeoTIFF into memory.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<RasterArray> {
    let mut dataset = GeoTiffDataset::open(path)?;
    dataset.read_all()
}

/// Write an array as a GeoTIFF with no extra metadata.
pub fn write_geotiff<P: AsRef<Path>>(array: &RasterArray, path: P) -> Result<()> {
    GeoTiffWriter::new(array).write(path)
}

/// GeoKeyDirectory for a CRS.
///
/// Layout: `[version, revision, minor, key_count, (key, location, count, value)*]`.
pub(crate) fn build_geokey_directory(crs: &Crs) -> Vec<u16> {
    let mut keys = vec![1, 1, 0, 3];

    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if crs.geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);

    if crs.geographic {
        keys.extend_from_slice(&[GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, crs.epsg]);
    } else {
        keys.extend_from_slice(&[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, crs.epsg]);
    }

    keys
}

/// EPSG-coded CRS from a GeoKeyDirectory, if it names one inline.
pub(crate) fn parse_geokey_directory(keys: &[u16]) -> Option<Crs> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let mut model_type = None;
    let mut projected = None;
    let mut geographic = None;

    for entry in keys[4..].chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match id {
            GT_MODEL_TYPE_GEO_KEY => model_type = Some(value),
            PROJECTED_CS_TYPE_GEO_KEY if value != USER_DEFINED => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY if value != USER_DEFINED => geographic = Some(value),
            _ => {}
        }
    }

    match (model_type, projected, geographic) {
        (Some(MODEL_TYPE_GEOGRAPHIC), _, Some(epsg)) => Some(Crs {
            epsg,
            geographic: true,
        }),
        (_, Some(epsg), _) => Some(Crs {
            epsg,
            geographic: false,
        }),
        (_, None, Some(epsg)) => Some(Crs {
            epsg,
            geographic: true,
        }),
        _ => None,
    }
}

/// Render metadata items as a GDAL_METADATA XML document.
pub(crate) fn format_gdal_metadata(items: &BTreeMap<String, String>) -> String {
    let mut xml = String::from("<GDALMetadata>\n");
    for (name, value) in items {
        xml.push_str(&format!(
            "  <Item name=\"{}\">{}</Item>\n",
            xml_escape(name),
            xml_escape(value)
        ));
    }
    xml.push_str("</GDALMetadata>");
    xml
}

/// Dataset-level items of a GDAL_METADATA document. Band-level items
/// (those carrying a `sample` attribute) are skipped.
pub(crate) fn parse_gdal_metadata(xml: &str) -> BTreeMap<String, String> {
    let mut items = BTreeMap::new();
    let mut rest = xml;

    while let Some(start) = rest.find("<Item ") {
        rest = &rest[start + "<Item ".len()..];
        let Some(attr_end) = rest.find('>') else { break };
        let attrs = &rest[..attr_end];
        rest = &rest[attr_end + 1..];
        let Some(close) = rest.find("</Item>") else { break };
        let value = &rest[..close];
        rest = &rest[close + "</Item>".len()..];

        if attrs.contains("sample=") {
            continue;
        }
        if let Some(name) = attr_value(attrs, "name") {
            items.insert(xml_unescape(name), xml_unescape(value));
        }
    }

    items
}

fn attr_value<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", key);
    let start = attrs.find(&needle)? + needle.len();
    let len = attrs[start..].find('"')?;
    Some(&attrs[start..start + len])
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn xml_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// GDAL_NODATA text for a value.
pub(crate) fn format_nodata(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", value)
    }
}

/// Parse GDAL_NODATA text; GDAL writes a trailing NUL on some platforms.
pub(crate) fn parse_nodata(text: &str) -> Option<f64> {
    let trimmed = text.trim_matches(char::from(0)).trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse().ok()
}
