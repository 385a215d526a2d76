//! Value normalization: raw pixel values → canonical 8-bit (or z-score) values.
//!
//! Every 8-bit policy reserves 0 for nodata and maps valid pixels into
//! `1..=255`, monotonically in the source magnitude. Input that breaks the
//! assumptions a policy relies on is rejected, never clamped.

use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Zip};
use raster_common::{is_nodata_value, RasterArray, RasterError, RasterResult};
use serde::{Deserialize, Serialize};

/// Nodata value of every 8-bit product.
pub const NODATA_BYTE: u8 = 0;

pub const DEFAULT_REFERENCE_YEAR: i32 = 2019;
pub const DEFAULT_UPPER_AGE: u32 = 150;
pub const DEFAULT_ZSCORE_SENTINEL: f32 = -9999.0;
pub const DEFAULT_TOP_K: usize = 5;

fn default_reference_year() -> i32 {
    DEFAULT_REFERENCE_YEAR
}

fn default_upper_age() -> u32 {
    DEFAULT_UPPER_AGE
}

fn default_sentinel() -> f32 {
    DEFAULT_ZSCORE_SENTINEL
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// How a product's raw values are transformed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// Per-band min/max onto `1..=255`.
    #[default]
    Linear,
    /// Year of establishment → age, fixed `[0, upper_age]` range onto `1..=255`.
    AgeFixed {
        #[serde(default = "default_reference_year")]
        reference_year: i32,
        #[serde(default = "default_upper_age")]
        upper_age: u32,
    },
    /// Year of establishment → clamped age → z-score (`f32`).
    AgeZScore {
        #[serde(default = "default_reference_year")]
        reference_year: i32,
        #[serde(default = "default_upper_age")]
        upper_age: u32,
        #[serde(default = "default_sentinel")]
        sentinel: f32,
    },
    /// Integer percentages `0..=100` onto `0..=255`.
    Percentage,
    /// Land cover codes → binary forest mask.
    CategoricalMask,
    /// Species probability layers → top-K + rest composite.
    SpeciesTopK {
        #[serde(default = "default_top_k")]
        k: usize,
    },
}

impl NormalizationPolicy {
    pub fn age_fixed() -> Self {
        Self::AgeFixed {
            reference_year: DEFAULT_REFERENCE_YEAR,
            upper_age: DEFAULT_UPPER_AGE,
        }
    }

    pub fn age_zscore() -> Self {
        Self::AgeZScore {
            reference_year: DEFAULT_REFERENCE_YEAR,
            upper_age: DEFAULT_UPPER_AGE,
            sentinel: DEFAULT_ZSCORE_SENTINEL,
        }
    }

    pub fn species_top_k() -> Self {
        Self::SpeciesTopK { k: DEFAULT_TOP_K }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::AgeFixed { .. } => "age_fixed",
            Self::AgeZScore { .. } => "age_z_score",
            Self::Percentage => "percentage",
            Self::CategoricalMask => "categorical_mask",
            Self::SpeciesTopK { .. } => "species_top_k",
        }
    }

    /// Whether the policy reads a companion template raster.
    pub fn uses_template(&self) -> bool {
        matches!(self, Self::AgeFixed { .. } | Self::AgeZScore { .. })
    }
}

/// Apply a value policy to a raster read from the catalogue.
///
/// `template_nodata` marks pixels that are nodata in the companion template
/// raster; only the age policies use it. Mask and species policies are not
/// value normalizations and are rejected.
pub fn normalize(
    array: &RasterArray,
    policy: &NormalizationPolicy,
    template_nodata: Option<ArrayView2<'_, bool>>,
) -> RasterResult<RasterArray> {
    let nodata = array.nodata;
    let data = array.data.view();

    let byte = |out: Array3<u8>| {
        RasterArray::from_u8(
            out,
            array.transform,
            array.crs,
            Some(f64::from(NODATA_BYTE)),
        )
    };

    match *policy {
        NormalizationPolicy::Linear => Ok(byte(normalize_linear(data, nodata)?)),
        NormalizationPolicy::Percentage => Ok(byte(normalize_percentage(data, nodata)?)),
        NormalizationPolicy::AgeFixed {
            reference_year,
            upper_age,
        } => Ok(byte(normalize_age_fixed(
            data,
            nodata,
            template_nodata,
            reference_year,
            upper_age,
        )?)),
        NormalizationPolicy::AgeZScore {
            reference_year,
            upper_age,
            sentinel,
        } => {
            let out = age_zscore(
                data,
                nodata,
                template_nodata,
                reference_year,
                upper_age,
                sentinel,
            )?;
            Ok(RasterArray::from_f32(
                out,
                array.transform,
                array.crs,
                Some(f64::from(sentinel)),
            ))
        }
        NormalizationPolicy::CategoricalMask | NormalizationPolicy::SpeciesTopK { .. } => {
            Err(RasterError::invalid_data(format!(
                "{} is not a value normalization",
                policy.name()
            )))
        }
    }
}

// ============================================================================
// Linear min/max
// ============================================================================

/// Per band: `1 + 254 * (x - min) / (max - min)`, truncated; nodata and NaN → 0.
pub fn normalize_linear(data: ArrayView3<'_, f64>, nodata: Option<f64>) -> RasterResult<Array3<u8>> {
    let mut out = Array3::<u8>::zeros(data.raw_dim());

    for (index, (band, mut out_band)) in data
        .outer_iter()
        .zip(out.outer_iter_mut())
        .enumerate()
    {
        let (min, max) = valid_range(band.iter().copied(), |v| !is_nodata_value(v, nodata))
            .ok_or_else(|| {
                RasterError::degenerate_range(format!("band {} has no valid pixels", index + 1))
            })?;
        if !min.is_finite() || !max.is_finite() {
            return Err(RasterError::data_assumption(format!(
                "band {} holds non-finite values",
                index + 1
            )));
        }
        if min == max {
            return Err(RasterError::degenerate_range(format!(
                "band {} has constant value {}",
                index + 1,
                min
            )));
        }

        let span = max - min;
        Zip::from(&mut out_band).and(&band).for_each(|o, &v| {
            if !is_nodata_value(v, nodata) {
                *o = scale_to_byte((v - min) / span);
            }
        });
    }

    Ok(out)
}

/// `ratio` in `[0, 1]` → `1..=255`.
#[inline]
fn scale_to_byte(ratio: f64) -> u8 {
    (1.0 + ratio * 254.0) as u8
}

fn valid_range<I, F>(values: I, is_valid: F) -> Option<(f64, f64)>
where
    I: Iterator<Item = f64>,
    F: Fn(f64) -> bool,
{
    values.filter(|v| is_valid(*v)).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

// ============================================================================
// Age policies
// ============================================================================

/// Derived ages plus the validity of each pixel.
struct AgeField {
    ages: Array3<f64>,
    valid: Array3<bool>,
}

fn derive_ages(
    data: ArrayView3<'_, f64>,
    nodata: Option<f64>,
    template_nodata: Option<ArrayView2<'_, bool>>,
    reference_year: i32,
) -> RasterResult<AgeField> {
    let (_, rows, cols) = data.dim();
    let reference = f64::from(reference_year);

    let mut valid = data.mapv(|v| !is_nodata_value(v, nodata));
    if let Some(template) = template_nodata {
        if template.dim() != (rows, cols) {
            return Err(RasterError::ShapeMismatch {
                expected: (rows, cols),
                found: template.dim(),
                source_name: "age template".to_string(),
            });
        }
        for mut band in valid.outer_iter_mut() {
            Zip::from(&mut band)
                .and(&template)
                .for_each(|v, &masked| *v = *v && !masked);
        }
    }

    let ages = data.mapv(|v| reference - v.floor());
    Ok(AgeField { ages, valid })
}

/// Years of establishment → ages scaled over the fixed range `[0, upper_age]`.
///
/// The youngest valid stand must be exactly 0 years old and the oldest,
/// after capping at `upper_age`, exactly `upper_age`; anything else means
/// the input is not what the fixed scaling assumes.
pub fn normalize_age_fixed(
    data: ArrayView3<'_, f64>,
    nodata: Option<f64>,
    template_nodata: Option<ArrayView2<'_, bool>>,
    reference_year: i32,
    upper_age: u32,
) -> RasterResult<Array3<u8>> {
    if upper_age == 0 {
        return Err(RasterError::degenerate_range("upper age must be positive"));
    }
    let upper = f64::from(upper_age);
    let AgeField { ages, valid } = derive_ages(data, nodata, template_nodata, reference_year)?;

    let (min_age, max_age) = valid_range(
        ages.iter().zip(valid.iter()).filter(|(_, ok)| **ok).map(|(a, _)| *a),
        |_| true,
    )
    .ok_or_else(|| RasterError::data_assumption("age layer has no valid pixels"))?;

    if min_age != 0.0 {
        return Err(RasterError::data_assumption(format!(
            "minimum derived age is {} (expected 0)",
            min_age
        )));
    }
    let capped_max = max_age.min(upper);
    if capped_max != upper {
        return Err(RasterError::data_assumption(format!(
            "maximum capped age is {} (expected {})",
            capped_max, upper_age
        )));
    }

    let mut out = Array3::<u8>::zeros(ages.raw_dim());
    Zip::from(&mut out)
        .and(&ages)
        .and(&valid)
        .for_each(|o, &age, &ok| {
            if ok {
                *o = scale_to_byte(age.min(upper) / upper);
            }
        });
    Ok(out)
}

/// Years of establishment → capped ages → `(age - mean) / stddev`.
///
/// Uses the population standard deviation over valid pixels; nodata and
/// template-nodata pixels take `sentinel`.
pub fn age_zscore(
    data: ArrayView3<'_, f64>,
    nodata: Option<f64>,
    template_nodata: Option<ArrayView2<'_, bool>>,
    reference_year: i32,
    upper_age: u32,
    sentinel: f32,
) -> RasterResult<Array3<f32>> {
    let upper = f64::from(upper_age);
    let AgeField { ages, valid } = derive_ages(data, nodata, template_nodata, reference_year)?;
    let ages = ages.mapv(|a| a.clamp(0.0, upper));

    let (count, sum) = ages
        .iter()
        .zip(valid.iter())
        .filter(|(_, ok)| **ok)
        .fold((0usize, 0.0), |(n, s), (a, _)| (n + 1, s + a));
    if count == 0 {
        return Err(RasterError::degenerate_range("age layer has no valid pixels"));
    }
    let mean = sum / count as f64;
    let variance = ages
        .iter()
        .zip(valid.iter())
        .filter(|(_, ok)| **ok)
        .map(|(a, _)| (a - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return Err(RasterError::degenerate_range(format!(
            "age standard deviation is {}",
            std
        )));
    }

    let mut out = Array3::<f32>::from_elem(ages.raw_dim(), sentinel);
    Zip::from(&mut out)
        .and(&ages)
        .and(&valid)
        .for_each(|o, &age, &ok| {
            if ok {
                *o = ((age - mean) / std) as f32;
            }
        });
    Ok(out)
}

// ============================================================================
// Percentages
// ============================================================================

/// `0 → 0`, else `1 + (p - 1) * 254 / 99` with integer division.
/// Inputs above 100 are treated as 100.
#[inline]
pub fn percentage_to_byte(p: u8) -> u8 {
    let p = u32::from(p.min(100));
    if p == 0 {
        0
    } else {
        (1 + (p - 1) * 254 / 99) as u8
    }
}

/// Apply [`percentage_to_byte`] per pixel per band; nodata → 0.
///
/// Every valid value must be an integer in `[0, 100]`.
pub fn normalize_percentage(
    data: ArrayView3<'_, f64>,
    nodata: Option<f64>,
) -> RasterResult<Array3<u8>> {
    let is_percentage = |v: f64| v.fract() == 0.0 && (0.0..=100.0).contains(&v);

    if let Some(bad) = data
        .iter()
        .find(|v| !is_nodata_value(**v, nodata) && !is_percentage(**v))
    {
        return Err(RasterError::data_assumption(format!(
            "{} is not an integer percentage",
            bad
        )));
    }

    Ok(data.mapv(|v| {
        if is_nodata_value(v, nodata) {
            NODATA_BYTE
        } else {
            percentage_to_byte(v as u8)
        }
    }))
}

/// Pixels that are nodata in every band of a template raster.
pub fn nodata_mask(template: &RasterArray) -> ndarray::Array2<bool> {
    template
        .data
        .map_axis(Axis(0), |pixel| pixel.iter().all(|v| template.is_nodata(*v)))
}
