//! Band compositing: stacking single-band artifacts and top-K species
//! selection.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use ndarray::{s, Array3, ArrayView3, Axis};
use raster_common::{resolve_nodata, RasterArray, RasterError, RasterResult};
use raster_io::{
    finalize_artifact, tmp_path, FinalizeOutcome, GeoTiffDataset, GeoTiffWriter,
    InterleaveConverter, RasterProfile, RasterSource,
};
use tracing::{debug, info};

use crate::error::Result;

/// Metadata item listing the selected species, in band order.
pub const TOP_SPECIES_KEY: &str = "top_species";

/// A multi-band artifact assembled from single-band sources.
#[derive(Debug, Clone)]
pub struct CompositeArtifact {
    pub path: PathBuf,
    pub profile: RasterProfile,
    pub sources: Vec<PathBuf>,
    pub outcome: FinalizeOutcome,
}

/// Band 1 of each source, in order, as one array georeferenced like the
/// first source.
///
/// Bands are copied verbatim, so every source must share the first one's
/// sample type and nodata value.
pub fn stack_arrays(sources: &[(String, RasterArray)]) -> RasterResult<RasterArray> {
    let (_, first) = sources
        .first()
        .ok_or_else(|| RasterError::missing_input("no sources to stack"))?;
    let (rows, cols) = (first.height(), first.width());

    for (name, array) in sources {
        if (array.height(), array.width()) != (rows, cols) {
            return Err(RasterError::ShapeMismatch {
                expected: (rows, cols),
                found: (array.height(), array.width()),
                source_name: name.clone(),
            });
        }
        if array.sample_type != first.sample_type {
            return Err(RasterError::invalid_data(format!(
                "{} holds {} samples but the composite is {}",
                name, array.sample_type, first.sample_type
            )));
        }
    }
    let nodata: Vec<Option<f64>> = sources.iter().map(|(_, a)| a.nodata).collect();
    let nodata = resolve_nodata(&nodata)?;

    let mut data = Array3::<f64>::zeros((sources.len(), rows, cols));
    for (mut out, (_, array)) in data.outer_iter_mut().zip(sources) {
        out.assign(&array.band(0)?);
    }

    Ok(RasterArray::new(
        data,
        first.sample_type,
        first.transform,
        first.crs,
        nodata,
    ))
}

/// Stack the first band of every file in `paths` into `dest`.
///
/// Every input must exist before anything is opened. The composite is
/// written to a `_tmp` sibling and then moved (or converted) into place, so
/// `dest` never holds a partial file.
pub fn stack(
    paths: &[PathBuf],
    dest: &Path,
    converter: Option<&InterleaveConverter>,
) -> Result<CompositeArtifact> {
    if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
        return Err(RasterError::missing_input(missing.display().to_string()).into());
    }

    let mut sources = Vec::with_capacity(paths.len());
    let mut expected = None;
    for path in paths {
        // Each dataset is dropped at the end of its iteration.
        let mut dataset = GeoTiffDataset::open(path)?;
        let shape = dataset.profile().shape();
        match expected {
            None => expected = Some(shape),
            Some(first) if first != shape => {
                return Err(RasterError::ShapeMismatch {
                    expected: first,
                    found: shape,
                    source_name: path.display().to_string(),
                }
                .into());
            }
            Some(_) => {}
        }
        let array = dataset.read_all()?;
        sources.push((path.display().to_string(), array));
    }

    let merged = stack_arrays(&sources)?;
    drop(sources);

    let tmp = tmp_path(dest);
    if let Err(e) = GeoTiffWriter::new(&merged).write(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    let outcome = finalize_artifact(converter, &tmp, dest)?;

    info!(
        path = %dest.display(),
        bands = merged.bands(),
        outcome = ?outcome,
        "Wrote composite"
    );

    Ok(CompositeArtifact {
        path: dest.to_path_buf(),
        profile: RasterProfile::for_array(&merged),
        sources: paths.to_vec(),
        outcome,
    })
}

/// Result of [`select_top_species`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesSelection {
    /// `k + 1` bands: the top-K species followed by the sum of the rest.
    pub bands: Array3<f64>,
    /// Names of the selected species, in band order.
    pub top_species: Vec<String>,
}

impl SpeciesSelection {
    /// Value of the `top_species` metadata item.
    pub fn metadata_value(&self) -> String {
        self.top_species.join(",")
    }
}

/// Keep the `k` species with the highest non-zero mean as bands `1..=k`
/// (ties go to the lower band index, missing slots stay zero) and put the
/// per-pixel sum of every other band into band `k + 1`.
///
/// Every output value must lie in `[0, 255]`.
pub fn select_top_species(
    stack: ArrayView3<'_, f64>,
    names: &[String],
    k: usize,
) -> RasterResult<SpeciesSelection> {
    let (bands, rows, cols) = stack.dim();
    if names.len() != bands {
        return Err(RasterError::invalid_data(format!(
            "{} species names for {} bands",
            names.len(),
            bands
        )));
    }
    if k == 0 {
        return Err(RasterError::invalid_data("k must be positive"));
    }

    let means: Vec<f64> = stack
        .outer_iter()
        .map(|band| {
            let (n, sum) = band
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
            if n == 0 {
                0.0
            } else {
                sum / n as f64
            }
        })
        .collect();

    let mut ranked: Vec<usize> = (0..bands).filter(|&i| means[i] > 0.0).collect();
    // Stable sort: equal means keep ascending band order.
    ranked.sort_by(|&a, &b| means[b].partial_cmp(&means[a]).unwrap_or(Ordering::Equal));
    ranked.truncate(k);

    let mut out = Array3::<f64>::zeros((k + 1, rows, cols));
    for (slot, &index) in ranked.iter().enumerate() {
        out.index_axis_mut(Axis(0), slot)
            .assign(&stack.index_axis(Axis(0), index));
    }
    {
        let mut rest = out.index_axis_mut(Axis(0), k);
        for index in (0..bands).filter(|i| !ranked.contains(i)) {
            rest += &stack.slice(s![index, .., ..]);
        }
    }

    if let Some(bad) = out.iter().find(|v| !(0.0..=255.0).contains(*v)) {
        return Err(RasterError::data_assumption(format!(
            "species composite value {} outside [0, 255]",
            bad
        )));
    }

    let top_species: Vec<String> = ranked.iter().map(|&i| names[i].clone()).collect();
    debug!(top_species = ?top_species, "Selected top species");

    Ok(SpeciesSelection {
        bands: out,
        top_species,
    })
}
