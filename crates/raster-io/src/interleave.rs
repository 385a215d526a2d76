//! External pixel-interleave conversion and atomic placement of artifacts.
//!
//! Composite artifacts are first written under a `_tmp` sibling name. If an
//! interleave tool is configured it converts the temporary file into the
//! final path; otherwise (or if the tool fails) the temporary file is renamed
//! into place.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RasterIoError, Result};

/// An external command invoked as `<program> <args...> <input> <output>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveConverter {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl InterleaveConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `gdal_translate -co INTERLEAVE=PIXEL`.
    pub fn gdal_translate() -> Self {
        Self::new(
            "gdal_translate",
            vec!["-co".to_string(), "INTERLEAVE=PIXEL".to_string()],
        )
    }

    /// Run the tool, failing if it cannot start or exits unsuccessfully.
    pub fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .output()
            .map_err(|e| {
                RasterIoError::Command(format!("failed to run {}: {}", self.program, e))
            })?;

        if !result.status.success() {
            return Err(RasterIoError::Command(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        debug!(
            program = %self.program,
            input = %input.display(),
            output = %output.display(),
            "Interleave conversion succeeded"
        );
        Ok(())
    }
}

/// How an artifact reached its final path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The converter wrote the final file.
    Converted,
    /// No converter configured; the temporary file was renamed.
    Renamed,
    /// The converter failed (message attached); the temporary file was renamed.
    ConversionFailed(String),
}

/// `dir/name.ext` → `dir/name_tmp.ext`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_tmp.{}", stem, ext.to_string_lossy()),
        None => format!("{}_tmp", stem),
    };
    path.with_file_name(name)
}

/// Move a finished temporary artifact to its final path, converting it on
/// the way when a converter is given.
pub fn finalize_artifact(
    converter: Option<&InterleaveConverter>,
    tmp: &Path,
    final_path: &Path,
) -> Result<FinalizeOutcome> {
    let Some(converter) = converter else {
        std::fs::rename(tmp, final_path)?;
        return Ok(FinalizeOutcome::Renamed);
    };

    match converter.convert(tmp, final_path) {
        Ok(()) => {
            std::fs::remove_file(tmp)?;
            Ok(FinalizeOutcome::Converted)
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %final_path.display(),
                "Interleave conversion failed; keeping unconverted artifact"
            );
            std::fs::rename(tmp, final_path)?;
            Ok(FinalizeOutcome::ConversionFailed(e.to_string()))
        }
    }
}
