//! Configuration loader for the tiler.
//!
//! Loads and validates a YAML file holding the logging settings and the
//! pipeline configuration. Supports environment variable substitution
//! using `${VAR}` and `${VAR:-default}` syntax, and `~` in paths.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tile_pipeline::PipelineConfig;

// ============================================================================
// Tiler Configuration (tiler.yaml)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TilerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const VALID_FORMATS: [&str; 2] = ["json", "pretty"];

// ============================================================================
// Loading Functions
// ============================================================================

/// Load and parse a tiler YAML file with environment variable substitution.
pub fn load_tiler_config<P: AsRef<Path>>(path: P) -> Result<TilerConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read tiler config from {:?}", path.as_ref()))?;

    let expanded = expand_env_vars(&content)?;

    let mut config: TilerConfig = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse tiler config from {:?}", path.as_ref()))?;

    expand_paths(&mut config.pipeline);
    validate_tiler_config(&config)?;

    Ok(config)
}

/// Expand a leading `~` in every configured path.
pub fn expand_paths(config: &mut PipelineConfig) {
    config.catalog_dir = expand_path(&config.catalog_dir);
    config.aoi_path = expand_path(&config.aoi_path);
    config.out_dir = expand_path(&config.out_dir);
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            let value = resolve_var_expr(&var_expr)?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax)
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate_logging_config(logging: &LoggingConfig) -> Result<()> {
    anyhow::ensure!(
        VALID_LEVELS.contains(&logging.level.as_str()),
        "Invalid log level: {}. Must be one of: {:?}",
        logging.level,
        VALID_LEVELS
    );
    anyhow::ensure!(
        VALID_FORMATS.contains(&logging.format.as_str()),
        "Invalid log format: {}. Must be one of: {:?}",
        logging.format,
        VALID_FORMATS
    );
    Ok(())
}

fn validate_tiler_config(config: &TilerConfig) -> Result<()> {
    validate_logging_config(&config.logging)?;

    anyhow::ensure!(
        !config.pipeline.catalog_dir.as_os_str().is_empty(),
        "pipeline.catalog_dir cannot be empty"
    );
    anyhow::ensure!(
        !config.pipeline.out_dir.as_os_str().is_empty(),
        "pipeline.out_dir cannot be empty"
    );

    config
        .pipeline
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid pipeline config: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tile_pipeline::{MaskPolarity, NormalizationPolicy};

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("TILER_TEST_VAR", "test_value");
        let result = expand_env_vars("prefix_${TILER_TEST_VAR}_suffix").unwrap();
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("TILER_NONEXISTENT_VAR");
        let result = expand_env_vars("value_${TILER_NONEXISTENT_VAR:-default}_end").unwrap();
        assert_eq!(result, "value_default_end");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("TILER_REQUIRED_VAR");
        assert!(expand_env_vars("${TILER_REQUIRED_VAR}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
    }

    #[test]
    fn test_resolve_var_expr_override_default() {
        std::env::set_var("TILER_SET_VAR", "custom");
        assert_eq!(resolve_var_expr("TILER_SET_VAR:-default").unwrap(), "custom");
    }

    #[test]
    fn test_tilde_paths_are_expanded() {
        let mut config = PipelineConfig {
            catalog_dir: PathBuf::from("~/mosaiced"),
            ..Default::default()
        };
        expand_paths(&mut config);
        assert!(!config.catalog_dir.starts_with("~"));
        assert!(config.catalog_dir.ends_with("mosaiced"));
    }

    #[test]
    fn test_load_full_config() {
        std::env::remove_var("TILER_TEST_OUT");
        let file = write_yaml(
            r#"
logging:
  level: debug
  format: json
pipeline:
  catalog_dir: /data/mosaiced
  aoi_path: /data/aoi_tiles.geojson
  out_dir: ${TILER_TEST_OUT:-/data/processed_tiles}
  excluded_tiles: [396]
  study_area: bc
  products:
    - name: total_biomass
    - name: age
      policy: { type: age_z_score, upper_age: 150, reference_year: 2019, sentinel: -9999.0 }
      template: landcover
    - name: landcover
      policy: { type: categorical_mask }
  mask:
    forest_codes: [81, 210]
    polarity: forest_is_one
  merge:
    enabled: true
"#,
        );

        let config = load_tiler_config(file.path()).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.pipeline.out_dir, PathBuf::from("/data/processed_tiles"));
        assert_eq!(config.pipeline.products.len(), 3);
        assert!(matches!(
            config.pipeline.products[1].policy,
            NormalizationPolicy::AgeZScore { upper_age: 150, .. }
        ));
        assert_eq!(config.pipeline.mask.forest_codes, vec![81, 210]);
        assert_eq!(config.pipeline.mask.polarity, MaskPolarity::ForestIsOne);
        assert!(config.pipeline.is_excluded(396));
        assert!(!config.pipeline.is_excluded(435));
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let file = write_yaml("logging:\n  level: loud\n");
        let err = load_tiler_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_invalid_pipeline_is_rejected() {
        let file = write_yaml("pipeline:\n  study_area: qc\n");
        let err = load_tiler_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown study area"));
    }

    #[test]
    fn test_example_config_loads() {
        let path = test_utils::paths::service_config_file("tiler.example.yaml");
        let config = load_tiler_config(path).unwrap();
        assert!(!config.pipeline.products.is_empty());
    }
}
