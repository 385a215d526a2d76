//! Path utilities for test output.

use std::path::PathBuf;

/// Returns the workspace root directory.
///
/// This is determined by walking up from the current crate's manifest directory
/// until we find the workspace Cargo.toml.
pub fn workspace_root() -> PathBuf {
    // Start from the test-utils crate manifest dir
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Returns the path to a file shipped in the service's `config/` directory.
///
/// # Arguments
///
/// * `name` - The file name (e.g., "tiler.example.yaml")
pub fn service_config_file(name: &str) -> PathBuf {
    workspace_root()
        .join("services")
        .join("tiler")
        .join("config")
        .join(name)
}

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
///
/// # Arguments
///
/// * `prefix` - A prefix for the directory name (e.g., "tiles_")
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        // Should contain Cargo.toml at workspace level
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_service_config_file() {
        let path = service_config_file("tiler.example.yaml");
        assert!(path.to_string_lossy().contains("services"));
        assert!(path.ends_with("config/tiler.example.yaml"));
    }

    #[test]
    fn test_temp_test_dir() {
        let dir = temp_test_dir();
        assert!(dir.path().exists());
        // Dir is cleaned up when dropped
    }

    #[test]
    fn test_temp_test_dir_with_prefix() {
        let dir = temp_test_dir_with_prefix("tiler_test_");
        let path_str = dir.path().to_string_lossy();
        assert!(path_str.contains("tiler_test_"));
    }
}
