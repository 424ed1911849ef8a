#![allow(clippy::module_name_repetitions)]
//! Canonical file paths under the data directory.
//!
//! Every function takes the data directory explicitly so that runs can be
//! pointed elsewhere with `--data-dir`. [`default_data_dir`] is the
//! project's own `data/`.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`, falling back to the
/// current directory if the manifest is not two levels below the root.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the default `data/` directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the address → geocode cache.
#[must_use]
pub fn geocode_cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join("geocode_cache.csv")
}

/// Returns the path of the geocoded crime record output.
#[must_use]
pub fn output_path(data_dir: &Path) -> PathBuf {
    data_dir.join("geocoded_crimes.csv")
}

/// Returns the `quota/` directory holding per-service ledgers.
#[must_use]
pub fn quota_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("quota")
}

/// Returns the daily request ledger path for a geocoding service.
#[must_use]
pub fn quota_ledger_path(data_dir: &Path, service_id: &str) -> PathBuf {
    quota_dir(data_dir).join(format!("{service_id}.json"))
}

/// Returns the path where a source's raw GeoJSON download is kept.
#[must_use]
pub fn snapshot_path(data_dir: &Path, source_id: &str) -> PathBuf {
    data_dir.join("sources").join(format!("{source_id}.geojson"))
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_the_data_dir() {
        let data = Path::new("/tmp/cville");
        assert_eq!(geocode_cache_path(data), data.join("geocode_cache.csv"));
        assert_eq!(output_path(data), data.join("geocoded_crimes.csv"));
        assert_eq!(
            quota_ledger_path(data, "google"),
            data.join("quota").join("google.json")
        );
        assert_eq!(
            snapshot_path(data, "charlottesville"),
            data.join("sources").join("charlottesville.geojson")
        );
    }

    #[test]
    fn default_data_dir_is_under_project_root() {
        assert!(default_data_dir().starts_with(project_root()));
        assert!(project_root().join("Cargo.toml").exists());
    }
}
