//! Configuration and cache locations for Cosmos applications
//!
//! Config files live in the shared Cosmos config directory (~/.config/cosmos/);
//! rebuildable data such as key/value caches live in the Cosmos cache
//! directory (~/.cache/cosmos/ on Linux).
//!
//! Call [`init`] at application startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Directory name shared by every Cosmos application
const APP_DIR: &str = "cosmos";

/// Initialize the Cosmos config directory.
///
/// Creates ~/.config/cosmos/ if it doesn't exist.
/// Call this once at application startup.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the Cosmos config directory (~/.config/cosmos/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to a config file within the Cosmos config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Get the Cosmos cache directory (~/.cache/cosmos/)
pub fn cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to an entry within the Cosmos cache directory
pub fn cache_path(name: &str) -> Option<PathBuf> {
    cache_dir().map(|p| p.join(name))
}

/// Load and parse a JSON config file from the Cosmos config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the Cosmos config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the Cosmos config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    ensure_dir(dir, "config")
}

/// Ensure the Cosmos cache directory exists
pub fn ensure_cache_dir() -> Result<PathBuf> {
    let dir = cache_dir().context("Could not determine cache directory")?;
    ensure_dir(dir, "cache")
}

fn ensure_dir(dir: PathBuf, kind: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {} directory: {}", kind, dir.display()))?;
    Ok(dir)
}

/// Save a value as JSON to a config file in the Cosmos config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    save_json_file(&dir.join(filename), value)
}

/// Save a value as JSON to an arbitrary path
pub fn save_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_config_path() {
        let path = config_path("test.json");
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("cosmos/test.json"));
    }

    #[test]
    fn test_cache_path() {
        if let Some(path) = cache_path("store.lmdb") {
            assert!(path.ends_with("cosmos/store.lmdb"));
        }
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut value = BTreeMap::new();
        value.insert("backend".to_string(), "redb".to_string());
        save_json_file(&path, &value).unwrap();

        let loaded: BTreeMap<String, String> = load_json_file(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<BTreeMap<String, String>> = load_json_file(&dir.path().join("nope.json"));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
