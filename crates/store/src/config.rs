//! Store configuration
//!
//! Loaded (in order of priority) from:
//! 1. Environment variables (`COSMOS_STORE_BACKEND`, `COSMOS_STORE_PATH`)
//! 2. JSON file (~/.config/cosmos/store.json)
//! 3. Built-in defaults (first compiled-in backend, store in the cache directory)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, StoreOptions};
use crate::error::StoreError;
use crate::registry::{backend_list, get_backend_ops};
use crate::store::Store;

/// Config filename in the Cosmos config directory
const STORE_CONFIG_FILE: &str = "store.json";

/// Environment variable overriding the backend name
pub const BACKEND_ENV: &str = "COSMOS_STORE_BACKEND";

/// Environment variable overriding the store path
pub const PATH_ENV: &str = "COSMOS_STORE_PATH";

/// Which backend to use and where its data lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend name; unset or empty selects the first compiled-in backend
    pub backend: Option<String>,
    /// Store location; defaults to `store.<backend>` in the Cosmos cache directory
    pub path: Option<PathBuf>,
    /// Page size for engines that fix it at creation
    pub page_size: Option<u32>,
    /// Allow creating the store if it doesn't exist
    pub create: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: None,
            path: None,
            page_size: None,
            create: true,
        }
    }
}

impl StoreConfig {
    /// Load the config file if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config = if ::config::config_exists(STORE_CONFIG_FILE) {
            ::config::load_json(STORE_CONFIG_FILE)?
        } else {
            Self::default()
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Load config from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        ::config::load_json_file(path)
    }

    /// Parse config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse store config JSON")
    }

    /// Write this config to store.json in the Cosmos config directory
    pub fn save(&self) -> Result<()> {
        ::config::save_json(STORE_CONFIG_FILE, self)
    }

    /// Write this config to a specific JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        ::config::save_json_file(path, self)
    }

    /// Apply overrides looked up by variable name
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = lookup(BACKEND_ENV) {
            self.backend = Some(backend);
        }
        if let Some(path) = lookup(PATH_ENV).filter(|p| !p.is_empty()) {
            self.path = Some(PathBuf::from(path));
        }
        self
    }

    /// Resolve the configured backend
    pub fn backend(&self) -> std::result::Result<&'static dyn Backend, StoreError> {
        let name = self.backend.as_deref();
        get_backend_ops(name).ok_or_else(|| match name {
            Some(name) if !name.is_empty() => StoreError::UnknownBackend {
                name: name.to_string(),
                available: backend_list(),
            },
            _ => StoreError::NoBackends,
        })
    }

    /// Check that the configured backend exists
    pub fn validate(&self) -> std::result::Result<(), StoreError> {
        self.backend().map(|_| ())
    }

    /// Where the store lives for `backend`
    pub fn store_path(&self, backend: &dyn Backend) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| ::config::cache_path(&format!("store.{}", backend.name())))
    }

    /// Options passed to the backend on open
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            create: self.create,
            page_size: self.page_size,
        }
    }

    /// Resolve the backend and open the store
    pub fn open(&self) -> Result<Store> {
        let backend = self.backend()?;
        let path = self
            .store_path(backend)
            .context("Could not determine store path")?;

        if self.path.is_none() {
            ::config::ensure_cache_dir()?;
        }

        Store::open_or_recreate(backend, &path, &self.options())
            .with_context(|| format!("Failed to open {} store at {}", backend.name(), path.display()))
    }
}
