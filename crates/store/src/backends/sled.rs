//! sled backend
//!
//! sled hands out reference-counted `IVec`s, so fetched values are returned
//! without copying and releasing them never touches the engine. sled does not
//! report why a read returned nothing, so fetch misses stay ambiguous.

use std::path::Path;

use log::debug;

use crate::backend::{Backend, StoreHandle, StoreOptions};
use crate::error::{Result, StoreError};
use crate::value::Value;

/// sled version Cargo resolved, set by the build script
const SLED_VERSION: &str = env!("STORE_SLED_VERSION");

/// Page cache kept by each open tree (16 MB)
const SLED_CACHE_CAPACITY: u64 = 16 * 1024 * 1024;

/// sled backend descriptor
pub struct SledBackend;

impl Backend for SledBackend {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn version(&self) -> String {
        format!("sled {SLED_VERSION}")
    }

    fn open_with(&self, path: &Path, options: &StoreOptions) -> Result<Box<dyn StoreHandle>> {
        Ok(Box::new(SledHandle::open(path, options.create)?))
    }

    fn stores_directory(&self) -> bool {
        true
    }

    /// A sled store is a directory holding its `conf` and `db` files
    fn recognizes(&self, path: &Path) -> bool {
        let is_dir = path.symlink_metadata().is_ok_and(|m| m.is_dir());
        is_dir && path.join("conf").is_file() && path.join("db").is_file()
    }
}

/// An open sled database directory
pub struct SledHandle {
    db: sled::Db,
}

impl SledHandle {
    pub fn open(path: &Path, create: bool) -> Result<Self> {
        if !create && !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }

        let db = sled::Config::new()
            .path(path)
            .cache_capacity(SLED_CACHE_CAPACITY)
            .open()
            .inspect_err(|e| debug!("sled open {}: {e}", path.display()))?;

        Ok(Self { db })
    }
}

impl StoreHandle for SledHandle {
    fn fetch(&mut self, key: &[u8]) -> Option<Value> {
        match self.db.get(key) {
            Ok(value) => value.map(Value::sled),
            Err(e) => {
                debug!("sled get: {e}");
                None
            }
        }
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db
            .insert(key, value)
            .inspect_err(|e| debug!("sled insert: {e}"))?;
        Ok(())
    }

    fn delete_record(&mut self, key: &[u8]) -> Result<()> {
        self.db
            .remove(key)
            .inspect_err(|e| debug!("sled remove: {e}"))?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for SledHandle {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            debug!("sled flush: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_are_engine_owned() {
        let dir = tempdir().unwrap();
        let mut handle = SledHandle::open(&dir.path().join("cache.sled"), true).unwrap();

        handle.store(b"k", b"shared").unwrap();
        let value = handle.fetch(b"k").unwrap();
        assert!(value.is_engine_owned());
        assert_eq!(value, *b"shared");
    }

    #[test]
    fn test_second_open_fails_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sled");

        let first = SledHandle::open(&path, true).unwrap();
        assert!(SledHandle::open(&path, false).is_err());

        drop(first);
        assert!(SledHandle::open(&path, false).is_ok());
    }

    #[test]
    fn test_fetch_errors_are_not_reported() {
        let dir = tempdir().unwrap();
        let handle = SledHandle::open(&dir.path().join("cache.sled"), true).unwrap();

        assert!(!SledBackend.reports_fetch_errors());
        assert!(handle.last_error().is_none());
    }

    #[test]
    fn test_held_store_reports_lock_contention() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sled");

        let _first = SledHandle::open(&path, true).unwrap();
        let err = SledHandle::open(&path, true).err().unwrap();
        assert!(err.is_lock_contention(), "{err}");
    }

    #[test]
    fn test_recognizes_own_directories_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sled");
        drop(SledHandle::open(&path, true).unwrap());
        assert!(SledBackend.stores_directory());
        assert!(SledBackend.recognizes(&path));

        let documents = dir.path().join("Documents");
        std::fs::create_dir(&documents).unwrap();
        std::fs::write(documents.join("thesis.txt"), "chapter one").unwrap();
        assert!(!SledBackend.recognizes(&documents));

        let foreign = dir.path().join("notes.txt");
        std::fs::write(&foreign, "meeting notes").unwrap();
        assert!(!SledBackend.recognizes(&foreign));
    }

    #[test]
    fn test_version() {
        assert!(SledBackend.version().starts_with("sled 0.34"));
    }
}
