//! Store façade
//!
//! [`Store`] is what calling code holds. It pairs a backend descriptor with
//! the handle that backend opened, and forwards every operation to it.

use std::fs;
use std::path::Path;

use log::debug;

use crate::backend::{Backend, StoreHandle, StoreOptions};
use crate::error::{Result, StoreError};
use crate::value::Value;

/// An open key/value store
///
/// Dropping a `Store` closes it.
pub struct Store {
    backend: &'static dyn Backend,
    handle: Option<Box<dyn StoreHandle>>,
}

impl Store {
    /// Open the store at `path` with `backend`
    ///
    /// With `create == false` a missing store is an error.
    pub fn open(backend: &'static dyn Backend, path: impl AsRef<Path>, create: bool) -> Result<Self> {
        Self::open_with(backend, path, &StoreOptions::new(create))
    }

    /// Open the store at `path` with explicit options
    pub fn open_with(
        backend: &'static dyn Backend,
        path: impl AsRef<Path>,
        options: &StoreOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let handle = backend
            .open_with(path, options)
            .inspect_err(|e| debug!("{} open {}: {e}", backend.name(), path.display()))?;
        debug!("opened {} store at {}", backend.name(), path.display());

        Ok(Self {
            backend,
            handle: Some(handle),
        })
    }

    /// Open the store, discarding an existing one that cannot be opened
    ///
    /// A store written by an incompatible engine version fails to open; since
    /// its contents are only a cache, it is removed and created again. Only a
    /// store the backend recognizes as its own is removed: anything else at
    /// `path` is left alone and the open error is returned. Lock contention is
    /// returned as-is, the store is in use rather than broken.
    pub fn open_or_recreate(
        backend: &'static dyn Backend,
        path: impl AsRef<Path>,
        options: &StoreOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        match Self::open_with(backend, path, options) {
            Err(e) if !e.is_lock_contention() && backend.recognizes(path) => {
                debug!("removing unusable {} store at {}: {e}", backend.name(), path.display());
                remove_store(backend, path)?;
                Self::open_with(backend, path, options)
            }
            result => result,
        }
    }

    /// The backend this store was opened with
    pub fn backend(&self) -> &'static dyn Backend {
        self.backend
    }

    /// True until [`Store::close`] is called
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Fetch the value stored under `key`
    ///
    /// `None` means the key is absent or the read failed; see
    /// [`Store::last_error`] for backends that tell the two apart.
    pub fn fetch(&mut self, key: &[u8]) -> Option<Value> {
        self.handle.as_mut()?.fetch(key)
    }

    /// Release a value returned by [`Store::fetch`]
    ///
    /// Equivalent to dropping it; `None` is a no-op.
    pub fn free(&self, value: Option<Value>) {
        drop(value);
    }

    /// Insert or replace the value stored under `key`
    pub fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.handle_mut()?.store(key, value)
    }

    /// Remove `key`
    ///
    /// Removing an absent key returns `Ok(())` or [`StoreError::NotFound`],
    /// depending on the backend.
    pub fn delete_record(&mut self, key: &[u8]) -> Result<()> {
        self.handle_mut()?.delete_record(key)
    }

    /// Error behind the most recent `None` from `fetch`
    ///
    /// Always `None` for backends that don't report fetch errors.
    pub fn last_error(&self) -> Option<&StoreError> {
        self.handle.as_ref()?.last_error()
    }

    /// Close the store, releasing every resource `open` acquired
    ///
    /// Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
            debug!("closed {} store", self.backend.name());
        }
    }

    /// Backend name and engine version
    pub fn version(&self) -> String {
        self.backend.version()
    }

    fn handle_mut(&mut self) -> Result<&mut Box<dyn StoreHandle>> {
        self.handle.as_mut().ok_or(StoreError::Closed)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend.name())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Close the store in `slot` and clear the slot
pub fn close(slot: &mut Option<Store>) {
    if let Some(mut store) = slot.take() {
        store.close();
    }
}

fn remove_store(backend: &dyn Backend, path: &Path) -> Result<()> {
    if backend.stores_directory() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
