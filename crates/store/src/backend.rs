//! Backend trait definitions
//!
//! A backend is a static descriptor for one storage engine. Opening it yields
//! a [`StoreHandle`], the per-session object that owns every engine resource.

use std::path::Path;

use crate::error::{Result, StoreError};
use crate::value::Value;

/// Options passed to [`Backend::open_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Allow initializing a new empty store if none exists
    pub create: bool,
    /// Page size for engines that fix it when the file is created
    pub page_size: Option<u32>,
}

impl StoreOptions {
    pub fn new(create: bool) -> Self {
        Self {
            create,
            page_size: None,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new(true)
    }
}

/// One storage engine, registered once and never mutated
pub trait Backend: Send + Sync {
    /// Name used to select the backend from configuration
    fn name(&self) -> &'static str;

    /// Backend name and engine version, for diagnostics
    fn version(&self) -> String;

    /// Open (or create) the store at `path`
    ///
    /// On error every partially acquired resource has already been released.
    fn open_with(&self, path: &Path, options: &StoreOptions) -> Result<Box<dyn StoreHandle>>;

    /// Open the store at `path` with default options
    fn open(&self, path: &Path, create: bool) -> Result<Box<dyn StoreHandle>> {
        self.open_with(path, &StoreOptions::new(create))
    }

    /// Whether a `None` from `fetch` can be told apart from an engine error
    /// through [`StoreHandle::last_error`]
    fn reports_fetch_errors(&self) -> bool {
        false
    }

    /// Whether the backend coordinates access through a sidecar lock file
    fn uses_lock_file(&self) -> bool {
        false
    }

    /// Whether a store is a directory rather than a single file
    fn stores_directory(&self) -> bool {
        false
    }

    /// True if `path` holds data written by this engine
    ///
    /// Only recognized stores are ever discarded by
    /// [`Store::open_or_recreate`](crate::Store::open_or_recreate).
    fn recognizes(&self, path: &Path) -> bool {
        let _ = path;
        false
    }
}

/// An open session on one backend
///
/// Dropping a handle performs the same teardown as [`StoreHandle::close`].
pub trait StoreHandle: Send {
    /// Fetch the value stored under `key`, `None` if absent or on error
    fn fetch(&mut self, key: &[u8]) -> Option<Value>;

    /// Insert or replace the value stored under `key`
    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; an absent key yields `Ok(())` or [`StoreError::NotFound`]
    fn delete_record(&mut self, key: &[u8]) -> Result<()>;

    /// Error behind the most recent `None` from `fetch`, if the backend tracks it
    fn last_error(&self) -> Option<&StoreError> {
        None
    }

    /// Release every resource acquired by `open`
    fn close(self: Box<Self>);
}

/// True if `path` is a regular file with `magic` at byte `offset`
///
/// Symlinks are not followed.
#[cfg(any(feature = "lmdb", feature = "redb", feature = "sqlite"))]
pub(crate) fn has_magic(path: &Path, offset: u64, magic: &[u8]) -> bool {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    let is_file = path.symlink_metadata().is_ok_and(|m| m.is_file());
    if !is_file {
        return false;
    }

    let mut buf = vec![0; magic.len()];
    let read = File::open(path).and_then(|mut file| {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)
    });
    read.is_ok() && buf == magic
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("name", &self.name()).finish()
    }
}
