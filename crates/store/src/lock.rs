//! Sidecar lock file for engines opened without native locking
//!
//! The lock lives in `<path>-lock-hack`, next to the data file. It is taken
//! exclusively (blocking) before the engine is opened and released, with the
//! file removed, when the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::debug;

use crate::error::Result;

/// Suffix appended to the store path to name the lock file
pub const LOCK_SUFFIX: &str = "-lock-hack";

/// Path of the sidecar lock file for a store at `path`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// An exclusively held sidecar lock
#[derive(Debug)]
pub(crate) struct LockFile {
    path: PathBuf,
    file: File,
}

impl LockFile {
    /// Create the lock file for `store_path` and wait for an exclusive lock
    ///
    /// A holder removes the file when it lets go, so a waiter that wakes up
    /// holding a file no longer at `path` starts over with a fresh one.
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let path = lock_path(store_path);

        loop {
            let file = open_lock_file(&path)?;

            if let Err(e) = file.lock_exclusive() {
                debug!("lock {}: {e}", path.display());
                drop(file);
                remove_lock_file(&path);
                return Err(e.into());
            }

            if is_linked_at(&file, &path) {
                return Ok(Self { path, file });
            }
            debug!("{} was released while waiting, retrying", path.display());
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Unlink first so waiters see the file is gone once they get the lock
        remove_lock_file(&self.path);
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("unlock {}: {e}", self.path.display());
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let file = options.open(path).inspect_err(|e| {
        debug!("open {}: {e}", path.display());
    })?;
    Ok(file)
}

/// True if `file` is still the file found at `path`
#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn remove_lock_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!("remove {}: {e}", path.display());
    }
}
