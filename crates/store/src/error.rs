//! Error type shared by the façade and every backend adapter

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by store operations
///
/// Engine-native errors are wrapped verbatim so callers can inspect them for
/// diagnostics. Variants for an engine only exist when its feature is enabled.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error outside the engine (lock file, existence checks)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "lmdb")]
    #[error("lmdb: {0}")]
    Lmdb(#[from] heed3::Error),

    #[cfg(feature = "redb")]
    #[error("redb: {0}")]
    Redb(#[from] redb::Error),

    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "sled")]
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    /// The store does not exist and creation was not allowed
    #[error("store does not exist: {}", .0.display())]
    Missing(PathBuf),

    /// Key length does not fit the engine's length type
    #[error("key exceeds maximum size of {max} bytes (got {actual})")]
    KeyTooLarge { max: usize, actual: usize },

    /// Value length does not fit the engine's length type
    #[error("value exceeds maximum size of {max} bytes (got {actual})")]
    ValueTooLarge { max: usize, actual: usize },

    /// The key was not present (only some backends report this on delete)
    #[error("key not found")]
    NotFound,

    /// The store has already been closed
    #[error("store is closed")]
    Closed,

    /// No compiled-in backend has this name
    #[error("unknown store backend '{name}' (available: {available})")]
    UnknownBackend { name: String, available: String },

    /// The crate was built without any backend feature
    #[error("no store backends compiled in")]
    NoBackends,
}

impl StoreError {
    /// True if the error only says the key was absent
    ///
    /// Deleting an absent key yields either `Ok(())` or this, depending on the
    /// backend. Both mean the key is now absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    /// True if the store is held by another handle or process
    pub fn is_lock_contention(&self) -> bool {
        match self {
            StoreError::Io(e) => e.kind() == std::io::ErrorKind::WouldBlock,
            #[cfg(feature = "redb")]
            StoreError::Redb(redb::Error::DatabaseAlreadyOpen) => true,
            #[cfg(feature = "sqlite")]
            StoreError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            // sled 0.34 reports a held lock as an `Other` I/O error whose
            // message starts "could not acquire lock on"; there is no
            // dedicated kind. Covered by the sled backend tests.
            #[cfg(feature = "sled")]
            StoreError::Sled(sled::Error::Io(e)) => match e.kind() {
                std::io::ErrorKind::WouldBlock => true,
                std::io::ErrorKind::Other => e.to_string().starts_with("could not acquire lock"),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Reject keys and values whose length does not fit an engine's length type
///
/// Called before any engine call so nothing is ever truncated.
pub(crate) fn check_lengths(key: &[u8], value: Option<&[u8]>, max: usize) -> Result<()> {
    if key.len() > max {
        return Err(StoreError::KeyTooLarge {
            max,
            actual: key.len(),
        });
    }
    if let Some(value) = value {
        if value.len() > max {
            return Err(StoreError::ValueTooLarge {
                max,
                actual: value.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_lengths_accepts_bounds() {
        assert!(check_lengths(b"abcd", Some(b"wxyz"), 4).is_ok());
        assert!(check_lengths(b"", Some(b""), 0).is_ok());
        assert!(check_lengths(b"abcd", None, 4).is_ok());
    }

    #[test]
    fn test_check_lengths_rejects_key() {
        let err = check_lengths(b"abcde", Some(b"x"), 4).unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLarge { max: 4, actual: 5 }));
    }

    #[test]
    fn test_check_lengths_rejects_value() {
        let err = check_lengths(b"k", Some(b"too long"), 4).unwrap_err();
        assert!(matches!(err, StoreError::ValueTooLarge { max: 4, actual: 8 }));
    }

    #[test]
    fn test_not_found() {
        assert!(StoreError::NotFound.is_not_found());
        assert!(!StoreError::Closed.is_not_found());
    }

    #[test]
    fn test_lock_contention() {
        let busy = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        assert!(StoreError::Io(busy).is_lock_contention());
        assert!(!StoreError::NotFound.is_lock_contention());
        assert!(!StoreError::Missing(PathBuf::from("/tmp/x")).is_lock_contention());
    }

    #[cfg(feature = "sled")]
    #[test]
    fn test_sled_lock_contention() {
        use std::io::{Error, ErrorKind};

        let held = Error::new(ErrorKind::Other, "could not acquire lock on \"/tmp/db\": busy");
        assert!(StoreError::Sled(sled::Error::Io(held)).is_lock_contention());

        let other = Error::new(ErrorKind::Other, "corrupted config");
        assert!(!StoreError::Sled(sled::Error::Io(other)).is_lock_contention());

        let denied = Error::new(ErrorKind::PermissionDenied, "could not acquire lock");
        assert!(!StoreError::Sled(sled::Error::Io(denied)).is_lock_contention());
    }
}
