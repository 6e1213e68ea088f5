//! LMDB backend using heed3
//!
//! The environment is a single memory-mapped file (`NO_SUB_DIR`) opened with
//! `NO_LOCK`, so LMDB keeps no lock table of its own. Exclusive access is
//! coordinated through the sidecar lock file instead, which also keeps the
//! on-disk footprint to the data file plus `<path>-lock-hack`.
//!
//! Like redb and SQLite, the handle keeps one transaction open across calls
//! and commits it on close.

use std::path::Path;

use heed3::types::Bytes;
use heed3::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn, WithoutTls};
use log::debug;

use crate::backend::{Backend, StoreHandle, StoreOptions, has_magic};
use crate::error::{Result, StoreError, check_lengths};
use crate::lock::LockFile;
use crate::txn::{ActiveTxn, TxnEngine, TxnState};
use crate::value::Value;

/// Maximum size of the memory map (2 GiB on 32-bit targets)
#[cfg(target_pointer_width = "32")]
const LMDB_DB_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// Maximum size of the memory map (100 GiB)
#[cfg(not(target_pointer_width = "32"))]
const LMDB_DB_SIZE: usize = 100 * 1024 * 1024 * 1024;

/// Largest key LMDB accepts with its default build settings
const LMDB_MAX_KEY_SIZE: usize = 511;

/// Magic number at the start of each meta page, stored in native byte order
const LMDB_MAGIC: u32 = 0xBEEF_C0DE;

/// Offset of the magic number: it follows the page header
/// (page number, padding, flags and bounds)
const LMDB_MAGIC_OFFSET: u64 = std::mem::size_of::<usize>() as u64 + 8;

/// LMDB backend descriptor
pub struct LmdbBackend;

impl Backend for LmdbBackend {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    fn version(&self) -> String {
        let v = heed3::lmdb_version();
        format!("lmdb {}.{}.{}", v.major, v.minor, v.patch)
    }

    fn open_with(&self, path: &Path, options: &StoreOptions) -> Result<Box<dyn StoreHandle>> {
        Ok(Box::new(LmdbHandle::open(path, options.create)?))
    }

    fn reports_fetch_errors(&self) -> bool {
        true
    }

    fn uses_lock_file(&self) -> bool {
        true
    }

    fn recognizes(&self, path: &Path) -> bool {
        has_magic(path, LMDB_MAGIC_OFFSET, &LMDB_MAGIC.to_ne_bytes())
    }
}

/// An environment with a stable heap address
///
/// Write transactions borrow the environment they were begun on. Boxing it
/// keeps that borrow valid while the handle itself moves.
struct PinnedEnv(Box<Env<WithoutTls>>);

impl TxnEngine for PinnedEnv {
    type Read = RoTxn<'static, WithoutTls>;
    type Write = RwTxn<'static>;
    type Error = heed3::Error;

    fn begin_read(&self) -> heed3::Result<Self::Read> {
        // Owns a reference to the environment, no borrow involved
        let env: Env<WithoutTls> = (*self.0).clone();
        env.static_read_txn()
    }

    fn begin_write(&self) -> heed3::Result<Self::Write> {
        let txn = self.0.write_txn()?;
        // SAFETY: the transaction borrows the boxed `Env`, whose address never
        // changes. `LmdbHandle` declares `txn` before `env`, and finishes or
        // resets the state in `Drop`, so no transaction outlives the box.
        Ok(unsafe { std::mem::transmute::<RwTxn<'_>, RwTxn<'static>>(txn) })
    }

    fn commit(&self, txn: Self::Write) -> heed3::Result<()> {
        txn.commit()
    }

    fn abort_read(&self, txn: Self::Read) {
        drop(txn);
    }

    fn abort_write(&self, txn: Self::Write) {
        txn.abort();
    }
}

/// An open LMDB environment
///
/// Fields drop in order: the transaction ends before the environment closes,
/// and the environment closes before the lock is released.
pub struct LmdbHandle {
    txn: TxnState<RoTxn<'static, WithoutTls>, RwTxn<'static>>,
    db: Database<Bytes, Bytes>,
    env: PinnedEnv,
    last_error: Option<StoreError>,
    _lock: LockFile,
}

impl LmdbHandle {
    pub fn open(path: &Path, create: bool) -> Result<Self> {
        if !create && !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }

        // Dropped on every early return below, which unlocks and removes it
        let lock = LockFile::acquire(path)?;
        debug!("locked {}", lock.path().display());

        let env = unsafe {
            let mut options = EnvOpenOptions::new().read_txn_without_tls();
            options.map_size(LMDB_DB_SIZE);
            options.flags(EnvFlags::NO_SUB_DIR | EnvFlags::NO_LOCK);
            options.open(path)
        }
        .inspect_err(|e| debug!("mdb_env_open {}: {e}", path.display()))?;

        let mut wtxn = env
            .write_txn()
            .inspect_err(|e| debug!("mdb_txn_begin: {e}"))?;
        let db = env
            .create_database(&mut wtxn, None)
            .inspect_err(|e| debug!("mdb_dbi_open: {e}"))?;
        wtxn.commit()?;

        Ok(Self {
            txn: TxnState::default(),
            db,
            env: PinnedEnv(Box::new(env)),
            last_error: None,
            _lock: lock,
        })
    }

    fn get(&mut self, key: &[u8]) -> Result<Option<Value>> {
        check_lengths(key, None, LMDB_MAX_KEY_SIZE)?;
        // The bytes live in the map only as long as the transaction, so copy them out
        let data = match self.txn.read(&self.env)? {
            ActiveTxn::Read(txn) => self.db.get(txn, key)?.map(<[u8]>::to_vec),
            ActiveTxn::Write(txn) => self.db.get(txn, key)?.map(<[u8]>::to_vec),
        };
        Ok(data.map(Value::owned))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.txn.write(&self.env)?;
        self.db.put(txn, key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let txn = self.txn.write(&self.env)?;
        if !self.db.delete(txn, key)? {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.txn.reset(&self.env);
    }
}

impl StoreHandle for LmdbHandle {
    fn fetch(&mut self, key: &[u8]) -> Option<Value> {
        self.last_error = None;
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                debug!("mdb_get: {e}");
                if !matches!(e, StoreError::KeyTooLarge { .. }) {
                    self.reset();
                }
                self.last_error = Some(e);
                None
            }
        }
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_lengths(key, None, LMDB_MAX_KEY_SIZE)?;
        self.put(key, value).map_err(|e| {
            debug!("mdb_put: {e}");
            self.reset();
            e
        })
    }

    fn delete_record(&mut self, key: &[u8]) -> Result<()> {
        check_lengths(key, None, LMDB_MAX_KEY_SIZE)?;
        // An absent key leaves the write transaction usable
        self.delete(key).map_err(|e| {
            if !e.is_not_found() {
                debug!("mdb_del: {e}");
                self.reset();
            }
            e
        })
    }

    fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for LmdbHandle {
    fn drop(&mut self) {
        if let Err(e) = self.txn.finish(&self.env) {
            debug!("mdb_txn_commit: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::lock_path;
    use tempfile::tempdir;

    #[test]
    fn test_open_requires_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.lmdb");

        let err = LmdbHandle::open(&path, false).err().unwrap();
        assert!(matches!(err, StoreError::Missing(_)));
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn test_lock_file_lifetime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.lmdb");

        let handle = LmdbHandle::open(&path, true).unwrap();
        assert!(path.is_file());
        assert!(lock_path(&path).exists());

        Box::new(handle).close();
        assert!(path.is_file());
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn test_failed_open_removes_lock_file() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a NO_SUB_DIR environment
        let path = dir.path().join("not-a-file");
        std::fs::create_dir(&path).unwrap();

        assert!(LmdbHandle::open(&path, true).is_err());
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn test_transaction_promotion() {
        let dir = tempdir().unwrap();
        let mut handle = LmdbHandle::open(&dir.path().join("cache.lmdb"), true).unwrap();
        assert!(handle.txn.is_uninitialized());

        assert!(handle.fetch(b"k").is_none());
        assert!(handle.txn.is_read());

        handle.store(b"k", b"v").unwrap();
        assert!(handle.txn.is_write());

        // Reads are served from the write transaction
        assert_eq!(handle.fetch(b"k").unwrap(), *b"v");
        assert!(handle.txn.is_write());
    }

    #[test]
    fn test_close_commits_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.lmdb");

        let mut handle = LmdbHandle::open(&path, true).unwrap();
        handle.store(b"k", b"v").unwrap();
        handle.store(b"gone", b"x").unwrap();
        handle.delete_record(b"gone").unwrap();
        Box::new(handle).close();

        let mut handle = LmdbHandle::open(&path, false).unwrap();
        assert_eq!(handle.fetch(b"k").unwrap(), *b"v");
        assert!(handle.fetch(b"gone").is_none());
    }

    #[test]
    fn test_delete_absent_keeps_transaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.lmdb");
        let mut handle = LmdbHandle::open(&path, true).unwrap();

        handle.store(b"k", b"v").unwrap();
        let err = handle.delete_record(b"missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(handle.txn.is_write());

        Box::new(handle).close();
        let mut handle = LmdbHandle::open(&path, false).unwrap();
        assert_eq!(handle.fetch(b"k").unwrap(), *b"v");
    }

    #[test]
    fn test_oversized_key_is_rejected() {
        let dir = tempdir().unwrap();
        let mut handle = LmdbHandle::open(&dir.path().join("cache.lmdb"), true).unwrap();
        let key = vec![b'k'; LMDB_MAX_KEY_SIZE + 1];

        let err = handle.store(&key, b"value").unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLarge { .. }));

        assert!(handle.fetch(&key).is_none());
        assert!(matches!(
            handle.last_error(),
            Some(StoreError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn test_fetch_miss_clears_last_error() {
        let dir = tempdir().unwrap();
        let mut handle = LmdbHandle::open(&dir.path().join("cache.lmdb"), true).unwrap();
        let key = vec![b'k'; LMDB_MAX_KEY_SIZE + 1];

        assert!(handle.fetch(&key).is_none());
        assert!(handle.last_error().is_some());

        assert!(handle.fetch(b"absent").is_none());
        assert!(handle.last_error().is_none());
    }

    #[test]
    fn test_recognizes_own_files_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.lmdb");
        Box::new(LmdbHandle::open(&path, true).unwrap()).close();
        assert!(LmdbBackend.recognizes(&path));

        let foreign = dir.path().join("notes.txt");
        std::fs::write(&foreign, "meeting notes, not a database").unwrap();
        assert!(!LmdbBackend.recognizes(&foreign));
        assert!(!LmdbBackend.recognizes(dir.path()));
    }

    #[test]
    fn test_version() {
        assert!(LmdbBackend.version().starts_with("lmdb 0."));
    }
}
