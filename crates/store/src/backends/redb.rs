//! redb backend
//!
//! Keeps one transaction open across calls and only commits when the store is
//! closed, so a burst of cache writes costs a single fsync.

use std::fs;
use std::path::Path;

use log::debug;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, TableError,
    WriteTransaction,
};

use crate::backend::{Backend, StoreHandle, StoreOptions, has_magic};
use crate::error::{Result, StoreError, check_lengths};
use crate::txn::{ActiveTxn, TxnEngine, TxnState};
use crate::value::Value;

/// redb version Cargo resolved, set by the build script
const REDB_VERSION: &str = env!("STORE_REDB_VERSION");

/// Magic number at the start of every redb file
const REDB_MAGIC: [u8; 9] = [b'r', b'e', b'd', b'b', 0x1A, 0x0A, 0xA9, 0x0D, 0x0A];

/// redb stores key and value lengths as u32
const REDB_MAX_LEN: usize = u32::MAX as usize;

const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

fn engine(e: impl Into<redb::Error>) -> StoreError {
    StoreError::Redb(e.into())
}

/// redb backend descriptor
pub struct RedbBackend;

impl Backend for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn version(&self) -> String {
        format!("redb {REDB_VERSION}")
    }

    fn open_with(&self, path: &Path, options: &StoreOptions) -> Result<Box<dyn StoreHandle>> {
        Ok(Box::new(RedbHandle::open(path, options.create)?))
    }

    fn reports_fetch_errors(&self) -> bool {
        true
    }

    fn recognizes(&self, path: &Path) -> bool {
        has_magic(path, 0, &REDB_MAGIC)
    }
}

impl TxnEngine for Database {
    type Read = ReadTransaction;
    type Write = WriteTransaction;
    type Error = redb::Error;

    fn begin_read(&self) -> std::result::Result<ReadTransaction, redb::Error> {
        Ok(ReadableDatabase::begin_read(self)?)
    }

    fn begin_write(&self) -> std::result::Result<WriteTransaction, redb::Error> {
        Ok(Database::begin_write(self)?)
    }

    fn commit(&self, txn: WriteTransaction) -> std::result::Result<(), redb::Error> {
        Ok(txn.commit()?)
    }

    fn abort_read(&self, txn: ReadTransaction) {
        drop(txn);
    }

    fn abort_write(&self, txn: WriteTransaction) {
        if let Err(e) = txn.abort() {
            debug!("redb abort: {e}");
        }
    }
}

/// An open redb database
pub struct RedbHandle {
    txn: TxnState<ReadTransaction, WriteTransaction>,
    db: Database,
    last_error: Option<StoreError>,
}

impl RedbHandle {
    pub fn open(path: &Path, create: bool) -> Result<Self> {
        let exists = path.exists();
        if !exists && !create {
            return Err(StoreError::Missing(path.to_path_buf()));
        }

        if exists {
            let db = Database::open(path)
                .inspect_err(|e| debug!("redb open {}: {e}", path.display()))
                .map_err(engine)?;
            return Ok(Self::from_database(db));
        }

        let db = Database::create(path)
            .inspect_err(|e| debug!("redb create {}: {e}", path.display()))
            .map_err(engine)?;

        // A fresh file has no tables yet; create ours so readers can open it
        if let Err(e) = Self::init_tables(&db) {
            debug!("redb init {}: {e}", path.display());
            drop(db);
            if let Err(e) = fs::remove_file(path) {
                debug!("remove {}: {e}", path.display());
            }
            return Err(e);
        }

        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            txn: TxnState::default(),
            db,
            last_error: None,
        }
    }

    fn init_tables(db: &Database) -> Result<()> {
        let txn = db.begin_write().map_err(engine)?;
        txn.open_table(RECORDS).map_err(engine)?;
        txn.commit().map_err(engine)?;
        Ok(())
    }

    fn get(&mut self, key: &[u8]) -> Result<Option<Value>> {
        check_lengths(key, None, REDB_MAX_LEN)?;

        let data = match self.txn.read(&self.db)? {
            ActiveTxn::Read(txn) => match txn.open_table(RECORDS) {
                Ok(table) => table.get(key).map_err(engine)?.map(|g| g.value().to_vec()),
                Err(TableError::TableDoesNotExist(_)) => None,
                Err(e) => return Err(engine(e)),
            },
            ActiveTxn::Write(txn) => {
                let table = txn.open_table(RECORDS).map_err(engine)?;
                let data = table.get(key).map_err(engine)?.map(|g| g.value().to_vec());
                data
            }
        };

        Ok(data.map(Value::owned))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.txn.write(&self.db)?;
        let mut table = txn.open_table(RECORDS).map_err(engine)?;
        table.insert(key, value).map_err(engine)?;
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        let txn = self.txn.write(&self.db)?;
        let mut table = txn.open_table(RECORDS).map_err(engine)?;
        table.remove(key).map_err(engine)?;
        Ok(())
    }

    /// Abort whatever transaction is active after a failed operation
    fn reset(&mut self) {
        self.txn.reset(&self.db);
    }
}

impl StoreHandle for RedbHandle {
    fn fetch(&mut self, key: &[u8]) -> Option<Value> {
        self.last_error = None;
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                debug!("redb get: {e}");
                if !matches!(e, StoreError::KeyTooLarge { .. }) {
                    self.reset();
                }
                self.last_error = Some(e);
                None
            }
        }
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_lengths(key, Some(value), REDB_MAX_LEN)?;
        self.put(key, value).inspect_err(|e| debug!("redb insert: {e}")).map_err(|e| {
            self.reset();
            e
        })
    }

    fn delete_record(&mut self, key: &[u8]) -> Result<()> {
        check_lengths(key, None, REDB_MAX_LEN)?;
        self.remove(key).inspect_err(|e| debug!("redb remove: {e}")).map_err(|e| {
            self.reset();
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

impl Drop for RedbHandle {
    fn drop(&mut self) {
        if let Err(e) = self.txn.finish(&self.db) {
            debug!("redb close: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");

        assert!(RedbHandle::open(&path, false).is_err());

        let handle = RedbHandle::open(&path, true).unwrap();
        drop(handle);

        let handle = RedbHandle::open(&path, false).unwrap();
        drop(handle);
    }

    #[test]
    fn test_transaction_promotion() {
        let dir = tempdir().unwrap();
        let mut handle = RedbHandle::open(&dir.path().join("cache.redb"), true).unwrap();
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
        let path = dir.path().join("cache.redb");

        let mut handle = RedbHandle::open(&path, true).unwrap();
        handle.store(b"k", b"v").unwrap();
        Box::new(handle).close();

        let mut handle = RedbHandle::open(&path, false).unwrap();
        assert_eq!(handle.fetch(b"k").unwrap(), *b"v");
    }

    #[test]
    fn test_second_open_fails_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");

        let first = RedbHandle::open(&path, true).unwrap();
        assert!(RedbHandle::open(&path, false).is_err());

        drop(first);
        assert!(RedbHandle::open(&path, false).is_ok());
    }

    #[test]
    fn test_open_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        fs::write(&path, b"definitely not a redb file").unwrap();

        assert!(RedbHandle::open(&path, true).is_err());
    }

    #[test]
    fn test_recognizes_own_files_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        drop(RedbHandle::open(&path, true).unwrap());
        assert!(RedbBackend.recognizes(&path));

        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, "meeting notes, not a database").unwrap();
        assert!(!RedbBackend.recognizes(&foreign));
        assert!(!RedbBackend.recognizes(dir.path()));
    }

    #[test]
    fn test_version() {
        assert!(RedbBackend.version().starts_with("redb 3."));
    }
}
