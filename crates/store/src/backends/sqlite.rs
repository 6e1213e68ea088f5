//! SQLite backend storing records in a single two-column table
//!
//! Like redb, the handle keeps a transaction open across calls
//! (`BEGIN DEFERRED` for reads, `BEGIN IMMEDIATE` for writes) and commits it
//! on close.

use std::fs;
use std::path::Path;

use log::debug;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::backend::{Backend, StoreHandle, StoreOptions, has_magic};
use crate::error::{Result, StoreError, check_lengths};
use crate::txn::{TxnEngine, TxnState};
use crate::value::Value;

/// Header string every SQLite database file starts with
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// SQLite binds blob lengths as a C int
const SQLITE_MAX_LEN: usize = i32::MAX as usize;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        key BLOB PRIMARY KEY NOT NULL,
        value BLOB NOT NULL
    ) WITHOUT ROWID;
"#;

/// SQLite backend descriptor
pub struct SqliteBackend;

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn version(&self) -> String {
        format!("sqlite {}", rusqlite::version())
    }

    fn open_with(&self, path: &Path, options: &StoreOptions) -> Result<Box<dyn StoreHandle>> {
        Ok(Box::new(SqliteHandle::open(path, options)?))
    }

    fn reports_fetch_errors(&self) -> bool {
        true
    }

    fn recognizes(&self, path: &Path) -> bool {
        has_magic(path, 0, SQLITE_MAGIC)
    }
}

impl TxnEngine for Connection {
    type Read = ();
    type Write = ();
    type Error = rusqlite::Error;

    fn begin_read(&self) -> rusqlite::Result<()> {
        self.execute_batch("BEGIN DEFERRED")
    }

    fn begin_write(&self) -> rusqlite::Result<()> {
        self.execute_batch("BEGIN IMMEDIATE")
    }

    fn commit(&self, _txn: ()) -> rusqlite::Result<()> {
        self.execute_batch("COMMIT")
    }

    fn abort_read(&self, _txn: ()) {
        rollback(self);
    }

    fn abort_write(&self, _txn: ()) {
        rollback(self);
    }
}

fn rollback(conn: &Connection) {
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        debug!("sqlite rollback: {e}");
    }
}

/// An open SQLite database
pub struct SqliteHandle {
    txn: TxnState<(), ()>,
    conn: Connection,
    last_error: Option<StoreError>,
}

impl SqliteHandle {
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
        // The page size can only be chosen before the file is first written
        let creating = !path.exists();
        if creating && !options.create {
            return Err(StoreError::Missing(path.to_path_buf()));
        }

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if creating {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(path, flags)
            .inspect_err(|e| debug!("sqlite open {}: {e}", path.display()))?;

        if let Err(e) = Self::init(&conn, creating, options.page_size) {
            debug!("sqlite init {}: {e}", path.display());
            drop(conn);
            if creating {
                if let Err(e) = fs::remove_file(path) {
                    debug!("remove {}: {e}", path.display());
                }
            }
            return Err(e.into());
        }

        Ok(Self {
            txn: TxnState::default(),
            conn,
            last_error: None,
        })
    }

    fn init(conn: &Connection, creating: bool, page_size: Option<u32>) -> rusqlite::Result<()> {
        if creating {
            if let Some(page_size) = page_size {
                conn.pragma_update(None, "page_size", page_size)?;
            }
        }
        conn.execute_batch(SCHEMA)
    }

    /// Page size of the database file
    pub fn page_size(&self) -> Result<u32> {
        Ok(self
            .conn
            .pragma_query_value(None, "page_size", |row| row.get(0))?)
    }

    fn get(&mut self, key: &[u8]) -> Result<Option<Value>> {
        check_lengths(key, None, SQLITE_MAX_LEN)?;
        self.txn.read(&self.conn)?;

        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM records WHERE key = ?1")?;
        let data: Option<Vec<u8>> = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(data.map(Value::owned))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.txn.write(&self.conn)?;
        self.conn
            .prepare_cached("INSERT OR REPLACE INTO records (key, value) VALUES (?1, ?2)")?
            .execute(params![key, value])?;
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.txn.write(&self.conn)?;
        self.conn
            .prepare_cached("DELETE FROM records WHERE key = ?1")?
            .execute([key])?;
        Ok(())
    }

    fn reset(&mut self) {
        self.txn.reset(&self.conn);
    }
}

impl StoreHandle for SqliteHandle {
    fn fetch(&mut self, key: &[u8]) -> Option<Value> {
        self.last_error = None;
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                debug!("sqlite select: {e}");
                if !matches!(e, StoreError::KeyTooLarge { .. }) {
                    self.reset();
                }
                self.last_error = Some(e);
                None
            }
        }
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_lengths(key, Some(value), SQLITE_MAX_LEN)?;
        self.put(key, value).map_err(|e| {
            debug!("sqlite insert: {e}");
            self.reset();
            e
        })
    }

    fn delete_record(&mut self, key: &[u8]) -> Result<()> {
        check_lengths(key, None, SQLITE_MAX_LEN)?;
        self.remove(key).map_err(|e| {
            debug!("sqlite delete: {e}");
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

impl Drop for SqliteHandle {
    fn drop(&mut self) {
        if let Err(e) = self.txn.finish(&self.conn) {
            debug!("sqlite close: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_page_size_only_on_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let handle = SqliteHandle::open(&path, &StoreOptions::new(true).page_size(8192)).unwrap();
        assert_eq!(handle.page_size().unwrap(), 8192);
        drop(handle);

        // An existing file keeps the page size it was created with
        let handle = SqliteHandle::open(&path, &StoreOptions::new(true).page_size(1024)).unwrap();
        assert_eq!(handle.page_size().unwrap(), 8192);
    }

    #[test]
    fn test_open_requires_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let err = SqliteHandle::open(&path, &StoreOptions::new(false)).err().unwrap();
        assert!(matches!(err, StoreError::Missing(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        fs::write(&path, vec![0xAB; 4096]).unwrap();

        assert!(SqliteHandle::open(&path, &StoreOptions::new(true)).is_err());
        // Not ours to remove: the file existed before the open
        assert!(path.exists());
    }

    #[test]
    fn test_transaction_promotion() {
        let dir = tempdir().unwrap();
        let mut handle =
            SqliteHandle::open(&dir.path().join("cache.sqlite"), &StoreOptions::default()).unwrap();

        assert!(handle.fetch(b"k").is_none());
        assert!(handle.txn.is_read());

        handle.store(b"k", b"").unwrap();
        assert!(handle.txn.is_write());
        assert!(handle.fetch(b"k").unwrap().is_empty());
    }

    #[test]
    fn test_close_commits_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let mut handle = SqliteHandle::open(&path, &StoreOptions::default()).unwrap();
        handle.store(b"k", b"v").unwrap();
        handle.delete_record(b"absent").unwrap();
        Box::new(handle).close();

        let mut handle = SqliteHandle::open(&path, &StoreOptions::new(false)).unwrap();
        assert_eq!(handle.fetch(b"k").unwrap(), *b"v");
    }

    #[test]
    fn test_recognizes_own_files_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        drop(SqliteHandle::open(&path, &StoreOptions::default()).unwrap());
        assert!(SqliteBackend.recognizes(&path));

        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, "meeting notes, not a database").unwrap();
        assert!(!SqliteBackend.recognizes(&foreign));
        assert!(!SqliteBackend.recognizes(dir.path()));
    }
}
