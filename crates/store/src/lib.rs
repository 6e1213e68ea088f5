//! Store crate - Backend-agnostic key/value storage for derived-data caches
//!
//! This crate provides one uniform interface over several embedded engines:
//! - Store façade (open, fetch, free, store, delete_record, close, version)
//! - Backend registry selected by cargo features (lmdb, redb, sqlite, sled)
//! - Adapters owning each engine's resources and transaction bookkeeping
//! - Configuration for choosing a backend and store location
//!
//! The store moves opaque byte blobs; callers own the meaning and versioning
//! of what they cache.
//!
//! ```no_run
//! use store::{Store, get_backend_ops};
//!
//! let backend = get_backend_ops(None).expect("no backends compiled in");
//! let mut store = Store::open(backend, "/tmp/headers.db", true)?;
//! store.store(b"alpha", &[1, 2, 3])?;
//! let value = store.fetch(b"alpha");
//! store.free(value);
//! store.close();
//! # Ok::<(), store::StoreError>(())
//! ```

pub mod backend;
pub mod backends;
pub mod config;
pub mod error;
#[cfg(feature = "lmdb")]
pub mod lock;
pub mod registry;
pub mod store;
#[cfg(any(feature = "lmdb", feature = "redb", feature = "sqlite"))]
mod txn;
pub mod value;

pub use backend::{Backend, StoreHandle, StoreOptions};
pub use self::config::StoreConfig;
pub use error::{Result, StoreError};
#[cfg(feature = "lmdb")]
pub use lock::lock_path;
pub use registry::{backend_list, backend_versions, backends, get_backend_ops, is_valid_backend};
pub use store::{Store, close};
pub use value::Value;
