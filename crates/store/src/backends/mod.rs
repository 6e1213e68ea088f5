//! Storage engine adapters
//!
//! Each adapter is compiled in by its cargo feature and registered in
//! [`crate::registry`].

#[cfg(feature = "lmdb")]
pub mod lmdb;
#[cfg(feature = "redb")]
pub mod redb;
#[cfg(feature = "sled")]
pub mod sled;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "lmdb")]
pub use self::lmdb::{LmdbBackend, LmdbHandle};
#[cfg(feature = "redb")]
pub use self::redb::{RedbBackend, RedbHandle};
#[cfg(feature = "sled")]
pub use self::sled::{SledBackend, SledHandle};
#[cfg(feature = "sqlite")]
pub use self::sqlite::{SqliteBackend, SqliteHandle};
