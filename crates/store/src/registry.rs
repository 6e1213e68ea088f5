//! Static table of the compiled-in backends
//!
//! The order is fixed at build time; the first entry is the default backend.

use crate::backend::Backend;

#[cfg(feature = "lmdb")]
use crate::backends::LmdbBackend;
#[cfg(feature = "redb")]
use crate::backends::RedbBackend;
#[cfg(feature = "sled")]
use crate::backends::SledBackend;
#[cfg(feature = "sqlite")]
use crate::backends::SqliteBackend;

static BACKENDS: &[&dyn Backend] = &[
    #[cfg(feature = "lmdb")]
    &LmdbBackend,
    #[cfg(feature = "redb")]
    &RedbBackend,
    #[cfg(feature = "sqlite")]
    &SqliteBackend,
    #[cfg(feature = "sled")]
    &SledBackend,
];

/// All compiled-in backends, in registration order
pub fn backends() -> &'static [&'static dyn Backend] {
    BACKENDS
}

/// Look up a backend by name
///
/// `None` or an empty name selects the first compiled-in backend. Otherwise
/// the name must match exactly (case-sensitive).
pub fn get_backend_ops(name: Option<&str>) -> Option<&'static dyn Backend> {
    match name.filter(|name| !name.is_empty()) {
        None => BACKENDS.first().copied(),
        Some(name) => BACKENDS.iter().copied().find(|b| b.name() == name),
    }
}

/// True if `name` selects a compiled-in backend
pub fn is_valid_backend(name: &str) -> bool {
    get_backend_ops(Some(name)).is_some()
}

/// Names of all compiled-in backends, e.g. "lmdb, redb"
pub fn backend_list() -> String {
    BACKENDS
        .iter()
        .map(|b| b.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name and engine version of every compiled-in backend
pub fn backend_versions() -> Vec<(&'static str, String)> {
    BACKENDS.iter().map(|b| (b.name(), b.version())).collect()
}
