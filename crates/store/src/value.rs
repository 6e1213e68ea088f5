//! Values returned by `fetch`
//!
//! A [`Value`] owns whatever the backend handed out. Dropping it runs the
//! matching release path, so there is no way to free it through the wrong
//! allocator.

use std::fmt;
use std::ops::Deref;

/// Bytes fetched from a store
pub struct Value {
    repr: Repr,
}

enum Repr {
    /// Copied out of the engine into a heap buffer
    Owned(Vec<u8>),
    /// Reference-counted buffer owned by sled; dropping only releases our reference
    #[cfg(feature = "sled")]
    Sled(sled::IVec),
}

impl Value {
    /// Wrap a buffer copied out of an engine
    pub fn owned(data: Vec<u8>) -> Self {
        Self {
            repr: Repr::Owned(data),
        }
    }

    #[cfg(feature = "sled")]
    pub(crate) fn sled(data: sled::IVec) -> Self {
        Self {
            repr: Repr::Sled(data),
        }
    }

    /// True if the bytes still belong to the engine rather than to this value
    pub fn is_engine_owned(&self) -> bool {
        match &self.repr {
            Repr::Owned(_) => false,
            #[cfg(feature = "sled")]
            Repr::Sled(_) => true,
        }
    }

    /// Copy (or move) the bytes into a `Vec`
    pub fn into_vec(self) -> Vec<u8> {
        match self.repr {
            Repr::Owned(data) => data,
            #[cfg(feature = "sled")]
            Repr::Sled(data) => data.to_vec(),
        }
    }
}

impl Deref for Value {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.repr {
            Repr::Owned(data) => data,
            #[cfg(feature = "sled")]
            Repr::Sled(data) => data,
        }
    }
}

impl AsRef<[u8]> for Value {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl PartialEq<[u8]> for Value {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

impl PartialEq<&[u8]> for Value {
    fn eq(&self, other: &&[u8]) -> bool {
        **self == **other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Value {
    fn eq(&self, other: &[u8; N]) -> bool {
        **self == other[..]
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("len", &self.len())
            .field("engine_owned", &self.is_engine_owned())
            .finish()
    }
}
