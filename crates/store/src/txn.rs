//! Transaction reuse for batching backends
//!
//! Engines that are expensive to commit keep one transaction open across
//! calls. [`TxnState`] tracks it:
//!
//! ```text
//! Uninitialized --read--> Read --write--> Write
//!       \_____________write_____________/
//! ```
//!
//! Reads reuse whatever is active. Writes abort an active read before
//! beginning a write (reads have nothing to commit). Closing commits a write
//! and aborts a read. Any failure leaves the state `Uninitialized`.

use log::debug;

/// Begin/commit/abort primitives of one engine
pub(crate) trait TxnEngine {
    type Read;
    type Write;
    type Error;

    fn begin_read(&self) -> Result<Self::Read, Self::Error>;
    fn begin_write(&self) -> Result<Self::Write, Self::Error>;
    fn commit(&self, txn: Self::Write) -> Result<(), Self::Error>;
    fn abort_read(&self, txn: Self::Read);
    fn abort_write(&self, txn: Self::Write);
}

/// The transaction currently held by a handle
pub(crate) enum TxnState<R, W> {
    Uninitialized,
    Read(R),
    Write(W),
}

/// A transaction able to serve a read
pub(crate) enum ActiveTxn<'a, R, W> {
    Read(&'a R),
    Write(&'a W),
}

impl<R, W> Default for TxnState<R, W> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl<R, W> TxnState<R, W> {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    #[cfg(test)]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read(_))
    }

    #[cfg(test)]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }

    /// Get a transaction for reading, beginning a read one if none is active
    pub fn read<E>(&mut self, engine: &E) -> Result<ActiveTxn<'_, R, W>, E::Error>
    where
        E: TxnEngine<Read = R, Write = W>,
    {
        if self.is_uninitialized() {
            *self = Self::Read(engine.begin_read()?);
        }
        match self {
            Self::Read(txn) => Ok(ActiveTxn::Read(txn)),
            Self::Write(txn) => Ok(ActiveTxn::Write(txn)),
            Self::Uninitialized => unreachable!("read transaction was just begun"),
        }
    }

    /// Get a write transaction, aborting an active read one first
    pub fn write<E>(&mut self, engine: &E) -> Result<&mut W, E::Error>
    where
        E: TxnEngine<Read = R, Write = W>,
    {
        match std::mem::take(self) {
            Self::Write(txn) => *self = Self::Write(txn),
            Self::Read(txn) => {
                engine.abort_read(txn);
                *self = Self::Write(engine.begin_write()?);
            }
            Self::Uninitialized => *self = Self::Write(engine.begin_write()?),
        }
        match self {
            Self::Write(txn) => Ok(txn),
            _ => unreachable!("write transaction was just begun"),
        }
    }

    /// Drop whatever transaction is active without committing it
    ///
    /// Used after a failed operation so the next one starts clean.
    pub fn reset<E>(&mut self, engine: &E)
    where
        E: TxnEngine<Read = R, Write = W>,
    {
        match std::mem::take(self) {
            Self::Read(txn) => engine.abort_read(txn),
            Self::Write(txn) => engine.abort_write(txn),
            Self::Uninitialized => {}
        }
    }

    /// Commit a write transaction or abort a read one
    pub fn finish<E>(&mut self, engine: &E) -> Result<(), E::Error>
    where
        E: TxnEngine<Read = R, Write = W>,
        E::Error: std::fmt::Display,
    {
        match std::mem::take(self) {
            Self::Write(txn) => engine.commit(txn).inspect_err(|e| debug!("commit: {e}")),
            Self::Read(txn) => {
                engine.abort_read(txn);
                Ok(())
            }
            Self::Uninitialized => Ok(()),
        }
    }
}
