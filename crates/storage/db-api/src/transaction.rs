use crate::{
    cursor::{DbCursorRO, DbCursorRW},
    error::DbError,
    tables::Table,
};

/// A read-only view of the store, live for the duration of one stage invocation (or
/// one Progress Registry lookup outside a stage).
pub trait DbTx: Send + Sync {
    /// The concrete read-only cursor type this backend hands out for `T`, borrowing
    /// from the transaction for as long as the backend needs to (a materializing
    /// backend need not use `'a` at all; a zero-copy one, like the `redb` adapter's
    /// write cursors, borrows the live transaction handle).
    type Cursor<'a, T: Table>: DbCursorRO<T>
    where
        Self: 'a;

    /// Point lookup.
    fn get<T: Table>(&self, key: &T::Key) -> Result<Option<T::Value>, DbError>;
    /// Opens a read-only cursor over `T`.
    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DbError>;
}

/// A read-write transaction: a single transaction spans both a watermark
/// update and its destination-table writes.
pub trait DbTxMut: DbTx {
    /// The concrete read-write cursor type this backend hands out for `T`.
    type CursorMut<'a, T: Table>: DbCursorRW<T>
    where
        Self: 'a;

    /// Inserts or overwrites `(key, value)`.
    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DbError>;
    /// Deletes `key`, reporting whether an entry was present.
    fn delete<T: Table>(&self, key: &T::Key) -> Result<bool, DbError>;
    /// Opens a read-write cursor over `T`.
    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<'_, T>, DbError>;
    /// Commits every write made through this transaction. Consumes the
    /// transaction: there is no way to write after commit, and dropping without
    /// calling this rolls the transaction back (a stage aborts its transaction
    /// on first failure rather than partially committing).
    fn commit(self) -> Result<(), DbError>;
}

/// The store itself: the thing a stage's host opens once at startup and hands a
/// fresh transaction from for every cycle.
pub trait Database: Send + Sync {
    type Tx<'a>: DbTx
    where
        Self: 'a;
    type TxMut<'a>: DbTxMut
    where
        Self: 'a;

    /// Opens a read-only transaction.
    fn tx(&self) -> Result<Self::Tx<'_>, DbError>;
    /// Opens a read-write transaction.
    fn tx_mut(&self) -> Result<Self::TxMut<'_>, DbError>;
}
