use crate::{error::DbError, tables::Table};

/// A read-only cursor over a single table, in key order.
pub trait DbCursorRO<T: Table> {
    /// Seeks to the first entry with key `>= key`.
    fn seek(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError>;
    /// Seeks to the entry with key `== key`, or `None` if absent.
    fn seek_exact(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError>;
    /// Advances to the next entry in key order.
    fn next(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError>;
    /// The entry the cursor currently sits on, if any.
    fn current(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError>;
    /// Seeks to the first entry in the table.
    fn first(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError>;
    /// Seeks to the last entry in the table.
    fn last(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError>;
}

/// A read-write cursor, adding in-place mutation to [`DbCursorRO`].
pub trait DbCursorRW<T: Table>: DbCursorRO<T> {
    /// Inserts or overwrites the entry at `key`.
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DbError>;
    /// Appends `(key, value)`, requiring `key` to be strictly greater than the last
    /// key written through this cursor. Used for the Collector's `APPEND` mode and
    /// any other bulk-load fast path.
    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DbError>;
    /// Deletes the entry the cursor currently sits on. Returns whether an entry was
    /// actually removed.
    fn delete_current(&mut self) -> Result<bool, DbError>;
}

/// A read-only cursor over a table whose keys may repeat with distinct values
/// (`redb`/`mdbx`-style "dupsort" tables). No table this core defines uses it,
/// so no `Table` in this workspace implements the companion `DupSort` marker,
/// but the capability is kept in the contract so a future table can opt in
/// without a breaking change.
pub trait DbDupCursorRO<T: Table>: DbCursorRO<T> {
    /// Advances to the next entry sharing the current key, or `None` if exhausted.
    fn next_dup(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError>;
}
