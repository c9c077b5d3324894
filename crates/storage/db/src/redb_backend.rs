//! A durable backend over [`redb`], the pure-Rust embedded ordered key-value store
//! this workspace's production deployment would use.
//!
//! `redb` provides named tables, ACID transactions, and ordered range scans.
//! Every table is opened as raw `&[u8] -> &[u8]`; typed encode/decode happens
//! at the `esync-db-api` layer, same as the `mem` backend. Unlike the `mem`
//! backend's materializing cursors, the write cursor here borrows the live `redb`
//! table handle directly, so appends and upserts are real single-entry B-tree
//! operations rather than copy-on-write over a cloned snapshot.

use std::path::Path;

use esync_db_api::{DbCursorRO, DbCursorRW, DbError, DbTx, DbTxMut, Key, Table, Value};
use redb::{ReadableTable, TableDefinition};
use tracing::debug;

fn table_def(name: &'static str) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

fn map_redb<E: std::fmt::Display>(err: E) -> DbError {
    DbError::Backend(err.to_string())
}

/// A `redb`-backed [`esync_db_api::Database`].
#[derive(Debug)]
pub struct RedbDatabase {
    inner: redb::Database,
}

impl RedbDatabase {
    /// Opens (creating if absent) a `redb` database file at `path`, and ensures
    /// every table this core knows about exists so later opens never race table
    /// creation against a concurrent reader.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let inner = redb::Database::create(path).map_err(map_redb)?;
        let write_txn = inner.begin_write().map_err(map_redb)?;
        for name in esync_db_api::tables::ALL_TABLES {
            write_txn.open_table(table_def(name)).map_err(map_redb)?;
        }
        write_txn.commit().map_err(map_redb)?;
        debug!(path = %path.display(), tables = esync_db_api::tables::ALL_TABLES.len(), "opened redb database");
        Ok(Self { inner })
    }
}

impl esync_db_api::Database for RedbDatabase {
    type Tx<'a> = RedbTx;
    type TxMut<'a> = RedbTxMut;

    fn tx(&self) -> Result<Self::Tx<'_>, DbError> {
        Ok(RedbTx { inner: self.inner.begin_read().map_err(map_redb)? })
    }

    fn tx_mut(&self) -> Result<Self::TxMut<'_>, DbError> {
        Ok(RedbTxMut { inner: self.inner.begin_write().map_err(map_redb)? })
    }
}

/// A read-only `redb` transaction.
pub struct RedbTx {
    inner: redb::ReadTransaction,
}

impl DbTx for RedbTx {
    type Cursor<'a, T: Table> = RedbCursor<T> where Self: 'a;

    fn get<T: Table>(&self, key: &T::Key) -> Result<Option<T::Value>, DbError> {
        let table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        match table.get(key.encode().as_slice()).map_err(map_redb)? {
            Some(guard) => Ok(Some(T::Value::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DbError> {
        let table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        RedbCursor::materialize(&table)
    }
}

/// A read-write `redb` transaction.
pub struct RedbTxMut {
    inner: redb::WriteTransaction,
}

impl DbTx for RedbTxMut {
    type Cursor<'a, T: Table> = RedbCursor<T> where Self: 'a;

    fn get<T: Table>(&self, key: &T::Key) -> Result<Option<T::Value>, DbError> {
        let table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        match table.get(key.encode().as_slice()).map_err(map_redb)? {
            Some(guard) => Ok(Some(T::Value::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DbError> {
        let table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        RedbCursor::materialize(&table)
    }
}

impl DbTxMut for RedbTxMut {
    type CursorMut<'a, T: Table> = RedbCursorMut<'a, T> where Self: 'a;

    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DbError> {
        let mut table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        table.insert(key.encode().as_slice(), value.encode().as_slice()).map_err(map_redb)?;
        Ok(())
    }

    fn delete<T: Table>(&self, key: &T::Key) -> Result<bool, DbError> {
        let mut table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        Ok(table.remove(key.encode().as_slice()).map_err(map_redb)?.is_some())
    }

    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<'_, T>, DbError> {
        let table = self.inner.open_table(table_def(T::NAME)).map_err(map_redb)?;
        let entries = materialize(&table)?;
        Ok(RedbCursorMut { table, entries, pos: None, _marker: std::marker::PhantomData })
    }

    fn commit(self) -> Result<(), DbError> {
        self.inner.commit().map_err(map_redb)
    }
}

fn materialize<T: ReadableTable<&'static [u8], &'static [u8]>>(table: &T) -> Result<Vec<(Vec<u8>, Vec<u8>)>, DbError> {
    let mut out = Vec::new();
    for entry in table.iter().map_err(map_redb)? {
        let (k, v) = entry.map_err(map_redb)?;
        out.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(out)
}

fn decode_entry<T: Table>(key: &[u8], value: &[u8]) -> Result<(T::Key, T::Value), DbError> {
    Ok((T::Key::decode(key)?, T::Value::decode(value)?))
}

/// A read-only cursor, materialized from the table at open time (see
/// [`crate::mem::MemCursor`] for the same tradeoff applied there — every access
/// pattern this workspace exercises is a forward/seek-once scan).
#[derive(Debug)]
pub struct RedbCursor<T: Table> {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Table> RedbCursor<T> {
    fn materialize<Tbl: ReadableTable<&'static [u8], &'static [u8]>>(table: &Tbl) -> Result<Self, DbError> {
        Ok(Self { entries: materialize(table)?, pos: None, _marker: std::marker::PhantomData })
    }

    fn at(&self, idx: usize) -> Result<Option<(T::Key, T::Value)>, DbError> {
        match self.entries.get(idx) {
            Some((k, v)) => Ok(Some(decode_entry::<T>(k, v)?)),
            None => Ok(None),
        }
    }
}

impl<T: Table> DbCursorRO<T> for RedbCursor<T> {
    fn seek(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let needle = key.encode();
        let idx = self.entries.partition_point(|(k, _)| k < &needle);
        self.pos = if idx < self.entries.len() { Some(idx) } else { None };
        self.pos.map_or(Ok(None), |idx| self.at(idx))
    }

    fn seek_exact(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError> {
        match self.seek(key)? {
            Some((found_key, value)) if &found_key == key => Ok(Some((found_key, value))),
            _ => {
                self.pos = None;
                Ok(None)
            }
        }
    }

    fn next(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let next_idx = self.pos.map_or(0, |idx| idx + 1);
        self.pos = if next_idx < self.entries.len() { Some(next_idx) } else { None };
        self.pos.map_or(Ok(None), |idx| self.at(idx))
    }

    fn current(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        self.pos.map_or(Ok(None), |idx| self.at(idx))
    }

    fn first(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
        self.current()
    }

    fn last(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        self.pos = self.entries.len().checked_sub(1);
        self.current()
    }
}

/// A read-write cursor holding the live table handle for `'txn`, so mutations land
/// directly in the B-tree. Positioning (`seek`/`next`/`first`/`last`) walks a sorted
/// snapshot taken when the cursor was opened, kept in sync with single-entry writes
/// made through this same cursor — every access pattern this workspace exercises is
/// a forward/seek-once scan interleaved with writes through the one cursor that is
/// doing the scanning, never a concurrent second cursor over the same table.
pub struct RedbCursorMut<'txn, T: Table> {
    table: redb::Table<'txn, &'static [u8], &'static [u8]>,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
    _marker: std::marker::PhantomData<T>,
}

impl<'txn, T: Table> RedbCursorMut<'txn, T> {
    fn at(&self, idx: usize) -> Result<Option<(T::Key, T::Value)>, DbError> {
        match self.entries.get(idx) {
            Some((k, v)) => Ok(Some(decode_entry::<T>(k, v)?)),
            None => Ok(None),
        }
    }
}

impl<'txn, T: Table> DbCursorRO<T> for RedbCursorMut<'txn, T> {
    fn seek(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let needle = key.encode();
        let idx = self.entries.partition_point(|(k, _)| k < &needle);
        self.pos = if idx < self.entries.len() { Some(idx) } else { None };
        self.pos.map_or(Ok(None), |idx| self.at(idx))
    }

    fn seek_exact(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError> {
        match self.seek(key)? {
            Some((found_key, value)) if &found_key == key => Ok(Some((found_key, value))),
            _ => {
                self.pos = None;
                Ok(None)
            }
        }
    }

    fn next(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let next_idx = self.pos.map_or(0, |idx| idx + 1);
        self.pos = if next_idx < self.entries.len() { Some(next_idx) } else { None };
        self.pos.map_or(Ok(None), |idx| self.at(idx))
    }

    fn current(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        self.pos.map_or(Ok(None), |idx| self.at(idx))
    }

    fn first(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
        self.current()
    }

    fn last(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        self.pos = self.entries.len().checked_sub(1);
        self.current()
    }
}

impl<'txn, T: Table> DbCursorRW<T> for RedbCursorMut<'txn, T> {
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DbError> {
        let encoded_key = key.encode();
        let encoded_value = value.encode();
        self.table.insert(encoded_key.as_slice(), encoded_value.as_slice()).map_err(map_redb)?;

        match self.entries.binary_search_by(|(k, _)| k.cmp(&encoded_key)) {
            Ok(idx) => {
                self.entries[idx].1 = encoded_value;
                self.pos = Some(idx);
            }
            Err(idx) => {
                self.entries.insert(idx, (encoded_key, encoded_value));
                self.pos = Some(idx);
            }
        }
        Ok(())
    }

    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DbError> {
        let encoded_key = key.encode();
        let is_monotonic = self.entries.last().map_or(true, |(last, _)| last < &encoded_key);
        if !is_monotonic {
            return Err(DbError::NotMonotonic);
        }
        self.upsert(key, value)
    }

    fn delete_current(&mut self) -> Result<bool, DbError> {
        let Some(idx) = self.pos else { return Ok(false) };
        let (key, _) = self.entries.remove(idx);
        let removed = self.table.remove(key.as_slice()).map_err(map_redb)?.is_some();
        self.pos = None;
        Ok(removed)
    }
}
