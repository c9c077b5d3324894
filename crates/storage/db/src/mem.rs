//! A `BTreeMap`-backed in-process store.
//!
//! Used by every unit and integration test in this workspace: no file I/O, fully
//! deterministic, and cheap enough to snapshot-clone per transaction rather than
//! implement real MVCC. Not meant for production use — see [`crate::redb`] for the
//! durable backend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use esync_db_api::{DbCursorRO, DbCursorRW, DbError, DbTx, DbTxMut, Key, Table, Value};

type RawTable = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Clone, Default)]
struct Store {
    tables: HashMap<&'static str, RawTable>,
}

impl Store {
    fn table(&self, name: &'static str) -> &RawTable {
        // Tables are implicitly created on first write; an unwritten table reads as
        // empty rather than an error, so every watermark and table defaults to
        // 0/empty when absent.
        static EMPTY: std::sync::OnceLock<RawTable> = std::sync::OnceLock::new();
        self.tables.get(name).unwrap_or_else(|| EMPTY.get_or_init(RawTable::new))
    }

    fn table_mut(&mut self, name: &'static str) -> &mut RawTable {
        self.tables.entry(name).or_default()
    }
}

fn poison<T>(_: std::sync::PoisonError<T>) -> DbError {
    DbError::Backend("mem store mutex poisoned".to_string())
}

/// An in-process, `BTreeMap`-backed [`esync_db_api::Database`].
#[derive(Debug, Clone, Default)]
pub struct MemDatabase {
    inner: Arc<Mutex<Store>>,
}

impl MemDatabase {
    /// Creates a fresh, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl esync_db_api::Database for MemDatabase {
    type Tx<'a> = MemTx;
    type TxMut<'a> = MemTxMut;

    fn tx(&self) -> Result<Self::Tx<'_>, DbError> {
        let guard = self.inner.lock().map_err(poison)?;
        Ok(MemTx { snapshot: guard.clone() })
    }

    fn tx_mut(&self) -> Result<Self::TxMut<'_>, DbError> {
        let guard = self.inner.lock().map_err(poison)?;
        Ok(MemTxMut { db: self.inner.clone(), working: Arc::new(Mutex::new(guard.clone())) })
    }
}

/// A read-only transaction: an owned snapshot of every table at the moment it was
/// opened.
#[derive(Debug)]
pub struct MemTx {
    snapshot: Store,
}

impl DbTx for MemTx {
    type Cursor<'a, T: Table> = MemCursor<T> where Self: 'a;

    fn get<T: Table>(&self, key: &T::Key) -> Result<Option<T::Value>, DbError> {
        get_from(self.snapshot.table(T::NAME), key)
    }

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DbError> {
        Ok(MemCursor::new(self.snapshot.table(T::NAME)))
    }
}

/// A read-write transaction: a private working copy of the store, applied to the
/// shared state atomically on [`DbTxMut::commit`]. Dropping without committing
/// discards every write, so an aborted stage never partially commits.
#[derive(Debug)]
pub struct MemTxMut {
    db: Arc<Mutex<Store>>,
    working: Arc<Mutex<Store>>,
}

impl DbTx for MemTxMut {
    type Cursor<'a, T: Table> = MemCursor<T> where Self: 'a;

    fn get<T: Table>(&self, key: &T::Key) -> Result<Option<T::Value>, DbError> {
        let guard = self.working.lock().map_err(poison)?;
        get_from::<T>(guard.table(T::NAME), key)
    }

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DbError> {
        let guard = self.working.lock().map_err(poison)?;
        Ok(MemCursor::new(guard.table(T::NAME)))
    }
}

impl DbTxMut for MemTxMut {
    type CursorMut<'a, T: Table> = MemCursorMut<T> where Self: 'a;

    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DbError> {
        let mut cursor = self.cursor_write::<T>()?;
        cursor.upsert(key, value)
    }

    fn delete<T: Table>(&self, key: &T::Key) -> Result<bool, DbError> {
        let mut cursor = self.cursor_write::<T>()?;
        match cursor.seek_exact(key)? {
            Some(_) => cursor.delete_current(),
            None => Ok(false),
        }
    }

    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<'_, T>, DbError> {
        Ok(MemCursorMut::new(self.working.clone(), T::NAME))
    }

    fn commit(self) -> Result<(), DbError> {
        let working = self.working.lock().map_err(poison)?.clone();
        let mut guard = self.db.lock().map_err(poison)?;
        *guard = working;
        Ok(())
    }
}

fn get_from<T: Table>(table: &RawTable, key: &T::Key) -> Result<Option<T::Value>, DbError> {
    match table.get(&key.encode()) {
        Some(bytes) => Ok(Some(T::Value::decode(bytes)?)),
        None => Ok(None),
    }
}

fn decode_entry<T: Table>(key: &[u8], value: &[u8]) -> Result<(T::Key, T::Value), DbError> {
    Ok((T::Key::decode(key)?, T::Value::decode(value)?))
}

/// A read-only cursor materialized from a table snapshot at open time.
///
/// Every access pattern this workspace exercises (Collector loads, stage forward
/// scans, unwind range deletes) is a forward-only or single-seek traversal, so a
/// sorted owned copy behaves identically to a live backend cursor for our
/// purposes, without the lifetime-entangled borrow a zero-copy cursor would need.
#[derive(Debug)]
pub struct MemCursor<T: Table> {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Table> MemCursor<T> {
    fn new(table: &RawTable) -> Self {
        Self { entries: table.iter().map(|(k, v)| (k.clone(), v.clone())).collect(), pos: None, _marker: std::marker::PhantomData }
    }

    fn at(&self, idx: usize) -> Result<Option<(T::Key, T::Value)>, DbError> {
        match self.entries.get(idx) {
            Some((k, v)) => Ok(Some(decode_entry::<T>(k, v)?)),
            None => Ok(None),
        }
    }
}

impl<T: Table> DbCursorRO<T> for MemCursor<T> {
    fn seek(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let needle = key.encode();
        let idx = self.entries.partition_point(|(k, _)| k < &needle);
        self.pos = if idx < self.entries.len() { Some(idx) } else { None };
        match self.pos {
            Some(idx) => self.at(idx),
            None => Ok(None),
        }
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
        let next_idx = match self.pos {
            Some(idx) => idx + 1,
            None => 0,
        };
        self.pos = if next_idx < self.entries.len() { Some(next_idx) } else { None };
        match self.pos {
            Some(idx) => self.at(idx),
            None => Ok(None),
        }
    }

    fn current(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        match self.pos {
            Some(idx) => self.at(idx),
            None => Ok(None),
        }
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

/// A read-write cursor operating on the owning transaction's shared working copy.
///
/// Unlike [`MemCursor`], this cannot materialize a snapshot up front: writes made
/// through one cursor must be visible to a cursor opened afterwards within the same
/// transaction. It instead holds the transaction's backing `Arc` directly and
/// re-reads from it on every call; this workspace never holds two write cursors
/// over the same table concurrently, so the brief per-call lock is uncontended.
#[derive(Debug)]
pub struct MemCursorMut<T: Table> {
    db: Arc<Mutex<Store>>,
    table: &'static str,
    pos: Option<Vec<u8>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Table> MemCursorMut<T> {
    fn new(db: Arc<Mutex<Store>>, table: &'static str) -> Self {
        Self { db, table, pos: None, _marker: std::marker::PhantomData }
    }

    fn with_store<R>(&self, f: impl FnOnce(&Store) -> R) -> Result<R, DbError> {
        let guard = self.db.lock().map_err(poison)?;
        Ok(f(&guard))
    }

    fn with_store_mut<R>(&self, f: impl FnOnce(&mut Store) -> R) -> Result<R, DbError> {
        let mut guard = self.db.lock().map_err(poison)?;
        Ok(f(&mut guard))
    }
}

impl<T: Table> DbCursorRO<T> for MemCursorMut<T> {
    fn seek(&mut self, key: &T::Key) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let needle = key.encode();
        let found = self.with_store(|store| store.table(self.table).range(needle.clone()..).next().map(|(k, v)| (k.clone(), v.clone())))?;
        self.pos = found.as_ref().map(|(k, _)| k.clone());
        found.map(|(k, v)| decode_entry::<T>(&k, &v)).transpose()
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
        let start = self.pos.clone();
        let found = self.with_store(|store| {
            let table = store.table(self.table);
            match &start {
                Some(key) => table.range((std::ops::Bound::Excluded(key.clone()), std::ops::Bound::Unbounded)).next().map(|(k, v)| (k.clone(), v.clone())),
                None => table.iter().next().map(|(k, v)| (k.clone(), v.clone())),
            }
        })?;
        self.pos = found.as_ref().map(|(k, _)| k.clone());
        found.map(|(k, v)| decode_entry::<T>(&k, &v)).transpose()
    }

    fn current(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let Some(key) = self.pos.clone() else { return Ok(None) };
        let found = self.with_store(|store| store.table(self.table).get(&key).cloned())?;
        found.map(|v| decode_entry::<T>(&key, &v)).transpose()
    }

    fn first(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let found = self.with_store(|store| store.table(self.table).iter().next().map(|(k, v)| (k.clone(), v.clone())))?;
        self.pos = found.as_ref().map(|(k, _)| k.clone());
        found.map(|(k, v)| decode_entry::<T>(&k, &v)).transpose()
    }

    fn last(&mut self) -> Result<Option<(T::Key, T::Value)>, DbError> {
        let found = self.with_store(|store| store.table(self.table).iter().next_back().map(|(k, v)| (k.clone(), v.clone())))?;
        self.pos = found.as_ref().map(|(k, _)| k.clone());
        found.map(|(k, v)| decode_entry::<T>(&k, &v)).transpose()
    }
}

impl<T: Table> DbCursorRW<T> for MemCursorMut<T> {
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DbError> {
        let encoded_key = key.encode();
        let encoded_value = value.encode();
        self.with_store_mut(|store| {
            store.table_mut(self.table).insert(encoded_key.clone(), encoded_value);
        })?;
        self.pos = Some(encoded_key);
        Ok(())
    }

    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DbError> {
        let encoded_key = key.encode();
        let is_monotonic = self.with_store(|store| store.table(self.table).keys().next_back().map_or(true, |last| last < &encoded_key))?;
        if !is_monotonic {
            return Err(DbError::NotMonotonic);
        }
        self.upsert(key, value)
    }

    fn delete_current(&mut self) -> Result<bool, DbError> {
        let Some(key) = self.pos.clone() else { return Ok(false) };
        let removed = self.with_store_mut(|store| store.table_mut(self.table).remove(&key).is_some())?;
        self.pos = None;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esync_db_api::{Database, SyncStageProgress};

    #[test]
    fn put_then_commit_is_visible_to_new_transactions() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        tx.put::<SyncStageProgress>(b"BlockHashes".to_vec(), 7).unwrap();
        tx.commit().unwrap();

        let tx2 = db.tx().unwrap();
        assert_eq!(tx2.get::<SyncStageProgress>(&b"BlockHashes".to_vec()).unwrap(), Some(7));
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        tx.put::<SyncStageProgress>(b"Senders".to_vec(), 3).unwrap();
        drop(tx);

        let tx2 = db.tx().unwrap();
        assert_eq!(tx2.get::<SyncStageProgress>(&b"Senders".to_vec()).unwrap(), None);
    }

    #[test]
    fn append_rejects_non_monotone_keys() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        let mut cursor = tx.cursor_write::<SyncStageProgress>().unwrap();
        cursor.append(b"b".to_vec(), 1).unwrap();
        assert!(matches!(cursor.append(b"a".to_vec(), 1), Err(DbError::NotMonotonic)));
    }

    #[test]
    fn cursor_seek_and_next_walk_in_order() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        tx.put::<SyncStageProgress>(b"a".to_vec(), 1).unwrap();
        tx.put::<SyncStageProgress>(b"b".to_vec(), 2).unwrap();
        tx.put::<SyncStageProgress>(b"c".to_vec(), 3).unwrap();
        tx.commit().unwrap();

        let tx2 = db.tx().unwrap();
        let mut cursor = tx2.cursor_read::<SyncStageProgress>().unwrap();
        let first = cursor.seek(&b"b".to_vec()).unwrap().unwrap();
        assert_eq!(first.1, 2);
        let second = cursor.next().unwrap().unwrap();
        assert_eq!(second.1, 3);
        assert!(cursor.next().unwrap().is_none());
    }
}
