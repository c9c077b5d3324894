//! The Progress Registry: four operations against an active KV transaction
//! (`get_progress`, `get_prune_progress`, `put_progress`, `put_prune_progress`),
//! backed by the `SyncStageProgress` and `SyncStagePruneProgress` tables, with
//! a per-cycle in-memory cache so repeated intra-cycle lookups don't
//! repeatedly hit the store.

use std::cell::RefCell;
use std::collections::HashMap;

use esync_db_api::{DbError, DbTx, DbTxMut, SyncStagePruneProgress, SyncStageProgress};
use esync_primitives::{BlockNumber, StageId};

/// Watermark bookkeeping for every [`StageId`], cached for the duration of one
/// driver cycle.
///
/// The cache is intentionally not tied to any one transaction: a cycle opens a
/// fresh transaction per stage invocation, but the registry itself is
/// constructed once per driver and lives across every stage call in a cycle,
/// so [`ProgressRegistry::clear_cache`] — not `Drop` — is what enforces that
/// the cache is cleared at cycle boundaries and never survives abort/rollback.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    progress: RefCell<HashMap<StageId, BlockNumber>>,
    prune_progress: RefCell<HashMap<StageId, BlockNumber>>,
}

impl ProgressRegistry {
    /// Creates a registry with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached value. Must be called at the start of each cycle (and
    /// is not safe to skip after an aborted cycle, since the cache must not be
    /// authoritative past the call that populated it).
    pub fn clear_cache(&self) {
        self.progress.borrow_mut().clear();
        self.prune_progress.borrow_mut().clear();
    }

    /// Reads `stage`'s forward watermark, defaulting to `0` when absent.
    ///
    /// # Errors
    /// Propagates any failure the underlying transaction reports.
    pub fn get_progress<Tx: DbTx>(&self, tx: &Tx, stage: StageId) -> Result<BlockNumber, DbError> {
        if let Some(value) = self.progress.borrow().get(&stage) {
            return Ok(*value);
        }
        let value = tx.get::<SyncStageProgress>(&stage_key(stage))?.unwrap_or(0);
        self.progress.borrow_mut().insert(stage, value);
        Ok(value)
    }

    /// Reads `stage`'s prune watermark, defaulting to `0` when absent.
    ///
    /// # Errors
    /// Propagates any failure the underlying transaction reports.
    pub fn get_prune_progress<Tx: DbTx>(&self, tx: &Tx, stage: StageId) -> Result<BlockNumber, DbError> {
        if let Some(value) = self.prune_progress.borrow().get(&stage) {
            return Ok(*value);
        }
        let value = tx.get::<SyncStagePruneProgress>(&stage_key(stage))?.unwrap_or(0);
        self.prune_progress.borrow_mut().insert(stage, value);
        Ok(value)
    }

    /// Writes `stage`'s forward watermark and updates the cache.
    ///
    /// # Errors
    /// Propagates any failure the underlying transaction reports.
    pub fn put_progress<Tx: DbTxMut>(&self, tx: &Tx, stage: StageId, value: BlockNumber) -> Result<(), DbError> {
        tx.put::<SyncStageProgress>(stage_key(stage), value)?;
        self.progress.borrow_mut().insert(stage, value);
        Ok(())
    }

    /// Writes `stage`'s prune watermark and updates the cache.
    ///
    /// # Errors
    /// Propagates any failure the underlying transaction reports.
    pub fn put_prune_progress<Tx: DbTxMut>(&self, tx: &Tx, stage: StageId, value: BlockNumber) -> Result<(), DbError> {
        tx.put::<SyncStagePruneProgress>(stage_key(stage), value)?;
        self.prune_progress.borrow_mut().insert(stage, value);
        Ok(())
    }
}

fn stage_key(stage: StageId) -> Vec<u8> {
    stage.as_str().as_bytes().to_vec()
}
