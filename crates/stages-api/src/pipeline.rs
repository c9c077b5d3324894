use esync_db_api::Database;
use esync_primitives::{BlockNumber, StageId, StopSignal};
use esync_provider::ProgressRegistry;
use tracing::{debug, warn};

use crate::{
    error::StageError,
    stage::{Stage, StageContext},
    types::{ExecInput, PruneInput, UnwindInput},
};

/// The Sync Driver: orders stages, runs forward cycles, triggers unwind on
/// request, and hands every stage its own transaction.
pub struct Pipeline<DB: Database> {
    db: DB,
    stages: Vec<Box<dyn Stage<DB>>>,
    registry: ProgressRegistry,
    stop: StopSignal,
    unwind_to: Option<BlockNumber>,
    first_cycle: bool,
}

impl<DB: Database> Pipeline<DB> {
    /// Creates a driver over `db` with no stages registered yet. Add stages
    /// with [`Pipeline::push_stage`] in the order they should run; a later
    /// push's `ordinal` must be strictly greater than every stage already
    /// registered, since ordinals are globally unique and strictly positive.
    pub fn new(db: DB) -> Self {
        Self { db, stages: Vec::new(), registry: ProgressRegistry::new(), stop: StopSignal::new(), unwind_to: None, first_cycle: true }
    }

    /// Registers a stage. Panics if its `id`'s ordinal collides with or
    /// precedes one already registered — a configuration bug, not a runtime
    /// condition a caller can sensibly recover from.
    pub fn push_stage(&mut self, stage: Box<dyn Stage<DB>>) {
        let ordinal = stage.id().ordinal();
        if let Some(last) = self.stages.last() {
            assert!(last.id().ordinal() < ordinal, "stages must be registered in strictly increasing ordinal order");
        }
        self.stages.push(stage);
    }

    /// The cooperative-cancellation handle. Clone it into a signal handler via
    /// [`esync_primitives::register_stop_handler`], or set it directly from a
    /// test.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Requests an unwind to `height` on the next call to
    /// [`Pipeline::run_unwind_cycle`].
    pub fn request_unwind(&mut self, height: BlockNumber) {
        self.unwind_to = Some(height);
    }

    fn context(&self) -> StageContext<'_> {
        StageContext { stop: &self.stop, registry: &self.registry }
    }

    /// Runs every enabled stage once, in ascending ordinal order. Stops and
    /// returns the error of the first stage that does not succeed, without
    /// attempting subsequent stages.
    ///
    /// # Errors
    /// Propagates the first non-success [`StageError`] any stage reports.
    pub fn run_forward_cycle(&mut self) -> Result<(), StageError> {
        self.registry.clear_cache();
        for stage in &mut self.stages {
            if stage.disabled() {
                continue;
            }
            if self.stop.is_set() {
                return Err(StageError::Aborted);
            }
            let id = stage.id();
            let (checkpoint, target) = {
                let read_tx = self.db.tx()?;
                let checkpoint = self.registry.get_progress(&read_tx, id)?;
                let target = match id.predecessor() {
                    Some(pred) => Some(self.registry.get_progress(&read_tx, pred)?),
                    None => None,
                };
                (checkpoint, target)
            };
            let input = ExecInput { checkpoint, target, first_cycle: self.first_cycle };
            let tx = self.db.tx_mut()?;
            let ctx = self.context();
            let output = stage.forward(tx, &ctx, input)?;
            debug!(stage = %id, checkpoint = output.checkpoint, "stage forward complete");
        }
        self.first_cycle = false;
        Ok(())
    }

    /// Runs a pending unwind, iterating stages in descending ordinal order and
    /// calling `unwind` only on stages whose current `progress` exceeds the
    /// requested height. A no-op if no unwind is pending, or if the requested
    /// height is not below the last stage's current progress.
    ///
    /// # Errors
    /// Propagates the first non-success [`StageError`] any stage reports.
    pub fn run_unwind_cycle(&mut self) -> Result<(), StageError> {
        self.registry.clear_cache();
        let Some(height) = self.unwind_to else { return Ok(()) };

        if let Some(last) = self.stages.last() {
            let last_id = last.id();
            let read_tx = self.db.tx()?;
            let last_progress = self.registry.get_progress(&read_tx, last_id)?;
            drop(read_tx);
            if height >= last_progress {
                self.unwind_to = None;
                return Ok(());
            }
        }

        for stage in self.stages.iter_mut().rev() {
            let id = stage.id();
            let checkpoint = {
                let read_tx = self.db.tx()?;
                self.registry.get_progress(&read_tx, id)?
            };
            if checkpoint <= height {
                continue;
            }
            let tx = self.db.tx_mut()?;
            let ctx = StageContext { stop: &self.stop, registry: &self.registry };
            let input = UnwindInput { checkpoint, unwind_to: height };
            let output = stage.unwind(tx, &ctx, input)?;
            debug!(stage = %id, checkpoint = output.checkpoint, "stage unwind complete");
        }
        self.unwind_to = None;
        Ok(())
    }

    /// Invokes `prune` on every stage with `has_pruning() == true`, in
    /// ascending ordinal order. A prune failure on one stage does not prevent
    /// subsequent stages from being attempted; the first failure observed is
    /// returned once every stage has been tried.
    ///
    /// # Errors
    /// Returns the first [`StageError`] any pruning stage reported, after
    /// every stage has had a chance to run.
    pub fn run_prune_cycle(&mut self) -> Result<(), StageError> {
        self.registry.clear_cache();
        let mut first_error = None;
        for stage in &mut self.stages {
            if !stage.has_pruning() {
                continue;
            }
            let id = stage.id();
            let (progress, prune_progress) = {
                let read_tx = self.db.tx()?;
                let progress = self.registry.get_progress(&read_tx, id)?;
                let prune_progress = self.registry.get_prune_progress(&read_tx, id)?;
                (progress, prune_progress)
            };
            let tx = self.db.tx_mut()?;
            let ctx = self.context();
            let input = PruneInput { prune_progress, progress };
            if let Err(err) = stage.prune(tx, &ctx, input) {
                warn!(stage = %id, %err, "stage prune failed; continuing with remaining stages");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Runs unwind-then-forward cycles until `is_done` reports `true` or a
    /// cycle returns a non-recoverable error.
    ///
    /// # Errors
    /// Propagates the first [`StageError`] any cycle reports.
    pub fn run_until(&mut self, is_done: impl Fn() -> bool) -> Result<(), StageError> {
        while !is_done() {
            self.run_unwind_cycle()?;
            self.run_forward_cycle()?;
        }
        Ok(())
    }
}
