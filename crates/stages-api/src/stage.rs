use esync_db_api::Database;
use esync_primitives::StageId;
use esync_provider::ProgressRegistry;

use crate::{error::StageError, types::{ExecInput, ExecOutput, PruneInput, PruneOutput, UnwindInput, UnwindOutput}};

/// Shared state every stage invocation can read, independent of which
/// transaction the driver handed it for this particular call.
#[derive(Debug)]
pub struct StageContext<'a> {
    /// The cooperative-cancellation flag. Long-running stages (`Senders`) poll
    /// this between units of work; short stages may ignore it entirely.
    pub stop: &'a esync_primitives::StopSignal,
    /// The Progress Registry, shared across every stage call in the current
    /// cycle so its cache stays warm between stages.
    pub registry: &'a ProgressRegistry,
}

/// A named unit of deterministic transformation from one or more source tables
/// to one destination table, with forward/unwind/prune operations and a
/// persistent watermark.
///
/// `forward`/`unwind`/`prune` each take ownership of a write transaction rather
/// than a borrowed one: the stage commits internally on success, so it is the
/// stage implementation's job to call [`esync_db_api::DbTxMut::commit`] once
/// its watermark and destination-table writes are staged, and simply dropping
/// the transaction on any early return discards everything written through it
/// — abort-on-first-failure, for free.
pub trait Stage<DB: Database>: Send + Sync {
    /// The stable identifier this stage is stored under in the Progress
    /// Registry, and its ordinal position in the stage sequence.
    fn id(&self) -> StageId;

    /// Whether this stage implements `prune` beyond the default log-and-succeed
    /// behavior.
    fn has_pruning(&self) -> bool {
        false
    }

    /// Whether the driver should skip this stage entirely.
    fn disabled(&self) -> bool {
        false
    }

    /// Advances this stage's destination tables and watermark to (at most)
    /// `input.target`.
    ///
    /// # Errors
    /// Returns a [`StageError`] describing why the stage could not advance;
    /// the transaction passed in is dropped (and so its writes discarded)
    /// unless the implementation already committed before returning.
    fn forward(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: ExecInput) -> Result<ExecOutput, StageError>;

    /// Reverts this stage's destination tables and watermark down to
    /// `input.unwind_to`.
    ///
    /// # Errors
    /// Returns a [`StageError`] describing why the stage could not unwind.
    fn unwind(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: UnwindInput) -> Result<UnwindOutput, StageError>;

    /// Deletes historical rows below some height the implementation chooses,
    /// never exceeding `input.progress`. The default implementation performs no
    /// deletion and reports success without advancing `prune_progress` — a
    /// log-and-succeed stand-in for stages that do not implement pruning.
    ///
    /// # Errors
    /// Returns a [`StageError`] describing why pruning failed.
    fn prune(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: PruneInput) -> Result<PruneOutput, StageError> {
        let _ = (tx, ctx);
        Ok(PruneOutput::unimplemented(input))
    }
}
