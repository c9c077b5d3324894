use esync_primitives::BlockNumber;

/// Read-only context a stage's `forward` is invoked with.
#[derive(Debug, Clone, Copy)]
pub struct ExecInput {
    /// This stage's own watermark before this call, i.e. `progress(S)`.
    pub checkpoint: BlockNumber,
    /// The upper bound this call may advance to, i.e. `progress(predecessor(S))`.
    /// `None` means "no predecessor constraint" (used by the first stage in the
    /// sequence, which instead bounds itself against the upstream watermark it
    /// reads directly).
    pub target: Option<BlockNumber>,
    /// Set on the very first cycle since process start, cleared after the first
    /// successful cycle. Some stages choose a different bulk-load strategy on
    /// the first pass.
    pub first_cycle: bool,
}

impl ExecInput {
    /// `target`, or `checkpoint` unchanged if no target was supplied — the
    /// "no new source data" no-op case.
    #[must_use]
    pub fn target_reached(&self) -> BlockNumber {
        self.target.unwrap_or(self.checkpoint)
    }
}

/// What a stage's `forward` reports on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutput {
    /// The new watermark, i.e. the height this stage now fully covers.
    pub checkpoint: BlockNumber,
    /// Whether this call actually reached `target` (`false` means the driver
    /// should call `forward` again before moving to the next stage — not used
    /// by this core's single-pass-per-cycle driver, but kept so a stage can
    /// honestly report partial progress under a future multi-pass driver).
    pub done: bool,
}

impl ExecOutput {
    /// A `done` output at `checkpoint`, the common case for every stage this
    /// core defines (no stage here splits a cycle into multiple sub-passes).
    #[must_use]
    pub fn done(checkpoint: BlockNumber) -> Self {
        Self { checkpoint, done: true }
    }
}

/// Context a stage's `unwind` is invoked with.
#[derive(Debug, Clone, Copy)]
pub struct UnwindInput {
    /// This stage's watermark before this call.
    pub checkpoint: BlockNumber,
    /// The height to unwind down to.
    pub unwind_to: BlockNumber,
}

/// What a stage's `unwind` reports on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindOutput {
    /// The new watermark after unwinding, equal to the requested `unwind_to`.
    pub checkpoint: BlockNumber,
}

/// Context a stage's `prune` is invoked with.
#[derive(Debug, Clone, Copy)]
pub struct PruneInput {
    /// This stage's `prune_progress` before this call.
    pub prune_progress: BlockNumber,
    /// This stage's current `progress`, the upper bound pruning may not exceed.
    pub progress: BlockNumber,
}

/// What a stage's `prune` reports on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneOutput {
    /// The new `prune_progress` after this call.
    pub prune_progress: BlockNumber,
}

impl PruneOutput {
    /// The default `prune` behavior for a stage that does not implement
    /// pruning: log-and-succeed without advancing `prune_progress`.
    #[must_use]
    pub fn unimplemented(input: PruneInput) -> Self {
        Self { prune_progress: input.prune_progress }
    }
}
