/// Stable ordinal error taxonomy shared by every stage, realized as a
/// `thiserror` enum so every stage boundary returns the same `Result<_,
/// StageError>` shape rather than throwing.
///
/// `Display` produces a `lower_snake_case` name for each variant, so logs and
/// tests can match on the stable string form without reaching into the enum
/// itself.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The configured chain id has no known fork-activation schedule.
    #[error("unknown_chain_id")]
    UnknownChainId,
    /// Reserved for a consensus engine selector this core does not implement.
    #[error("unknown_consensus_engine")]
    UnknownConsensusEngine,
    /// A `CanonicalHashes` value was not exactly 32 bytes.
    #[error("bad_block_hash")]
    BadBlockHash,
    /// A source table was observed out of the expected strictly increasing
    /// block-number order, or an `APPEND` load saw a non-monotone key.
    #[error("bad_chain_sequence")]
    BadChainSequence,
    /// A requested block range was empty or inverted where neither is valid.
    #[error("invalid_range")]
    InvalidRange,
    /// A watermark read back from the Progress Registry violated an invariant
    /// (e.g. `prune_progress > progress`).
    #[error("invalid_progress")]
    InvalidProgress,
    /// A decoded block failed a structural check this core is responsible for.
    #[error("invalid_block")]
    InvalidBlock,
    /// A transaction's signature failed validation (e.g. `s > n/2`, EIP-2).
    #[error("invalid_transaction")]
    InvalidTransaction,
    /// A block body was missing from the expected recovery range.
    #[error("missing_senders")]
    MissingSenders,
    /// A byte sequence failed to decode into its typed representation.
    #[error("decoding_error: {0}")]
    DecodingError(String),
    /// A stage-internal failure that does not fit any other named condition.
    #[error("unexpected_error: {0}")]
    UnexpectedError(String),
    /// A condition was thrown that the stage boundary does not recognize at all.
    #[error("unknown_error")]
    UnknownError,
    /// The underlying key-value store rejected a read or write.
    #[error("db_error: {0}")]
    Db(#[from] esync_db_api::DbError),
    /// A Collector reported one of its own failure modes (`storage_full`,
    /// `corrupt_temp`, or an `APPEND` monotonicity violation) while flushing,
    /// merging, or loading. Carried here as a distinct wrapped variant rather
    /// than flattened into `unexpected_error`.
    #[error("collector_error: {0}")]
    Collector(#[from] esync_etl::CollectorError),
    /// The stage was cancelled via [`esync_primitives::StopSignal`] before it
    /// could commit.
    #[error("aborted")]
    Aborted,
    /// The operation has no implementation for this stage (the default `prune`
    /// when `has_pruning` is false reports success instead of this; this
    /// variant exists for completeness of the taxonomy).
    #[error("not_implemented")]
    NotImplemented,
}

impl StageError {
    /// Whether this error corresponds to an `APPEND` load rejecting a
    /// non-monotone key (the `bad_chain_sequence` failure mode).
    #[must_use]
    pub fn is_bad_chain_sequence(&self) -> bool {
        matches!(self, Self::BadChainSequence)
            || matches!(self, Self::Collector(esync_etl::CollectorError::NonMonotoneKey))
    }
}
