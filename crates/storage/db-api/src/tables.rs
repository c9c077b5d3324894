//! The six named tables this core operates on, as zero-sized marker types
//! implementing [`Table`].

use alloy_primitives::B256;
use esync_primitives::BlockNumber;

use crate::codec::BlockNumberKey;

/// A named ordered map inside the KV store: a key type, a value type, and a
/// stable name.
pub trait Table: Send + Sync + 'static + std::fmt::Debug {
    /// The stable table name.
    const NAME: &'static str;
    type Key: crate::codec::Key;
    type Value: crate::codec::Value;
}

/// `CanonicalHashes: BlockNum_BE -> HeaderHash`. Written by the upstream download
/// subsystem; read (never written) by this core.
#[derive(Debug)]
pub struct CanonicalHashes;

impl Table for CanonicalHashes {
    const NAME: &'static str = "CanonicalHashes";
    type Key = BlockNumberKey;
    type Value = B256;
}

/// `HeaderNumbers: HeaderHash -> BlockNum_BE`, the inverse index the `BlockHashes`
/// stage derives and maintains.
#[derive(Debug)]
pub struct HeaderNumbers;

impl Table for HeaderNumbers {
    const NAME: &'static str = "HeaderNumbers";
    type Key = B256;
    type Value = BlockNumber;
}

/// `BlockBodies: BlockNum_BE ∥ HeaderHash -> RLP(body)`. Written by the upstream
/// download subsystem; read by the `Senders` stage to enumerate transactions.
#[derive(Debug)]
pub struct BlockBodies;

impl Table for BlockBodies {
    const NAME: &'static str = "BlockBodies";
    type Key = crate::codec::BlockBodyKey;
    type Value = Vec<u8>;
}

/// `Senders: BlockNum_BE -> concat(Address[20])`. Written by the `Senders` stage.
#[derive(Debug)]
pub struct Senders;

impl Table for Senders {
    const NAME: &'static str = "Senders";
    type Key = BlockNumberKey;
    type Value = Vec<u8>;
}

/// `SyncStageProgress: StageKey -> BlockNum_BE`. Written by the Progress Registry.
#[derive(Debug)]
pub struct SyncStageProgress;

impl Table for SyncStageProgress {
    const NAME: &'static str = "SyncStageProgress";
    type Key = Vec<u8>;
    type Value = BlockNumber;
}

/// `SyncStagePruneProgress: StageKey -> BlockNum_BE`. Written by the Progress
/// Registry.
#[derive(Debug)]
pub struct SyncStagePruneProgress;

impl Table for SyncStagePruneProgress {
    const NAME: &'static str = "SyncStagePruneProgress";
    type Key = Vec<u8>;
    type Value = BlockNumber;
}

/// Every table this core knows about, for backends that need to pre-declare their
/// full table set at open time (e.g. `redb`, which requires every table handle be
/// known up front).
pub const ALL_TABLES: &[&str] = &[
    CanonicalHashes::NAME,
    HeaderNumbers::NAME,
    BlockBodies::NAME,
    Senders::NAME,
    SyncStageProgress::NAME,
    SyncStagePruneProgress::NAME,
];
