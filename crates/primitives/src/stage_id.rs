use std::fmt;

/// The stable identifier of a stage, used as the key into the Progress Registry.
///
/// Upstream, a stage key is "a short stable string identifier"; here it is a closed
/// enumeration instead, so a typo in a stage name can't silently create a second,
/// unrelated watermark. [`StageId::as_str`] produces exactly the string the registry
/// contract is specified in terms of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    /// Derives `HeaderNumbers` from `CanonicalHeaders`.
    BlockHashes,
    /// Canonical block bodies (upstream of this core; referenced as a predecessor
    /// watermark by [`StageId::BlockHashes`]).
    Bodies,
    /// Recovers transaction sender addresses.
    Senders,
}

impl StageId {
    /// All stages in ascending ordinal order, as run by a forward cycle.
    pub const ALL: [Self; 2] = [Self::BlockHashes, Self::Senders];

    /// The stable string key this stage is stored under in the Progress Registry.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BlockHashes => "BlockHashes",
            Self::Bodies => "Bodies",
            Self::Senders => "Senders",
        }
    }

    /// Ordinal position in the stage sequence. Stages not run by the driver (i.e.
    /// upstream watermarks consulted but not advanced here) have no ordinal.
    #[must_use]
    pub const fn ordinal(&self) -> Option<u32> {
        match self {
            Self::BlockHashes => Some(1),
            Self::Senders => Some(2),
            Self::Bodies => None,
        }
    }

    /// The stage whose `progress` bounds this stage's forward target
    /// (`progress(S) <= progress(predecessor(S))` for every stage `S`). `None`
    /// for the first stage in the sequence, which has no predecessor to bound
    /// it.
    #[must_use]
    pub const fn predecessor(&self) -> Option<Self> {
        match self {
            Self::BlockHashes => Some(Self::Bodies),
            Self::Senders => Some(Self::BlockHashes),
            Self::Bodies => None,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
