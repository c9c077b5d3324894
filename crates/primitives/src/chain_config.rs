use crate::ChainId;

/// Fork-activation block numbers consumed by the Senders stage to select the
/// applicable signing-hash rule for a transaction.
///
/// Fields are `Option` because a chain under test may never activate a given fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// The chain identifier folded into `v` for EIP-155 legacy transactions.
    pub chain_id: ChainId,
    /// Block at which EIP-155 replay protection activates (Spurious Dragon).
    /// Legacy transactions signed before this block use bare `v` in `{27, 28}`.
    pub spurious_dragon_block: Option<u64>,
    /// Block at which EIP-2930 (access-list transactions, type `0x01`) activates.
    pub berlin_block: Option<u64>,
    /// Block at which EIP-1559 (dynamic-fee transactions, type `0x02`) activates.
    pub london_block: Option<u64>,
}

impl ChainConfig {
    /// Ethereum mainnet fork activations.
    pub const MAINNET: Self = Self {
        chain_id: 1,
        spurious_dragon_block: Some(2_675_000),
        berlin_block: Some(12_244_000),
        london_block: Some(12_965_000),
    };

    /// Whether `block` is at or after EIP-155 activation.
    #[must_use]
    pub fn is_spurious_dragon(&self, block: u64) -> bool {
        self.spurious_dragon_block.is_some_and(|b| block >= b)
    }
}
