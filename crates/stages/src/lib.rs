//! The two illustrative stages built on `esync-stages-api`: `BlockHashes`, a
//! small single-pass inverse index, and `Senders`, a CPU-bound parallel
//! recovery stage backed by its own worker farm.

mod block_hashes;
mod senders;

pub use block_hashes::BlockHashesStage;
pub use senders::SendersStage;
