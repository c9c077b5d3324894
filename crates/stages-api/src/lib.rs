//! The Stage interface, its error taxonomy, and the Sync Driver that runs a
//! sequence of stages through forward, unwind, and prune cycles.

mod error;
mod pipeline;
mod stage;
mod types;

pub use error::StageError;
pub use pipeline::Pipeline;
pub use stage::{Stage, StageContext};
pub use types::{ExecInput, ExecOutput, PruneInput, PruneOutput, UnwindInput, UnwindOutput};

/// The result type every stage operation returns: a tagged
/// success/failure outcome realized as Rust's native `Result`.
pub type StageResult<T> = Result<T, StageError>;
