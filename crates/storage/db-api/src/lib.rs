//! The ordered key-value store contract this core is written against: named
//! maps, cursors, range scans in key order, append-only fast inserts, and ACID
//! transactions, expressed as traits generic over the concrete backend
//! `esync-db` provides. Nothing in here knows how to open a file or talk to an
//! OS — only the shapes a conforming backend and a conforming stage agree on.

pub mod codec;
pub mod cursor;
mod error;
pub mod tables;
mod transaction;

pub use codec::{BlockBodyKey, BlockNumberKey, Key, Value};
pub use cursor::{DbCursorRO, DbCursorRW, DbDupCursorRO};
pub use error::DbError;
pub use tables::{BlockBodies, CanonicalHashes, HeaderNumbers, Senders, SyncStagePruneProgress, SyncStageProgress, Table};
pub use transaction::{Database, DbTx, DbTxMut};
