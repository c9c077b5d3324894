/// Failure modes a [`crate::Collector`] can surface.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// Disk-full while spilling a run.
    #[error("scratch directory is full")]
    StorageFull,
    /// A spilled run was truncated or failed its trailing checksum.
    #[error("corrupt spilled run: {0}")]
    CorruptTemp(String),
    /// `APPEND` mode observed a key not strictly greater than the previous one.
    #[error("append-only load received a non-monotone key")]
    NonMonotoneKey,
    /// The destination store rejected the write.
    #[error("destination store error: {0}")]
    Db(#[from] esync_db_api::DbError),
    /// Any other scratch-directory I/O failure.
    #[error("scratch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// `ENOSPC` on Linux/macOS/Windows alike is the portable way to notice a full
/// filesystem from a plain [`std::io::Error`]; std's `ErrorKind::StorageFull` is not
/// yet stable across all target platforms this workspace might build for.
pub(crate) fn classify_io(err: std::io::Error) -> CollectorError {
    if err.raw_os_error() == Some(28) {
        CollectorError::StorageFull
    } else {
        CollectorError::Io(err)
    }
}
