/// Failure talking to the underlying ordered key-value store.
///
/// Every variant here collapses into the single `db_error` taxonomy entry at
/// the stage boundary; this finer granularity is kept at the storage layer so
/// a backend implementation (or a test) can distinguish them, and erased to
/// `db_error` only when it crosses into `esync-stages-api`.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A table marker was used against a backend that has not opened it.
    #[error("table {0} is not open")]
    TableNotFound(&'static str),
    /// A stored key or value could not be decoded into its typed representation.
    #[error("failed to decode {0}: {1}")]
    Decode(&'static str, String),
    /// An append-only insert observed a key not strictly greater than the last one
    /// written to that cursor.
    #[error("append-only write received a non-monotone key")]
    NotMonotonic,
    /// The backend reported an I/O or transactional failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}
