use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case export not found: {0}")]
    ParquetNotFound(std::path::PathBuf),

    /// A query that must yield one row yielded none.
    #[error("query returned no rows")]
    NoResults,

    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("store connection lock poisoned")]
    LockPoisoned,

    #[cfg(feature = "duckdb")]
    #[error("duckdb: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[cfg(feature = "lancedb")]
    #[error("lancedb: {0}")]
    Lance(#[from] ::lancedb::Error),

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
