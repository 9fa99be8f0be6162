//! Storage layer: DuckDB (historical cases and tag flags), LanceDB (case vector index).
//!
//! Both backends sit behind the [`CaseStore`] and [`VectorIndex`] traits so the
//! pipeline can run against in-memory fakes in tests.

mod cases;
mod error;
mod index;

pub use cases::{CaseRow, CaseStore, TagAssignment};
pub use error::StoreError;
pub use index::{CaseVector, VectorFilter, VectorIndex};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceStore;
