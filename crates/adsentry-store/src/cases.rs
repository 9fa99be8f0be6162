//! Relational access to historical violation cases.

use adsentry_core::{HistoricalCase, Tag};
use async_trait::async_trait;

use crate::StoreError;

/// The columns the backlog tagger needs from an untagged case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRow {
    pub id: i64,
    pub product_name: String,
    pub explanation: String,
}

/// Tags to set on one case. Only ever sets flags, never clears them.
#[derive(Debug, Clone, PartialEq)]
pub struct TagAssignment {
    pub case_id: i64,
    pub tags: Vec<Tag>,
}

/// Read and tag-write access to the `violation_cases` table.
///
/// Listing methods use keyset pagination: pass the last id seen as
/// `after_id` (0 to start) and results come back ordered by id.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Number of historical cases.
    async fn count_total(&self) -> Result<u64, StoreError>;

    /// Number of cases whose flag for `tag` is set.
    async fn count_where_tag_set(&self, tag: &Tag) -> Result<u64, StoreError>;

    /// Cases with no tag flag set.
    async fn list_untagged(&self, after_id: i64, limit: usize) -> Result<Vec<CaseRow>, StoreError>;

    /// Cases with at least one tag flag set, with their full metadata.
    async fn list_tagged(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<HistoricalCase>, StoreError>;

    /// Set tag flags for a batch of cases in a single transaction.
    ///
    /// Returns the number of case rows updated.
    async fn set_tag_columns(&self, assignments: &[TagAssignment]) -> Result<usize, StoreError>;
}
