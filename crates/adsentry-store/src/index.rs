//! Similarity search over embedded historical cases.

use adsentry_core::{HistoricalCase, Industry, RetrievedCase, Tag};
use async_trait::async_trait;

use crate::StoreError;

/// Restricts a vector query to cases flagged with any of `tags`, and
/// optionally to one industry.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFilter {
    pub tags: Vec<Tag>,
    pub industry: Option<Industry>,
}

impl VectorFilter {
    pub fn for_tag(tag: &Tag, industry: Option<Industry>) -> Self {
        Self {
            tags: vec![tag.clone()],
            industry: industry.and_then(Industry::known),
        }
    }

    /// SQL predicate understood by the index, or `None` when unrestricted.
    ///
    /// Tag columns and industry names come from closed sets of identifiers,
    /// so no quoting beyond the literal delimiters is needed.
    pub fn to_sql(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if !self.tags.is_empty() {
            let list: Vec<String> = self.tags.iter().map(|t| format!("'{}'", t.column())).collect();
            clauses.push(format!("array_has_any(tags, [{}])", list.join(", ")));
        }
        if let Some(industry) = self.industry {
            clauses.push(format!("industry = '{}'", industry.as_str()));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }

    /// Evaluate the filter against a case's tag columns and industry.
    pub fn matches(&self, tag_columns: &[String], industry: Industry) -> bool {
        let tag_ok = self.tags.is_empty()
            || self
                .tags
                .iter()
                .any(|t| tag_columns.iter().any(|c| c == t.column()));
        let industry_ok = self.industry.is_none_or(|i| i == industry);
        tag_ok && industry_ok
    }
}

/// A historical case with its document embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct CaseVector {
    pub case: HistoricalCase,
    pub embedding: Vec<f32>,
    /// Identifier of the embedding model, stored alongside the vector.
    pub model: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest `top_k` cases to `embedding` that pass `filter`, most similar first.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<RetrievedCase>, StoreError>;

    /// Insert or replace cases keyed by case id. Returns the number written.
    async fn upsert(&self, records: &[CaseVector]) -> Result<usize, StoreError>;

    /// Number of indexed cases.
    async fn count(&self) -> Result<usize, StoreError>;
}
