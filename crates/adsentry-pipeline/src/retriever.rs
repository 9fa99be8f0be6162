//! Similarity search for historical cases supporting an identified tag.

use std::sync::Arc;
use std::time::Duration;

use adsentry_ai::{Embed, EmbedPurpose};
use adsentry_core::{EvidenceGroup, Industry, RetrievedCase, Tag};
use adsentry_store::{VectorFilter, VectorIndex};
use futures::future::join_all;
use tracing::{debug, warn};

/// Embeds query text and searches the case index per tag.
///
/// Every failure (embedding, index, timeout) yields empty evidence for the
/// affected tag; retrieval never fails a request.
pub struct EvidenceRetriever {
    embedder: Arc<dyn Embed>,
    index: Arc<dyn VectorIndex>,
    embed_timeout: Duration,
    query_timeout: Duration,
}

impl EvidenceRetriever {
    pub fn new(
        embedder: Arc<dyn Embed>,
        index: Arc<dyn VectorIndex>,
        embed_timeout: Duration,
        query_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            embed_timeout,
            query_timeout,
        }
    }

    /// Embed `text` as a retrieval query. `None` on failure.
    pub async fn embed_query(&self, text: &str) -> Option<Vec<f32>> {
        let call = self.embedder.embed(text, EmbedPurpose::Query);
        match tokio::time::timeout(self.embed_timeout, call).await {
            Ok(Ok(v)) => Some(v),
            Ok(Err(e)) => {
                warn!(error = %e, "query embedding failed, continuing without evidence");
                None
            }
            Err(_) => {
                warn!("query embedding timed out, continuing without evidence");
                None
            }
        }
    }

    /// Top `top_k` cases similar to `text` flagged with `tag`.
    pub async fn search(
        &self,
        text: &str,
        tag: &Tag,
        industry: Option<Industry>,
        top_k: usize,
    ) -> Vec<RetrievedCase> {
        match self.embed_query(text).await {
            Some(embedding) => self.search_embedded(&embedding, tag, industry, top_k).await,
            None => Vec::new(),
        }
    }

    /// Like [`search`](Self::search) with an already embedded query.
    pub async fn search_embedded(
        &self,
        embedding: &[f32],
        tag: &Tag,
        industry: Option<Industry>,
        top_k: usize,
    ) -> Vec<RetrievedCase> {
        let filter = VectorFilter::for_tag(tag, industry);
        let call = self.index.query(embedding, top_k, &filter);
        let mut cases = match tokio::time::timeout(self.query_timeout, call).await {
            Ok(Ok(cases)) => cases,
            Ok(Err(e)) => {
                warn!(tag = %tag, error = %e, "evidence search failed");
                return Vec::new();
            }
            Err(_) => {
                warn!(tag = %tag, "evidence search timed out");
                return Vec::new();
            }
        };
        cases.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        cases.truncate(top_k);
        debug!(tag = %tag, count = cases.len(), "retrieved evidence");
        cases
    }

    /// One evidence group per tag, in tag order, searched concurrently.
    pub async fn gather(
        &self,
        embedding: Option<&[f32]>,
        tags: &[Tag],
        industry: Option<Industry>,
        top_k: usize,
    ) -> Vec<EvidenceGroup> {
        let Some(embedding) = embedding else {
            return tags.iter().cloned().map(EvidenceGroup::empty).collect();
        };
        let searches = tags
            .iter()
            .map(|tag| self.search_embedded(embedding, tag, industry, top_k));
        let results = join_all(searches).await;
        tags.iter()
            .cloned()
            .zip(results)
            .map(|(tag, cases)| EvidenceGroup { tag, cases })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedEmbedder, MemoryIndex};
    use adsentry_core::{HistoricalCase, TagRegistry};
    use adsentry_store::CaseVector;

    fn record(reg: &TagRegistry, id: i64, tag: &str, industry: Industry, e: Vec<f32>) -> CaseVector {
        CaseVector {
            case: HistoricalCase {
                id,
                product_name: format!("產品{id}"),
                explanation: String::new(),
                law: String::new(),
                date: "2024-01".into(),
                link: format!("https://example.gov.tw/{id}"),
                industry,
                tags: vec![reg.get(tag).unwrap().clone()],
            },
            embedding: e,
            model: "fixed".into(),
        }
    }

    fn retriever(index: MemoryIndex, vector: Option<Vec<f32>>) -> EvidenceRetriever {
        EvidenceRetriever::new(
            Arc::new(FixedEmbedder { vector }),
            Arc::new(index),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn ranks_by_similarity_and_caps() {
        let reg = TagRegistry::builtin();
        let index = MemoryIndex::new(vec![
            record(&reg, 1, "燃脂瘦身", Industry::Food, vec![0.0, 1.0]),
            record(&reg, 2, "燃脂瘦身", Industry::Food, vec![1.0, 0.1]),
            record(&reg, 3, "燃脂瘦身", Industry::Food, vec![1.0, 0.5]),
            record(&reg, 4, "發炎", Industry::Food, vec![1.0, 0.0]),
        ]);
        let r = retriever(index, Some(vec![1.0, 0.0]));
        let hits = r
            .search("甩油", reg.get("燃脂瘦身").unwrap(), None, 2)
            .await;
        let ids: Vec<&str> = hits.iter().map(|c| c.case_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(hits.iter().all(|c| (0.0..=1.0).contains(&c.similarity_score)));
    }

    #[tokio::test]
    async fn industry_narrows_results() {
        let reg = TagRegistry::builtin();
        let index = MemoryIndex::new(vec![
            record(&reg, 1, "發炎", Industry::Food, vec![1.0, 0.0]),
            record(&reg, 2, "發炎", Industry::Cosmetic, vec![1.0, 0.0]),
        ]);
        let r = retriever(index, Some(vec![1.0, 0.0]));
        let hits = r
            .search("消炎", reg.get("發炎").unwrap(), Some(Industry::Cosmetic), 5)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].case_id, "2");
    }

    #[tokio::test]
    async fn embedding_failure_yields_empty() {
        let reg = TagRegistry::builtin();
        let index = MemoryIndex::new(vec![record(&reg, 1, "發炎", Industry::Food, vec![1.0])]);
        let r = retriever(index, None);
        assert!(r.search("消炎", reg.get("發炎").unwrap(), None, 2).await.is_empty());
    }

    #[tokio::test]
    async fn one_stalled_tag_does_not_block_others() {
        let reg = TagRegistry::builtin();
        let mut index = MemoryIndex::new(vec![
            record(&reg, 1, "燃脂瘦身", Industry::Food, vec![1.0, 0.0]),
            record(&reg, 2, "保證承諾", Industry::Food, vec![1.0, 0.0]),
        ]);
        index.stalled_columns.push("tag_slimming".into());
        let r = retriever(index, Some(vec![1.0, 0.0]));
        let tags = vec![
            reg.get("燃脂瘦身").unwrap().clone(),
            reg.get("保證承諾").unwrap().clone(),
        ];

        let embedding = r.embed_query("甩油保證").await.unwrap();
        let groups = r.gather(Some(&embedding), &tags, None, 2).await;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].tag, tags[0]);
        assert!(groups[0].cases.is_empty());
        assert_eq!(groups[1].cases.len(), 1);
    }

    #[tokio::test]
    async fn gather_without_embedding_is_all_empty() {
        let reg = TagRegistry::builtin();
        let r = retriever(MemoryIndex::new(vec![]), Some(vec![1.0]));
        let tags = vec![reg.get("治療").unwrap().clone()];
        let groups = r.gather(None, &tags, None, 2).await;
        assert_eq!(groups.len(), 1);
        assert!(groups[0].cases.is_empty());
    }
}
