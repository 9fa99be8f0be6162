//! In-memory stand-ins for the storage and model backends.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use adsentry_ai::{AiError, Embed, EmbedPurpose, GenerateRequest, GenerateResponse, Generator, prompts};
use adsentry_core::{HistoricalCase, RetrievedCase, Tag};
use adsentry_store::{CaseRow, CaseStore, CaseVector, StoreError, TagAssignment, VectorFilter, VectorIndex};
use async_trait::async_trait;

/// Case store answering counts from fixed numbers.
pub struct CountingStore {
    pub total: Result<u64, ()>,
    pub per_column: HashMap<String, u64>,
    pub failing_columns: Vec<String>,
}

impl CountingStore {
    pub fn new(total: u64, per_column: &[(&str, u64)]) -> Self {
        Self {
            total: Ok(total),
            per_column: per_column.iter().map(|(c, n)| (c.to_string(), *n)).collect(),
            failing_columns: Vec::new(),
        }
    }
}

#[async_trait]
impl CaseStore for CountingStore {
    async fn count_total(&self) -> Result<u64, StoreError> {
        self.total
            .map_err(|_| StoreError::Other("relational store offline".into()))
    }

    async fn count_where_tag_set(&self, tag: &Tag) -> Result<u64, StoreError> {
        if self.failing_columns.iter().any(|c| c == tag.column()) {
            return Err(StoreError::Other(format!("count failed for {}", tag.column())));
        }
        Ok(self.per_column.get(tag.column()).copied().unwrap_or(0))
    }

    async fn list_untagged(&self, _: i64, _: usize) -> Result<Vec<CaseRow>, StoreError> {
        Ok(vec![])
    }

    async fn list_tagged(&self, _: i64, _: usize) -> Result<Vec<HistoricalCase>, StoreError> {
        Ok(vec![])
    }

    async fn set_tag_columns(&self, _: &[TagAssignment]) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Vector index over a fixed list of cases, brute-force cosine.
///
/// Queries whose filter names a column in `stalled_columns` sleep for a
/// minute before answering.
pub struct MemoryIndex {
    pub records: Vec<CaseVector>,
    pub stalled_columns: Vec<String>,
    pub queries: Mutex<Vec<VectorFilter>>,
}

impl MemoryIndex {
    pub fn new(records: Vec<CaseVector>) -> Self {
        Self {
            records,
            stalled_columns: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<RetrievedCase>, StoreError> {
        self.queries.lock().unwrap().push(filter.clone());
        if filter
            .tags
            .iter()
            .any(|t| self.stalled_columns.iter().any(|c| c == t.column()))
        {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let mut hits: Vec<RetrievedCase> = self
            .records
            .iter()
            .filter(|r| {
                let columns: Vec<String> = r.case.tags.iter().map(|t| t.column().to_string()).collect();
                filter.matches(&columns, r.case.industry)
            })
            .map(|r| RetrievedCase {
                case_id: r.case.id.to_string(),
                product_name: r.case.product_name.clone(),
                explanation: r.case.explanation.clone(),
                law: r.case.law.clone(),
                date: r.case.date.clone(),
                link: r.case.link.clone(),
                industry: r.case.industry,
                similarity_score: cosine(embedding, &r.embedding).clamp(0.0, 1.0),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(&self, records: &[CaseVector]) -> Result<usize, StoreError> {
        Ok(records.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

/// Embeds every text as the same fixed vector.
pub struct FixedEmbedder {
    pub vector: Option<Vec<f32>>,
}

#[async_trait]
impl Embed for FixedEmbedder {
    async fn embed(&self, _: &str, _: EmbedPurpose) -> Result<Vec<f32>, AiError> {
        self.vector
            .clone()
            .ok_or_else(|| AiError::Api { status: 503, body: "unavailable".into() })
    }

    fn dim(&self) -> usize {
        self.vector.as_ref().map_or(0, Vec::len)
    }

    fn model_id(&self) -> &str {
        "fixed"
    }
}

/// Answers identification and advisory prompts with canned JSON and counts
/// calls per stage.
pub struct ScriptedGenerator {
    pub identify: Option<String>,
    pub advise: Option<String>,
    pub identify_calls: Mutex<usize>,
    pub advise_calls: Mutex<usize>,
}

impl ScriptedGenerator {
    pub fn new(identify: serde_json::Value, advise: serde_json::Value) -> Self {
        Self {
            identify: Some(identify.to_string()),
            advise: Some(advise.to_string()),
            identify_calls: Mutex::new(0),
            advise_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, AiError> {
        let reply = if request.system_prompt == prompts::ADVISE_SYSTEM {
            *self.advise_calls.lock().unwrap() += 1;
            &self.advise
        } else {
            *self.identify_calls.lock().unwrap() += 1;
            &self.identify
        };
        match reply {
            Some(text) => Ok(GenerateResponse {
                text: text.clone(),
                tokens_used: 0,
            }),
            None => Err(AiError::EmptyResponse),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
