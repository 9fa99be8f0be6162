//! In-memory case store, vector index and model fakes for job tests.

use std::sync::Mutex;

use adsentry_ai::{AiError, Embed, EmbedPurpose, GenerateRequest, GenerateResponse, Generator};
use adsentry_core::{HistoricalCase, Industry, RetrievedCase, Tag, TagRegistry};
use adsentry_store::{CaseRow, CaseStore, CaseVector, StoreError, TagAssignment, VectorFilter, VectorIndex};
use async_trait::async_trait;

pub struct StoredCase {
    pub id: i64,
    pub product_name: String,
    pub explanation: String,
    pub tags: Vec<Tag>,
}

/// Case store over a vector of rows. `set_tag_columns` fails while
/// `commit_failures` is positive.
pub struct MemoryCases {
    pub rows: Mutex<Vec<StoredCase>>,
    pub commits: Mutex<Vec<usize>>,
    pub commit_failures: Mutex<u32>,
}

impl MemoryCases {
    pub fn untagged(rows: &[(i64, &str)]) -> Self {
        Self::with_tags(&rows.iter().map(|&(id, e)| (id, e, vec![])).collect::<Vec<_>>())
    }

    pub fn with_tags(rows: &[(i64, &str, Vec<Tag>)]) -> Self {
        Self {
            rows: Mutex::new(
                rows.iter()
                    .map(|(id, e, tags)| StoredCase {
                        id: *id,
                        product_name: format!("產品{id}"),
                        explanation: e.to_string(),
                        tags: tags.clone(),
                    })
                    .collect(),
            ),
            commits: Mutex::new(Vec::new()),
            commit_failures: Mutex::new(0),
        }
    }

    pub fn tags_of(&self, id: i64) -> Vec<String> {
        let rows = self.rows.lock().unwrap();
        rows.iter()
            .find(|r| r.id == id)
            .map(|r| r.tags.iter().map(|t| t.name().to_string()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CaseStore for MemoryCases {
    async fn count_total(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn count_where_tag_set(&self, tag: &Tag) -> Result<u64, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|r| r.tags.contains(tag)).count() as u64)
    }

    async fn list_untagged(&self, after_id: i64, limit: usize) -> Result<Vec<CaseRow>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<CaseRow> = rows
            .iter()
            .filter(|r| r.id > after_id && r.tags.is_empty())
            .map(|r| CaseRow {
                id: r.id,
                product_name: r.product_name.clone(),
                explanation: r.explanation.clone(),
            })
            .collect();
        out.sort_by_key(|r| r.id);
        out.truncate(limit);
        Ok(out)
    }

    async fn list_tagged(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<HistoricalCase>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<HistoricalCase> = rows
            .iter()
            .filter(|r| r.id > after_id && !r.tags.is_empty())
            .map(|r| HistoricalCase {
                id: r.id,
                product_name: r.product_name.clone(),
                explanation: r.explanation.clone(),
                law: "食品安全衛生管理法第28條".into(),
                date: "2024-01".into(),
                link: format!("https://example.gov.tw/{}", r.id),
                industry: Industry::Food,
                tags: r.tags.clone(),
            })
            .collect();
        out.sort_by_key(|c| c.id);
        out.truncate(limit);
        Ok(out)
    }

    async fn set_tag_columns(&self, assignments: &[TagAssignment]) -> Result<usize, StoreError> {
        {
            let mut failures = self.commit_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Other("database is locked".into()));
            }
        }
        let mut rows = self.rows.lock().unwrap();
        let mut updated = 0;
        for a in assignments {
            if let Some(row) = rows.iter_mut().find(|r| r.id == a.case_id) {
                for tag in &a.tags {
                    if !row.tags.contains(tag) {
                        row.tags.push(tag.clone());
                    }
                }
                updated += 1;
            }
        }
        self.commits.lock().unwrap().push(assignments.len());
        Ok(updated)
    }
}

/// Tags any text containing `KETO` as 燃脂瘦身, fails on `BROKEN`, and finds
/// nothing in anything else.
pub struct KeywordGenerator;

#[async_trait]
impl Generator for KeywordGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, AiError> {
        let prompt = &request.user_prompt;
        let text = if prompt.contains("BROKEN") {
            return Err(AiError::Api { status: 500, body: "internal".into() });
        } else if prompt.contains("KETO") {
            r#"{"industry":"Food","identified_tags":[{"tag":"燃脂瘦身","trigger_words":["KETO"]}]}"#
        } else {
            r#"{"industry":"Food","identified_tags":[]}"#
        };
        Ok(GenerateResponse {
            text: text.to_string(),
            tokens_used: 0,
        })
    }

    fn model_id(&self) -> &str {
        "keyword"
    }
}

/// Embeds text as `[len, 1.0]`; fails for text containing `BROKEN`.
pub struct LengthEmbedder {
    pub calls: Mutex<Vec<EmbedPurpose>>,
}

impl LengthEmbedder {
    pub fn new() -> Self {
        Self { calls: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl Embed for LengthEmbedder {
    async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, AiError> {
        self.calls.lock().unwrap().push(purpose);
        if text.contains("BROKEN") {
            return Err(AiError::Api { status: 429, body: "quota".into() });
        }
        Ok(vec![text.chars().count() as f32, 1.0])
    }

    fn dim(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "length"
    }
}

/// Vector index that records upserted batches. Upserts fail while
/// `upsert_failures` is positive.
pub struct RecordingIndex {
    pub batches: Mutex<Vec<Vec<CaseVector>>>,
    pub upsert_failures: Mutex<u32>,
}

impl RecordingIndex {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            upsert_failures: Mutex::new(0),
        }
    }

    pub fn ids(&self) -> Vec<i64> {
        let batches = self.batches.lock().unwrap();
        batches.iter().flatten().map(|v| v.case.id).collect()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn query(
        &self,
        _: &[f32],
        _: usize,
        _: &VectorFilter,
    ) -> Result<Vec<RetrievedCase>, StoreError> {
        Ok(vec![])
    }

    async fn upsert(&self, records: &[CaseVector]) -> Result<usize, StoreError> {
        {
            let mut failures = self.upsert_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Other("index unavailable".into()));
            }
        }
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(records.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.ids().len())
    }
}

pub fn tag(name: &str) -> Tag {
    TagRegistry::builtin()
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("unknown tag {name}"))
}
