//! Copy tagged cases from the relational store into the vector index.

use std::sync::Arc;
use std::time::Duration;

use adsentry_ai::{AiError, Embed, EmbedPurpose};
use adsentry_core::RetryPolicy;
use adsentry_store::{CaseStore, CaseVector, VectorIndex};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Tagged cases read from the store.
    pub scanned: usize,
    /// Cases written to the index.
    pub upserted: usize,
    /// Cases with a blank explanation.
    pub skipped_blank: usize,
    /// Cases whose embedding failed after retries.
    pub failed: usize,
    pub batches: usize,
}

/// Embeds case explanations as documents and upserts them by case id, so
/// re-running over already indexed cases replaces their vectors.
pub struct IndexSync {
    store: Arc<dyn CaseStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embed>,
    batch_size: usize,
    embed_timeout: Duration,
    embed_retry: RetryPolicy,
    upsert_retry: RetryPolicy,
}

impl IndexSync {
    pub fn new(
        store: Arc<dyn CaseStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embed>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            embed_timeout: Duration::from_secs(10),
            embed_retry: RetryPolicy::embedding(),
            upsert_retry: RetryPolicy::storage(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, embed: RetryPolicy, upsert: RetryPolicy) -> Self {
        self.embed_retry = embed;
        self.upsert_retry = upsert;
        self
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let embedder = &self.embedder;
        let timeout = self.embed_timeout;
        self.embed_retry
            .run("embed_document", || async move {
                tokio::time::timeout(timeout, embedder.embed(text, EmbedPurpose::Document))
                    .await
                    .map_err(|_| AiError::Timeout(timeout))?
            })
            .await
    }

    /// Index every tagged case. Embedding failures skip the case; listing or
    /// upsert failures abort the run.
    pub async fn run(&self) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        let mut after_id = 0;
        let model = self.embedder.model_id().to_string();

        loop {
            let cases = self
                .store
                .list_tagged(after_id, self.batch_size)
                .await
                .with_context(|| format!("failed to list tagged cases after id {after_id}"))?;
            let Some(last) = cases.last() else { break };
            after_id = last.id;
            let fetched = cases.len();

            let mut records = Vec::with_capacity(fetched);
            for case in cases {
                stats.scanned += 1;
                if case.explanation.trim().is_empty() {
                    stats.skipped_blank += 1;
                    continue;
                }
                match self.embed_document(&case.explanation).await {
                    Ok(embedding) => records.push(CaseVector {
                        case,
                        embedding,
                        model: model.clone(),
                    }),
                    Err(e) => {
                        stats.failed += 1;
                        warn!(case_id = case.id, error = %e, "embedding failed, skipping case");
                    }
                }
            }

            if !records.is_empty() {
                let index = &self.index;
                let batch = &records;
                let written = self
                    .upsert_retry
                    .run("upsert_vectors", || async move { index.upsert(batch).await })
                    .await
                    .with_context(|| format!("failed to upsert batch ending at id {after_id}"))?;
                stats.upserted += written;
            }
            stats.batches += 1;
            info!(
                batch = stats.batches,
                scanned = stats.scanned,
                upserted = stats.upserted,
                "synced batch"
            );

            if fetched < self.batch_size {
                break;
            }
        }

        info!(
            scanned = stats.scanned,
            upserted = stats.upserted,
            failed = stats.failed,
            model = %model,
            "index sync complete"
        );
        Ok(stats)
    }
}
