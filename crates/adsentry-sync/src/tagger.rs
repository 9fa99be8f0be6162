//! Tag historical cases that have no tag flags yet.

use std::sync::Arc;

use adsentry_ai::TagIdentifier;
use adsentry_core::{RetryPolicy, Tag};
use adsentry_store::{CaseStore, TagAssignment};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaggerStats {
    /// Untagged cases fetched.
    pub scanned: usize,
    /// Cases whose tag flags were written.
    pub tagged: usize,
    /// Cases with a blank explanation.
    pub skipped_blank: usize,
    /// Cases the identifier found no tag for, including failed calls.
    pub skipped_untagged: usize,
    pub batches: usize,
}

/// Runs the identification stage over untagged cases and writes the
/// resulting tag flags back, one transaction per batch.
pub struct BacklogTagger {
    store: Arc<dyn CaseStore>,
    identifier: TagIdentifier,
    batch_size: usize,
    max_total: Option<usize>,
    commit_retry: RetryPolicy,
}

impl BacklogTagger {
    pub fn new(store: Arc<dyn CaseStore>, identifier: TagIdentifier) -> Self {
        Self {
            store,
            identifier,
            batch_size: DEFAULT_BATCH_SIZE,
            max_total: None,
            commit_retry: RetryPolicy::storage(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stop after scanning this many cases.
    pub fn with_max_total(mut self, max_total: Option<usize>) -> Self {
        self.max_total = max_total;
        self
    }

    pub fn with_commit_retry(mut self, retry: RetryPolicy) -> Self {
        self.commit_retry = retry;
        self
    }

    /// Tag untagged cases until none remain or `max_total` is reached.
    ///
    /// A failed identification only skips its case. Listing or committing
    /// failures abort the run; batches already committed stay committed.
    pub async fn run(&self) -> Result<TaggerStats> {
        let mut stats = TaggerStats::default();
        let mut after_id = 0;

        loop {
            let limit = match self.max_total {
                Some(max) => self.batch_size.min(max.saturating_sub(stats.scanned)),
                None => self.batch_size,
            };
            if limit == 0 {
                break;
            }

            let rows = self
                .store
                .list_untagged(after_id, limit)
                .await
                .with_context(|| format!("failed to list untagged cases after id {after_id}"))?;
            let Some(last) = rows.last() else { break };
            after_id = last.id;

            let mut assignments = Vec::new();
            for row in &rows {
                stats.scanned += 1;
                if row.explanation.trim().is_empty() {
                    stats.skipped_blank += 1;
                    debug!(case_id = row.id, "skipping case with blank explanation");
                    continue;
                }
                let outcome = self.identifier.identify(&row.explanation).await;
                let tags: Vec<Tag> = outcome.identification.tags().cloned().collect();
                if tags.is_empty() {
                    stats.skipped_untagged += 1;
                    debug!(case_id = row.id, "no tags identified");
                    continue;
                }
                debug!(case_id = row.id, tags = tags.len(), "identified tags");
                assignments.push(TagAssignment {
                    case_id: row.id,
                    tags,
                });
            }

            if !assignments.is_empty() {
                let store = &self.store;
                let batch = &assignments;
                let updated = self
                    .commit_retry
                    .run("set_tag_columns", || async move { store.set_tag_columns(batch).await })
                    .await
                    .with_context(|| format!("failed to commit tags for batch ending at id {after_id}"))?;
                stats.tagged += updated;
            }
            stats.batches += 1;
            info!(
                batch = stats.batches,
                scanned = stats.scanned,
                tagged = stats.tagged,
                "tagged batch"
            );

            if rows.len() < limit {
                break;
            }
        }

        info!(
            scanned = stats.scanned,
            tagged = stats.tagged,
            skipped_blank = stats.skipped_blank,
            skipped_untagged = stats.skipped_untagged,
            "backlog tagging complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KeywordGenerator, MemoryCases, tag};
    use adsentry_core::TagRegistry;
    use std::time::Duration;

    fn tagger(store: Arc<MemoryCases>) -> BacklogTagger {
        let identifier = TagIdentifier::new(
            Arc::new(KeywordGenerator),
            Arc::new(TagRegistry::builtin()),
            Duration::from_secs(1),
        );
        BacklogTagger::new(store, identifier).with_commit_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn tags_matching_cases_and_skips_the_rest() {
        let store = Arc::new(MemoryCases::untagged(&[
            (1, "宣稱KETO燃脂"),
            (2, "   "),
            (3, "一般營養補充"),
            (4, "BROKEN"),
            (5, "KETO窈窕"),
        ]));
        let stats = tagger(store.clone()).with_batch_size(2).run().await.unwrap();

        assert_eq!(
            stats,
            TaggerStats {
                scanned: 5,
                tagged: 2,
                skipped_blank: 1,
                skipped_untagged: 2,
                batches: 3,
            }
        );
        assert_eq!(store.tags_of(1), vec!["燃脂瘦身"]);
        assert!(store.tags_of(3).is_empty());
        assert_eq!(store.tags_of(5), vec!["燃脂瘦身"]);
        // Batch {3, 4} had nothing to write.
        assert_eq!(*store.commits.lock().unwrap(), vec![1, 1]);
    }

    #[tokio::test]
    async fn max_total_bounds_the_run() {
        let store = Arc::new(MemoryCases::untagged(&[
            (1, "KETO"),
            (2, "KETO"),
            (3, "KETO"),
        ]));
        let stats = tagger(store.clone())
            .with_batch_size(2)
            .with_max_total(Some(2))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.tagged, 2);
        assert!(store.tags_of(3).is_empty());
    }

    #[tokio::test]
    async fn rerun_only_sees_remaining_untagged() {
        let store = Arc::new(MemoryCases::with_tags(&[
            (1, "KETO", vec![tag("保證承諾")]),
            (2, "KETO", vec![]),
        ]));
        let stats = tagger(store.clone()).run().await.unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(store.tags_of(1), vec!["保證承諾"]);
        assert_eq!(store.tags_of(2), vec!["燃脂瘦身"]);
    }

    #[tokio::test]
    async fn transient_commit_failure_is_retried() {
        let store = Arc::new(MemoryCases::untagged(&[(1, "KETO")]));
        *store.commit_failures.lock().unwrap() = 1;
        let stats = tagger(store.clone()).run().await.unwrap();
        assert_eq!(stats.tagged, 1);
    }

    #[tokio::test]
    async fn persistent_commit_failure_aborts() {
        let store = Arc::new(MemoryCases::untagged(&[(1, "KETO")]));
        *store.commit_failures.lock().unwrap() = 5;
        let err = tagger(store.clone()).run().await.unwrap_err();
        assert!(err.to_string().contains("failed to commit tags"));
        assert!(store.tags_of(1).is_empty());
    }
}
