//! Per-tag historical risk and its combination across identified tags.

use std::sync::Arc;
use std::time::Duration;

use adsentry_core::{RiskPolicy, Tag, TagRegistry, TagRisk, prevalence};
use adsentry_store::CaseStore;
use futures::future::join_all;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    /// One entry per distinct tag, in input order.
    pub per_tag: Vec<TagRisk>,
    pub combined: f64,
}

impl RiskAssessment {
    pub fn zero() -> Self {
        Self {
            per_tag: Vec::new(),
            combined: 0.0,
        }
    }

    pub fn risk_of(&self, tag: &Tag) -> f64 {
        self.per_tag
            .iter()
            .find(|r| &r.tag == tag)
            .map_or(0.0, |r| r.risk)
    }
}

/// Computes tag risk as the share of historical cases flagged with the tag.
pub struct RiskAggregator {
    store: Arc<dyn CaseStore>,
    registry: Arc<TagRegistry>,
    policy: RiskPolicy,
    timeout: Duration,
}

impl RiskAggregator {
    pub fn new(
        store: Arc<dyn CaseStore>,
        registry: Arc<TagRegistry>,
        policy: RiskPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            timeout,
        }
    }

    async fn total(&self) -> Option<u64> {
        match tokio::time::timeout(self.timeout, self.store.count_total()).await {
            Ok(Ok(total)) => Some(total),
            Ok(Err(e)) => {
                warn!(error = %e, "could not count historical cases, risk defaults to 0");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "case count timed out, risk defaults to 0");
                None
            }
        }
    }

    async fn tag_risk(&self, tag: &Tag, total: u64) -> f64 {
        if total == 0 || !self.registry.recognises(tag) {
            return 0.0;
        }
        match tokio::time::timeout(self.timeout, self.store.count_where_tag_set(tag)).await {
            Ok(Ok(flagged)) => prevalence(flagged, total),
            Ok(Err(e)) => {
                warn!(tag = %tag, error = %e, "tag count failed, tag risk defaults to 0");
                0.0
            }
            Err(_) => {
                warn!(tag = %tag, "tag count timed out, tag risk defaults to 0");
                0.0
            }
        }
    }

    /// Risk of a single tag. Any storage failure yields 0.0.
    pub async fn risk(&self, tag: &Tag) -> f64 {
        match self.total().await {
            Some(total) => self.tag_risk(tag, total).await,
            None => 0.0,
        }
    }

    /// Per-tag risks and their combination. The total case count is read
    /// once; per-tag counts run concurrently.
    pub async fn assess(&self, tags: &[Tag]) -> RiskAssessment {
        let mut distinct: Vec<&Tag> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !distinct.contains(&tag) {
                distinct.push(tag);
            }
        }
        if distinct.is_empty() {
            return RiskAssessment::zero();
        }

        let total = self.total().await.unwrap_or(0);
        let risks = join_all(distinct.iter().map(|t| self.tag_risk(t, total))).await;
        let per_tag: Vec<TagRisk> = distinct
            .into_iter()
            .zip(risks)
            .map(|(tag, risk)| TagRisk {
                tag: tag.clone(),
                risk,
            })
            .collect();
        let combined = self.policy.combine(per_tag.iter().map(|r| r.risk));
        debug!(tags = per_tag.len(), total, combined, policy = %self.policy, "aggregated risk");
        RiskAssessment { per_tag, combined }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStore;

    fn aggregator(store: CountingStore, policy: RiskPolicy) -> RiskAggregator {
        RiskAggregator::new(
            Arc::new(store),
            Arc::new(TagRegistry::builtin()),
            policy,
            Duration::from_secs(1),
        )
    }

    fn tags(reg: &TagRegistry, names: &[&str]) -> Vec<Tag> {
        names.iter().map(|n| reg.get(n).unwrap().clone()).collect()
    }

    #[tokio::test]
    async fn empty_set_is_zero() {
        let agg = aggregator(CountingStore::new(100, &[]), RiskPolicy::default());
        assert_eq!(agg.assess(&[]).await, RiskAssessment::zero());
    }

    #[tokio::test]
    async fn single_tag_equals_its_prevalence() {
        let reg = TagRegistry::builtin();
        let agg = aggregator(
            CountingStore::new(200, &[("tag_slimming", 50)]),
            RiskPolicy::CombinedProbability,
        );
        let t = tags(&reg, &["燃脂瘦身"]);
        let assessment = agg.assess(&t).await;
        assert_eq!(assessment.combined, 0.25);
        assert_eq!(agg.risk(&t[0]).await, 0.25);
    }

    #[tokio::test]
    async fn combined_probability_compounds() {
        let reg = TagRegistry::builtin();
        let agg = aggregator(
            CountingStore::new(10, &[("tag_slimming", 5), ("tag_guarantee", 5)]),
            RiskPolicy::CombinedProbability,
        );
        let assessment = agg.assess(&tags(&reg, &["燃脂瘦身", "保證承諾", "燃脂瘦身"])).await;
        assert_eq!(assessment.per_tag.len(), 2);
        assert!((assessment.combined - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn max_policy_takes_worst_tag() {
        let reg = TagRegistry::builtin();
        let agg = aggregator(
            CountingStore::new(10, &[("tag_slimming", 2), ("tag_guarantee", 6)]),
            RiskPolicy::Max,
        );
        let assessment = agg.assess(&tags(&reg, &["燃脂瘦身", "保證承諾"])).await;
        assert!((assessment.combined - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_historical_cases_gives_zero_risk() {
        let reg = TagRegistry::builtin();
        let agg = aggregator(
            CountingStore::new(0, &[("tag_slimming", 3)]),
            RiskPolicy::default(),
        );
        let assessment = agg.assess(&tags(&reg, &["燃脂瘦身", "發炎"])).await;
        assert!(assessment.per_tag.iter().all(|r| r.risk == 0.0));
        assert_eq!(assessment.combined, 0.0);
    }

    #[tokio::test]
    async fn failing_tag_count_contributes_zero() {
        let reg = TagRegistry::builtin();
        let mut store = CountingStore::new(10, &[("tag_slimming", 5), ("tag_guarantee", 5)]);
        store.failing_columns.push("tag_guarantee".into());
        let agg = aggregator(store, RiskPolicy::default());
        let t = tags(&reg, &["燃脂瘦身", "保證承諾"]);
        let assessment = agg.assess(&t).await;
        assert_eq!(assessment.risk_of(&t[1]), 0.0);
        assert_eq!(assessment.combined, 0.5);
    }

    #[tokio::test]
    async fn failing_total_zeroes_everything() {
        let reg = TagRegistry::builtin();
        let mut store = CountingStore::new(10, &[("tag_slimming", 5)]);
        store.total = Err(());
        let agg = aggregator(store, RiskPolicy::default());
        let assessment = agg.assess(&tags(&reg, &["燃脂瘦身"])).await;
        assert_eq!(assessment.combined, 0.0);
    }

    #[tokio::test]
    async fn foreign_tag_is_identity() {
        let reg = TagRegistry::builtin();
        let foreign = TagRegistry::from_table([("其他", "高風險疾病", "tag_slimming")]).unwrap();
        let agg = aggregator(
            CountingStore::new(10, &[("tag_slimming", 5)]),
            RiskPolicy::default(),
        );
        let mut t = tags(&reg, &["保證承諾"]);
        t.push(foreign.get("高風險疾病").unwrap().clone());
        let assessment = agg.assess(&t).await;
        assert_eq!(assessment.combined, 0.0);
    }
}
