//! Request state machine: identify → filter → retrieve → aggregate → advise → assemble.

use std::fmt;
use std::sync::Arc;

use adsentry_ai::{AdvisoryGenerator, TagIdentifier};
use adsentry_core::{Advisory, ComplianceReport, Tag, ValidationError, validate_text};
use tracing::{debug, info, warn};

use crate::{AppContext, EvidenceRetriever, RiskAggregator, RiskAssessment, assemble};

/// Pipeline stages, in order. `Failed` is only reachable from `Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Identifying,
    Filtering,
    Retrieving,
    Aggregating,
    Advising,
    Assembled,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Identifying => "identifying",
            Self::Filtering => "filtering",
            Self::Retrieving => "retrieving",
            Self::Aggregating => "aggregating",
            Self::Advising => "advising",
            Self::Assembled => "assembled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: Stage) {
    debug!(stage = %stage, "pipeline stage");
}

/// The compliance-check pipeline. Cheap to share: holds only `Arc`s.
pub struct Pipeline {
    ctx: Arc<AppContext>,
    identifier: TagIdentifier,
    advisor: AdvisoryGenerator,
    retriever: EvidenceRetriever,
    risk: RiskAggregator,
}

impl Pipeline {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let s = &ctx.settings;
        let identifier = TagIdentifier::new(
            ctx.generator.clone(),
            ctx.registry.clone(),
            s.generation_timeout,
        )
        .with_retry(s.generation_retry);
        let advisor = AdvisoryGenerator::new(
            ctx.generator.clone(),
            ctx.registry.clone(),
            s.generation_timeout,
        )
        .with_retry(s.generation_retry);
        let retriever = EvidenceRetriever::new(
            ctx.embedder.clone(),
            ctx.index.clone(),
            s.embedding_timeout,
            s.storage_timeout,
        );
        let risk = RiskAggregator::new(
            ctx.cases.clone(),
            ctx.registry.clone(),
            s.risk_policy,
            s.storage_timeout,
        );
        Self {
            ctx,
            identifier,
            advisor,
            retriever,
            risk,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Run one compliance check on `text`.
    ///
    /// Fails only when `text` is empty or whitespace. Every later stage
    /// degrades to a neutral result on upstream failure.
    pub async fn check(&self, text: &str) -> Result<ComplianceReport, ValidationError> {
        enter(Stage::Received);
        let text = match validate_text(text) {
            Ok(t) => t,
            Err(e) => {
                enter(Stage::Failed);
                return Err(e);
            }
        };

        enter(Stage::Identifying);
        let outcome = self.identifier.identify(text).await;
        let mut identification = outcome.identification;
        let mut dropped = outcome.dropped;

        enter(Stage::Filtering);
        for name in identification.retain_known(&self.ctx.registry) {
            warn!(tag = %name, "dropped tag issued by a different taxonomy");
            if !dropped.contains(&name) {
                dropped.push(name);
            }
        }
        let tags: Vec<Tag> = identification.tags().cloned().collect();
        info!(
            industry = %identification.industry,
            tags = tags.len(),
            dropped = dropped.len(),
            "identification complete"
        );

        if tags.is_empty() {
            // Nothing to retrieve, score or advise on.
            enter(Stage::Aggregating);
            enter(Stage::Advising);
            enter(Stage::Assembled);
            let mut report = ComplianceReport::clean(identification.industry);
            report.dropped_tags = dropped;
            return Ok(report);
        }

        enter(Stage::Retrieving);
        let settings = &self.ctx.settings;
        let industry = if settings.filter_by_industry {
            identification.industry.known()
        } else {
            None
        };
        let embedding = self.retriever.embed_query(text).await;
        let evidence = self
            .retriever
            .gather(embedding.as_deref(), &tags, industry, settings.top_k)
            .await;

        enter(Stage::Aggregating);
        let risk: RiskAssessment = self.risk.assess(&tags).await;

        enter(Stage::Advising);
        let advisory: Advisory = self.advisor.advise(text, &identification, &evidence).await;

        let report = assemble(text, &identification, dropped, &risk, &evidence, &advisory);
        enter(Stage::Assembled);
        info!(
            risk = report.risk,
            level = report.risk_level.as_str(),
            highlights = report.highlights.len(),
            "compliance check complete"
        );
        Ok(report)
    }
}
