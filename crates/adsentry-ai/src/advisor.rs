//! Evidence-grounded explanations and rewrites for identified phrases.

use std::sync::Arc;
use std::time::Duration;

use adsentry_core::{
    Advisory, Analysis, CitedCase, EvidenceGroup, Identification, RetrievedCase, RetryPolicy, Tag,
    TagRegistry,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::response::{parse_array_lenient, parse_json};
use crate::{AiError, GenerateRequest, Generator, Parsed, prompts};

/// Cases cited per analysis, at most.
pub const MAX_REFERENCES: usize = 2;

/// Asks a [`Generator`] to explain each trigger phrase using only the
/// retrieved evidence, and to rewrite the whole text.
pub struct AdvisoryGenerator {
    generator: Arc<dyn Generator>,
    registry: Arc<TagRegistry>,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct RawAdvisory {
    #[serde(default)]
    analysis_results: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    rewrite: Option<String>,
}

#[derive(Deserialize)]
struct RawAnalysis {
    trigger_word: String,
    tag: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    law: String,
    #[serde(default)]
    suggestion: String,
    #[serde(default)]
    reference_cases: Option<Vec<serde_json::Value>>,
}

/// Evidence as rendered into the prompt. Source links are left out; they are
/// recovered from the retrieved cases at assembly time.
#[derive(Serialize)]
struct PromptEvidence<'a> {
    tag: &'a str,
    cases: Vec<PromptCase<'a>>,
}

#[derive(Serialize)]
struct PromptCase<'a> {
    product_name: &'a str,
    date: &'a str,
    law: &'a str,
    explanation: &'a str,
}

impl AdvisoryGenerator {
    pub fn new(generator: Arc<dyn Generator>, registry: Arc<TagRegistry>, timeout: Duration) -> Self {
        Self {
            generator,
            registry,
            timeout,
            retry: RetryPolicy::once(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Produce per-phrase analyses and a rewrite of `text`.
    ///
    /// Never fails: any generation or parse failure yields [`Advisory::empty`].
    pub async fn advise(
        &self,
        text: &str,
        identification: &Identification,
        evidence: &[EvidenceGroup],
    ) -> Advisory {
        let request = match build_request(text, identification, evidence) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "could not serialise advisory inputs");
                return Advisory::empty();
            }
        };
        let raw = match self.call(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "advisory generation failed, continuing without analysis");
                return Advisory::empty();
            }
        };
        match parse_advisory(&raw, &self.registry, identification, evidence) {
            Parsed::WellFormed(advisory) => {
                debug!(analyses = advisory.analyses.len(), "advisory parsed");
                advisory
            }
            Parsed::Malformed { reason, raw } => {
                warn!(%reason, raw_len = raw.len(), "malformed advisory response");
                Advisory::empty()
            }
        }
    }

    async fn call(&self, request: &GenerateRequest) -> Result<String, AiError> {
        let generator = &self.generator;
        let timeout = self.timeout;
        let resp = self
            .retry
            .run("advise", || async move {
                tokio::time::timeout(timeout, generator.generate(request))
                    .await
                    .map_err(|_| AiError::Timeout(timeout))?
            })
            .await?;
        Ok(resp.text)
    }
}

fn build_request(
    text: &str,
    identification: &Identification,
    evidence: &[EvidenceGroup],
) -> Result<GenerateRequest, AiError> {
    let groups: Vec<PromptEvidence<'_>> = evidence
        .iter()
        .map(|g| PromptEvidence {
            tag: g.tag.name(),
            cases: g
                .cases
                .iter()
                .map(|c| PromptCase {
                    product_name: &c.product_name,
                    date: &c.date,
                    law: &c.law,
                    explanation: &c.explanation,
                })
                .collect(),
        })
        .collect();
    let identification_json = serde_json::to_string(identification)?;
    let evidence_json = serde_json::to_string(&groups)?;
    Ok(GenerateRequest::json(
        prompts::ADVISE_SYSTEM,
        prompts::advise_prompt(text, &identification_json, &evidence_json),
    ))
}

/// Parse and ground a raw advisory response.
///
/// Drops analyses whose tag is unknown or was not identified. A cited case is
/// kept only when its (product name, date) pair matches a retrieved case;
/// repeated citations collapse to one and at most [`MAX_REFERENCES`] are kept.
pub fn parse_advisory(
    raw: &str,
    registry: &TagRegistry,
    identification: &Identification,
    evidence: &[EvidenceGroup],
) -> Parsed<Advisory> {
    parse_json::<RawAdvisory>(raw).map(|parsed| {
        let raw_analyses: Vec<RawAnalysis> = parse_array_lenient(parsed.analysis_results.as_deref());
        let mut analyses = Vec::with_capacity(raw_analyses.len());

        for item in raw_analyses {
            let trigger_word = item.trigger_word.trim().to_string();
            if trigger_word.is_empty() {
                continue;
            }
            let Some(tag) = registry.get(&item.tag).filter(|t| identification.contains(t)) else {
                info!(tag = %item.tag.trim(), "dropped analysis for unidentified tag");
                continue;
            };

            let cited: Vec<CitedCase> =
                parse_array_lenient(item.reference_cases.as_deref());
            let mut reference_cases: Vec<CitedCase> = Vec::new();
            for case in cited {
                if reference_cases.len() == MAX_REFERENCES {
                    break;
                }
                let Some(found) = ground_citation(&case, tag, evidence) else {
                    info!(
                        product = %case.product_name,
                        date = %case.date,
                        "dropped citation not in evidence"
                    );
                    continue;
                };
                let grounded = CitedCase {
                    product_name: found.product_name.trim().to_string(),
                    date: found.date.trim().to_string(),
                };
                if !reference_cases.contains(&grounded) {
                    reference_cases.push(grounded);
                }
            }

            analyses.push(Analysis {
                trigger_word,
                tag: tag.clone(),
                reason: item.reason.trim().to_string(),
                law: item.law.trim().to_string(),
                suggestion: item.suggestion.trim().to_string(),
                reference_cases,
            });
        }

        let rewrite = parsed
            .rewrite
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        Advisory { analyses, rewrite }
    })
}

/// The retrieved case a citation names: the tag's own evidence first, then
/// any group.
fn ground_citation<'a>(
    cited: &CitedCase,
    tag: &Tag,
    evidence: &'a [EvidenceGroup],
) -> Option<&'a RetrievedCase> {
    evidence
        .iter()
        .filter(|g| &g.tag == tag)
        .chain(evidence.iter().filter(|g| &g.tag != tag))
        .find_map(|g| g.find(&cited.product_name, &cited.date))
}
