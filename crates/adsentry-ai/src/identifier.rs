//! Language-model tag identification constrained to the taxonomy.

use std::sync::Arc;
use std::time::Duration;

use adsentry_core::{Identification, IdentifiedTag, Industry, RetryPolicy, TagRegistry};
use serde::Deserialize;
use tracing::{info, warn};

use crate::response::{parse_array_lenient, parse_json, string_list};
use crate::{AiError, GenerateRequest, Generator, Parsed, prompts};

/// Identification plus the tag names the model produced that are not in the
/// taxonomy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifyOutcome {
    pub identification: Identification,
    pub dropped: Vec<String>,
}

/// Asks a [`Generator`] which taxonomy tags a text triggers.
pub struct TagIdentifier {
    generator: Arc<dyn Generator>,
    registry: Arc<TagRegistry>,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct RawIdentification {
    #[serde(default)]
    industry: Industry,
    #[serde(default)]
    identified_tags: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct RawTag {
    tag: String,
    #[serde(default)]
    trigger_words: Option<serde_json::Value>,
}

impl TagIdentifier {
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

    /// Identify the industry and violation tags of `text`.
    ///
    /// Never fails: generation errors, timeouts and malformed output all yield
    /// [`Identification::degraded`].
    pub async fn identify(&self, text: &str) -> IdentifyOutcome {
        let request = GenerateRequest::json(
            prompts::IDENTIFY_SYSTEM,
            prompts::identify_prompt(&self.registry, text),
        );
        let raw = match self.call(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "tag identification failed, continuing without tags");
                return IdentifyOutcome::default();
            }
        };

        match parse_identification(&raw, &self.registry) {
            Parsed::WellFormed(outcome) => {
                if !outcome.dropped.is_empty() {
                    info!(dropped = ?outcome.dropped, "discarded tags outside the taxonomy");
                }
                outcome
            }
            Parsed::Malformed { reason, raw } => {
                warn!(%reason, raw_len = raw.len(), "malformed identification response");
                IdentifyOutcome::default()
            }
        }
    }

    async fn call(&self, request: &GenerateRequest) -> Result<String, AiError> {
        let generator = &self.generator;
        let timeout = self.timeout;
        let resp = self
            .retry
            .run("identify", || async move {
                tokio::time::timeout(timeout, generator.generate(request))
                    .await
                    .map_err(|_| AiError::Timeout(timeout))?
            })
            .await?;
        Ok(resp.text)
    }
}

/// Turn a raw model response into an identification over `registry`.
///
/// Unknown tags are dropped and reported, repeated tags are merged, trigger
/// words are trimmed and de-duplicated in order, and tags left without
/// trigger words are kept (the locator reports them as not found).
pub fn parse_identification(raw: &str, registry: &TagRegistry) -> Parsed<IdentifyOutcome> {
    parse_json::<RawIdentification>(raw).map(|parsed| {
        let raw_tags: Vec<RawTag> = parse_array_lenient(parsed.identified_tags.as_deref());
        let mut identified: Vec<IdentifiedTag> = Vec::new();
        let mut dropped: Vec<String> = Vec::new();

        for raw_tag in raw_tags {
            let Some(tag) = registry.get(&raw_tag.tag) else {
                let name = raw_tag.tag.trim().to_string();
                if !dropped.contains(&name) {
                    dropped.push(name);
                }
                continue;
            };
            let words = string_list(raw_tag.trigger_words.as_ref());
            let entry = match identified.iter_mut().position(|t| &t.tag == tag) {
                Some(i) => &mut identified[i],
                None => {
                    identified.push(IdentifiedTag {
                        tag: tag.clone(),
                        trigger_words: Vec::new(),
                    });
                    let last = identified.len() - 1;
                    &mut identified[last]
                }
            };
            for word in words {
                let word = word.trim();
                if !word.is_empty() && !entry.trigger_words.iter().any(|w| w == word) {
                    entry.trigger_words.push(word.to_string());
                }
            }
        }

        IdentifyOutcome {
            identification: Identification {
                industry: parsed.industry,
                identified_tags: identified,
            },
            dropped,
        }
    })
}
