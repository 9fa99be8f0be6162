use std::sync::Arc;
use std::time::Duration;

use adsentry_ai::{Embed, Generator};
use adsentry_core::{RetryPolicy, RiskPolicy, TagRegistry};
use adsentry_store::{CaseStore, VectorIndex};

/// Tunables for one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Per-attempt bound on a language-model call. Default 30s.
    pub generation_timeout: Duration,
    /// Bound on embedding the query text. Default 10s.
    pub embedding_timeout: Duration,
    /// Bound on a vector index query or a relational count. Default 5s.
    pub storage_timeout: Duration,
    /// Cases retrieved per identified tag. Default 2.
    pub top_k: usize,
    /// How per-tag risks combine. Default combined probability.
    pub risk_policy: RiskPolicy,
    /// Restrict retrieval to the identified industry when it is known.
    /// Default true.
    pub filter_by_industry: bool,
    /// Retry policy for language-model calls. Default single attempt.
    pub generation_retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(30),
            embedding_timeout: Duration::from_secs(10),
            storage_timeout: Duration::from_secs(5),
            top_k: 2,
            risk_policy: RiskPolicy::default(),
            filter_by_industry: true,
            generation_retry: RetryPolicy::once(),
        }
    }
}

/// Everything a compliance check needs, built once at startup and shared by
/// `Arc` across requests.
pub struct AppContext {
    pub registry: Arc<TagRegistry>,
    pub cases: Arc<dyn CaseStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embed>,
    pub generator: Arc<dyn Generator>,
    pub settings: Settings,
}

impl AppContext {
    pub fn new(
        registry: Arc<TagRegistry>,
        cases: Arc<dyn CaseStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embed>,
        generator: Arc<dyn Generator>,
        settings: Settings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            cases,
            index,
            embedder,
            generator,
            settings,
        })
    }
}
