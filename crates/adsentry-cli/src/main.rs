mod display;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adsentry_ai::{
    DEFAULT_BASE_URL, DEFAULT_EMBED_DIM, DEFAULT_EMBED_MODEL, DEFAULT_MODEL, Embed, GeminiClient,
    GeminiConfig, OnnxEmbedder, TagIdentifier,
};
use adsentry_core::{RetryPolicy, RiskPolicy, Tag, TagRegistry};
use adsentry_pipeline::{AppContext, Pipeline, RiskAggregator, Settings};
use adsentry_store::{CaseStore, DuckStore, LanceStore, VectorIndex};
use adsentry_sync::{BacklogTagger, IndexSync};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adsentry", version)]
#[command(about = "Advertising compliance checks against Taiwanese health-claim regulations")]
struct Cli {
    /// DuckDB database holding the historical violation cases.
    #[arg(long, env = "ADSENTRY_DB", default_value = "data/adsentry.duckdb", global = true)]
    db: PathBuf,

    /// LanceDB directory holding the case vector index.
    #[arg(long, env = "ADSENTRY_INDEX", default_value = "data/lancedb", global = true)]
    index: PathBuf,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    tuning: TuningArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ModelArgs {
    /// Gemini API key.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    gemini_url: String,

    /// Generation model.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Embedding model. Queries and indexed cases must use the same one.
    #[arg(long, env = "GEMINI_EMBED_MODEL", default_value = DEFAULT_EMBED_MODEL, global = true)]
    embed_model: String,

    #[arg(long, env = "ADSENTRY_EMBED_DIM", default_value_t = DEFAULT_EMBED_DIM, global = true)]
    embed_dim: usize,

    /// Embed locally with an ONNX model directory instead of Gemini.
    #[arg(long, env = "ADSENTRY_ONNX_MODEL", global = true)]
    onnx_model: Option<PathBuf>,
}

#[derive(Args)]
struct TuningArgs {
    /// Per-attempt timeout for generation calls, in seconds.
    #[arg(long, env = "ADSENTRY_GENERATION_TIMEOUT", default_value_t = 30, global = true)]
    generation_timeout: u64,

    /// Timeout for embedding the submitted text, in seconds.
    #[arg(long, env = "ADSENTRY_EMBEDDING_TIMEOUT", default_value_t = 10, global = true)]
    embedding_timeout: u64,

    /// Timeout for index queries and case counts, in seconds.
    #[arg(long, env = "ADSENTRY_STORAGE_TIMEOUT", default_value_t = 5, global = true)]
    storage_timeout: u64,

    /// Attempts per generation call.
    #[arg(long, env = "ADSENTRY_GENERATION_ATTEMPTS", default_value_t = 1, global = true)]
    generation_attempts: u32,

    /// Cases retrieved per identified tag.
    #[arg(long, env = "ADSENTRY_TOP_K", default_value_t = 2, global = true)]
    top_k: usize,

    /// How per-tag risks combine: `max` or `combined-probability`.
    #[arg(long, env = "ADSENTRY_RISK_POLICY", default_value = "combined-probability", global = true)]
    risk_policy: RiskPolicy,

    /// Search cases from every industry, not just the identified one.
    #[arg(long, global = true)]
    all_industries: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check ad copy for violations. Reads stdin when TEXT is absent.
    Check {
        text: Option<String>,
        /// Print the API response JSON instead of a card.
        #[arg(long)]
        json: bool,
    },
    /// List the violation taxonomy.
    Tags,
    /// Show each tag's share of historical cases.
    Risk,
    /// Load historical cases from a Parquet file.
    Import { parquet: PathBuf },
    /// Identify tags for historical cases that have none.
    TagBacklog {
        #[arg(long, default_value_t = adsentry_sync::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Stop after this many cases.
        #[arg(long)]
        max_total: Option<usize>,
    },
    /// Embed tagged cases into the vector index.
    SyncIndex {
        #[arg(long, default_value_t = adsentry_sync::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
}

impl ModelArgs {
    fn gemini(&self) -> Result<Arc<GeminiClient>> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("GOOGLE_API_KEY is not set")?;
        let mut config = GeminiConfig::new(api_key);
        config.base_url = self.gemini_url.clone();
        config.model = self.model.clone();
        config.embed_model = self.embed_model.clone();
        config.embed_dim = self.embed_dim;
        let client = GeminiClient::new(config).context("failed to build Gemini client")?;
        Ok(Arc::new(client))
    }

    /// The ONNX embedder when a model directory is given, otherwise `gemini`
    /// (or a fresh Gemini client).
    fn embedder(&self, gemini: Option<&Arc<GeminiClient>>) -> Result<Arc<dyn Embed>> {
        if let Some(dir) = &self.onnx_model {
            let onnx = OnnxEmbedder::load(dir)
                .with_context(|| format!("failed to load ONNX model from {}", dir.display()))?;
            info!(model = onnx.model_id(), dim = onnx.dim(), "using local embedder");
            let embedder: Arc<dyn Embed> = Arc::new(onnx);
            return Ok(embedder);
        }
        let client = match gemini {
            Some(client) => client.clone(),
            None => self.gemini()?,
        };
        let embedder: Arc<dyn Embed> = client;
        Ok(embedder)
    }
}

impl TuningArgs {
    fn settings(&self) -> Settings {
        Settings {
            generation_timeout: Duration::from_secs(self.generation_timeout),
            embedding_timeout: Duration::from_secs(self.embedding_timeout),
            storage_timeout: Duration::from_secs(self.storage_timeout),
            top_k: self.top_k.max(1),
            risk_policy: self.risk_policy,
            filter_by_industry: !self.all_industries,
            generation_retry: RetryPolicy {
                max_attempts: self.generation_attempts.max(1),
                ..RetryPolicy::generation()
            },
        }
    }
}

fn open_cases(path: &Path, registry: &Arc<TagRegistry>) -> Result<Arc<DuckStore>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = DuckStore::open_persistent(path, registry.clone())
        .with_context(|| format!("failed to open case database {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn open_index(path: &Path, dim: usize) -> Result<Arc<LanceStore>> {
    let index = LanceStore::open(path, dim)
        .await
        .with_context(|| format!("failed to open vector index {}", path.display()))?;
    Ok(Arc::new(index))
}

fn read_text(arg: Option<String>) -> Result<String> {
    match arg {
        Some(text) => Ok(text),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read ad copy from stdin")?;
            Ok(text)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let registry = Arc::new(TagRegistry::builtin());
    let settings = cli.tuning.settings();

    match cli.command {
        Command::Check { text, json } => {
            let text = read_text(text)?;
            let gemini = cli.model.gemini()?;
            let embedder = cli.model.embedder(Some(&gemini))?;
            let cases = open_cases(&cli.db, &registry)?;
            let index = open_index(&cli.index, embedder.dim()).await?;
            let ctx = AppContext::new(registry, cases, index, embedder, gemini, settings);

            let report = Pipeline::new(ctx).check(&text).await?;
            if json {
                let out = serde_json::to_string_pretty(&report.to_api())
                    .context("failed to serialise report")?;
                println!("{out}");
            } else {
                display::print_report_card(&text, &report);
            }
        }

        Command::Tags => display::print_taxonomy(&registry),

        Command::Risk => {
            let cases = open_cases(&cli.db, &registry)?;
            let total = cases.count_total().await.context("failed to count cases")?;
            let tags: Vec<Tag> = registry.iter().cloned().collect();
            let aggregator = RiskAggregator::new(
                cases,
                registry.clone(),
                settings.risk_policy,
                settings.storage_timeout,
            );
            let assessment = aggregator.assess(&tags).await;
            display::print_risk_table(total, &assessment.per_tag);
        }

        Command::Import { parquet } => {
            let cases = open_cases(&cli.db, &registry)?;
            let loaded = cases
                .load_cases_parquet(&parquet)
                .with_context(|| format!("failed to import {}", parquet.display()))?;
            let total = cases.count_total().await.context("failed to count cases")?;
            println!("Imported {loaded} cases ({total} in {}).", cli.db.display());
        }

        Command::TagBacklog {
            batch_size,
            max_total,
        } => {
            let gemini = cli.model.gemini()?;
            let cases = open_cases(&cli.db, &registry)?;
            let identifier = TagIdentifier::new(gemini, registry.clone(), settings.generation_timeout)
                .with_retry(RetryPolicy::generation());
            let stats = BacklogTagger::new(cases, identifier)
                .with_batch_size(batch_size)
                .with_max_total(max_total)
                .run()
                .await?;
            display::print_tagger_stats(&stats);
        }

        Command::SyncIndex { batch_size } => {
            let embedder = cli.model.embedder(None)?;
            let cases = open_cases(&cli.db, &registry)?;
            let index = open_index(&cli.index, embedder.dim()).await?;
            let stats = IndexSync::new(cases, index.clone(), embedder)
                .with_batch_size(batch_size)
                .with_embed_timeout(settings.embedding_timeout)
                .run()
                .await?;
            let indexed = index.count().await.context("failed to count indexed cases")?;
            display::print_sync_stats(&stats, indexed);
        }
    }

    Ok(())
}
