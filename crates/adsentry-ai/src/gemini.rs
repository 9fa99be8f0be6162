//! HTTP client for the Gemini generative language API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AiError, Embed, EmbedPurpose, GenerateRequest, GenerateResponse, Generator};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
pub const DEFAULT_EMBED_DIM: usize = 768;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embed_model: String,
    pub embed_dim: usize,
    /// Transport-level timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            embed_dim: DEFAULT_EMBED_DIM,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Gemini client implementing both [`Generator`] and [`Embed`].
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

// ── Wire types ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentBody<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let config = GeminiConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.config.base_url)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, AiError> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.config.request_timeout)
                } else {
                    AiError::Http(e)
                }
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn generate_body(request: &GenerateRequest) -> GenerateContentBody<'_> {
    let system_instruction = (!request.system_prompt.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part {
            text: &request.system_prompt,
        }],
    });
    GenerateContentBody {
        system_instruction,
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: &request.user_prompt,
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            response_mime_type: request.json_output.then_some("application/json"),
        },
    }
}

fn response_text(resp: GenerateContentResponse) -> Result<GenerateResponse, AiError> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(GenerateResponse {
        text,
        tokens_used: resp.usage_metadata.map(|u| u.total_token_count).unwrap_or(0),
    })
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, AiError> {
        let url = self.endpoint(&self.config.model, "generateContent");
        let resp: GenerateContentResponse = self.post(&url, &generate_body(request)).await?;
        let out = response_text(resp)?;
        debug!(model = %self.config.model, tokens = out.tokens_used, "generation complete");
        Ok(out)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Embed for GeminiClient {
    async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, AiError> {
        let model = &self.config.embed_model;
        let url = self.endpoint(model, "embedContent");
        let body = EmbedContentBody {
            model: format!("models/{model}"),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: purpose.task_type(),
            output_dimensionality: Some(self.config.embed_dim),
        };
        let resp: EmbedContentResponse = self.post(&url, &body).await?;
        let values = resp.embedding.values;
        if values.len() != self.config.embed_dim {
            return Err(AiError::DimensionMismatch {
                expected: self.config.embed_dim,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    fn dim(&self) -> usize {
        self.config.embed_dim
    }

    fn model_id(&self) -> &str {
        &self.config.embed_model
    }
}
