use async_trait::async_trait;

use crate::AiError;

/// One prompt for a text-generation model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the backend to constrain output to a JSON document.
    pub json_output: bool,
}

impl GenerateRequest {
    /// A JSON-mode request with low temperature, as both pipeline stages use.
    pub fn json(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            max_tokens: 8192,
            temperature: 0.2,
            json_output: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub tokens_used: u32,
}

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, AiError>;

    /// Model identifier, for logs.
    fn model_id(&self) -> &str;
}
