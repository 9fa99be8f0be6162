use async_trait::async_trait;

use crate::AiError;

/// What an embedding is for. Asymmetric models embed queries and stored
/// documents differently; symmetric ones ignore this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPurpose {
    Query,
    Document,
}

impl EmbedPurpose {
    /// Task type name understood by the Gemini embedding API.
    pub fn task_type(&self) -> &'static str {
        match self {
            Self::Query => "RETRIEVAL_QUERY",
            Self::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

/// A text-embedding backend.
///
/// Queries and indexed documents must be embedded by the same model, so the
/// index records [`model_id`](Embed::model_id) next to each vector.
#[async_trait]
pub trait Embed: Send + Sync {
    async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, AiError>;

    fn dim(&self) -> usize;

    fn model_id(&self) -> &str;
}
