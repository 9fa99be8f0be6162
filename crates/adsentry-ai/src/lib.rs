//! Model-backed stages: tag identification and advisory generation over a
//! [`Generator`], query and document embeddings over [`Embed`].
//!
//! Both language-model stages treat responses as untrusted input and degrade
//! to neutral results instead of failing the request.

mod advisor;
mod embed;
mod error;
mod gemini;
mod generate;
mod identifier;
pub mod prompts;
mod response;

pub use advisor::{AdvisoryGenerator, MAX_REFERENCES};
pub use embed::{Embed, EmbedPurpose};
pub use error::AiError;
pub use gemini::{
    DEFAULT_BASE_URL, DEFAULT_EMBED_DIM, DEFAULT_EMBED_MODEL, DEFAULT_MODEL, GeminiClient,
    GeminiConfig,
};
pub use generate::{GenerateRequest, GenerateResponse, Generator};
pub use identifier::{IdentifyOutcome, TagIdentifier};
pub use response::{Parsed, parse_json, strip_fences};

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;
