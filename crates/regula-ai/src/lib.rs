//! Embedding and generation providers: Gemini over REST, ONNX Runtime for local embeddings.

mod error;
pub mod json;
mod provider;
mod retry;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "gemini")]
pub mod gemini;

pub use error::ProviderError;
pub use json::parse_json_output;
pub use provider::{EmbeddingProvider, GenerateRequest, Generation, GenerationProvider, Usage};
pub use retry::RetryPolicy;

#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;
#[cfg(feature = "gemini")]
pub use gemini::{GeminiClient, GeminiConfig};
