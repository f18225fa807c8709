//! Stand-in provider used when no Gemini key is configured, so commands that
//! only touch the database still run.

use async_trait::async_trait;
use regula_ai::{EmbeddingProvider, GenerateRequest, Generation, GenerationProvider, ProviderError};

pub struct MissingProvider {
    dim: usize,
}

impl MissingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn unavailable() -> ProviderError {
        ProviderError::Unavailable("GEMINI_API_KEY is not set".into())
    }
}

#[async_trait]
impl EmbeddingProvider for MissingProvider {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(Self::unavailable())
    }
}

#[async_trait]
impl GenerationProvider for MissingProvider {
    async fn generate(&self, _request: &GenerateRequest) -> Result<Generation, ProviderError> {
        Err(Self::unavailable())
    }
}
