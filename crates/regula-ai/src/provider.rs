//! Provider seams: text embedding and text generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension of every vector this provider returns.
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Produces text from a prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub user_prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    /// Ask the model for a JSON document instead of free text.
    pub json_mode: bool,
    pub max_tokens: u32,
}

impl GenerateRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            system_prompt: None,
            temperature: 0.7,
            json_mode: false,
            max_tokens: 8192,
        }
    }

    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token counts reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = GenerateRequest::new("Quais são os prazos?")
            .system("Você é um especialista")
            .temperature(0.3)
            .json()
            .max_tokens(1024);
        assert_eq!(req.user_prompt, "Quais são os prazos?");
        assert_eq!(req.system_prompt.as_deref(), Some("Você é um especialista"));
        assert_eq!(req.temperature, 0.3);
        assert!(req.json_mode);
        assert_eq!(req.max_tokens, 1024);
    }

    #[test]
    fn request_defaults() {
        let req = GenerateRequest::new("q");
        assert!(req.system_prompt.is_none());
        assert!(!req.json_mode);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 8192);
    }
}
