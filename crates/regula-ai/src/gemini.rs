//! Google Gemini client for embeddings and text generation (Generative Language REST API).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    EmbeddingProvider, GenerateRequest, Generation, GenerationProvider, ProviderError,
    RetryPolicy, Usage,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Base URL without trailing slash.
    pub base_url: String,
    pub generation_model: String,
    pub embedding_model: String,
    /// Dimension of vectors returned by `embedding_model`.
    pub embedding_dim: usize,
    pub retry: RetryPolicy,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            generation_model: "gemini-1.5-pro".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dim: 768,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{model}:{method}",
            self.base_url.trim_end_matches('/')
        )
    }
}

// ── Wire types ──

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    fn from_request(req: &GenerateRequest) -> Self {
        Self {
            contents: vec![Content::text(Some("user"), &req.user_prompt)],
            system_instruction: req.system_prompt.as_deref().map(|s| Content::text(None, s)),
            generation_config: GenerationConfig {
                temperature: req.temperature,
                max_output_tokens: req.max_tokens,
                response_mime_type: req.json_mode.then_some("application/json"),
            },
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateContentResponse {
    fn into_generation(self) -> Result<Generation, ProviderError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no candidates".into()))?;
        let content = candidate.content.ok_or_else(|| {
            ProviderError::Malformed(format!(
                "candidate has no content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        let usage = self.usage_metadata.unwrap_or_default();
        Ok(Generation {
            text,
            usage: Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
        })
    }
}

#[derive(Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

/// Gemini REST client. Implements both provider traits.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Unavailable("GEMINI_API_KEY is not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn post_once<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        call: &str,
        url: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        self.config
            .retry
            .run(call, move || self.post_once(url, body))
            .await
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let model = &self.config.embedding_model;
        let body = EmbedContentRequest {
            model: format!("models/{model}"),
            content: Content::text(None, text),
        };
        let resp: EmbedContentResponse = self
            .post("embed", &self.config.model_url(model, "embedContent"), &body)
            .await?;
        let values = resp
            .embedding
            .map(|e| e.values)
            .ok_or_else(|| ProviderError::Malformed("response has no embedding".into()))?;
        if values.len() != self.config.embedding_dim {
            return Err(ProviderError::Malformed(format!(
                "embedding has {} dimensions, expected {}",
                values.len(),
                self.config.embedding_dim
            )));
        }
        debug!(model = %model, chars = text.len(), "embedded text");
        Ok(values)
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let model = &self.config.generation_model;
        let body = GenerateContentRequest::from_request(request);
        let resp: GenerateContentResponse = self
            .post("generate", &self.config.model_url(model, "generateContent"), &body)
            .await?;
        let generation = resp.into_generation()?;
        info!(
            model = %model,
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            json = request.json_mode,
            "gemini generation complete"
        );
        Ok(generation)
    }
}
