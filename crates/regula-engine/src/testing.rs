//! Fakes shared by the engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regula_ai::{
    EmbeddingProvider, GenerateRequest, Generation, GenerationProvider, ProviderError, Usage,
};
use regula_core::{EngineConfig, Framework, IndexEntry, NewRequirement, Restrict};
use regula_store::{IndexError, IndexMatch, MemoryStore, VectorIndex};
use tokio::time::Instant;

use crate::Engine;

pub const DIM: usize = 8;

/// Embedder with fixed vectors for known texts and a deterministic
/// text-derived vector for everything else.
#[derive(Default)]
pub struct FakeEmbedder {
    fixtures: HashMap<String, Vec<f32>>,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeEmbedder {
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixtures.insert(text.to_string(), vector);
        self
    }

    /// Fail any text containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

/// Spread the bytes of `text` over `DIM` buckets.
pub fn derived_vector(text: &str) -> Vec<f32> {
    let mut v = vec![1.0f32; DIM];
    for (i, b) in text.bytes().enumerate() {
        v[i % DIM] += b as f32;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), Instant::now()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.iter().any(|n| text.contains(n.as_str())) {
            return Err(ProviderError::Server {
                status: 503,
                body: "embedding backend down".into(),
            });
        }
        Ok(self
            .fixtures
            .get(text)
            .cloned()
            .unwrap_or_else(|| derived_vector(text)))
    }
}

/// Generator that replays queued replies (or a fixed one) and records requests.
#[derive(Default)]
pub struct FakeGenerator {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeGenerator {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let text = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Resposta gerada.".to_string());
        Ok(Generation {
            text,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 20,
            },
        })
    }
}

/// Index whose every operation fails.
pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn upsert(&self, _entry: IndexEntry) -> Result<(), IndexError> {
        Err(IndexError::Other("index offline".into()))
    }

    async fn search(
        &self,
        _vector: &[f32],
        _restricts: &[Restrict],
        _limit: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        Err(IndexError::Server {
            status: 503,
            body: "index offline".into(),
        })
    }

    async fn delete(&self, _id: &str) -> Result<(), IndexError> {
        Err(IndexError::Other("index offline".into()))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub embedder: Arc<FakeEmbedder>,
    pub generator: Arc<FakeGenerator>,
}

pub fn harness(
    embedder: FakeEmbedder,
    generator: FakeGenerator,
    index: Option<Arc<dyn VectorIndex>>,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let embedder = Arc::new(embedder);
    let generator = Arc::new(generator);
    let config = EngineConfig {
        provider_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(
        store.clone(),
        store.clone(),
        embedder.clone(),
        generator.clone(),
    )
    .with_config(config);
    if let Some(index) = index {
        engine = engine.with_index(index);
    }
    Harness {
        engine,
        store,
        embedder,
        generator,
    }
}

pub fn engine(embedder: FakeEmbedder) -> (Engine, Arc<MemoryStore>, Arc<FakeEmbedder>) {
    let h = harness(embedder, FakeGenerator::default(), None);
    (h.engine, h.store, h.embedder)
}

pub fn engine_with_index(
    embedder: FakeEmbedder,
    index: Arc<dyn VectorIndex>,
) -> (Engine, Arc<MemoryStore>, Arc<FakeEmbedder>) {
    let h = harness(embedder, FakeGenerator::default(), Some(index));
    (h.engine, h.store, h.embedder)
}

pub fn new_req(framework: Framework, code: &str) -> NewRequirement {
    NewRequirement {
        framework,
        code: code.to_string(),
        title: format!("Requisito {code}"),
        description: format!("Descrição do requisito {code} para testes"),
        category: None,
        version: None,
        tenant_id: None,
    }
}

/// Unit vector in the plane of the first two axes with cosine `similarity`
/// to `axis()`.
pub fn at_similarity(similarity: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = similarity;
    v[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    v
}

pub fn axis() -> Vec<f32> {
    at_similarity(1.0)
}

/// Text a requirement built by [`new_req`] is embedded from.
pub fn req_text(code: &str) -> String {
    regula_core::embedding_text(
        &format!("Requisito {code}"),
        &format!("Descrição do requisito {code} para testes"),
    )
}
