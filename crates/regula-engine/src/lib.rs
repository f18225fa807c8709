//! Regulatory knowledge engine: ingestion, semantic retrieval, augmented
//! generation, and compliance scoring over a requirement corpus.
//!
//! The [`Engine`] owns no global state. Stores, the optional vector index, and
//! both providers are constructed by the caller and injected.

mod consult;
mod crosscheck;
mod error;
mod ingest;
mod retrieve;
mod score;
pub mod validate;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use regula_ai::{EmbeddingProvider, GenerateRequest, Generation, GenerationProvider, ProviderError};
use regula_core::restrict::entry_restricts;
use regula_core::{EngineConfig, IndexEntry, Requirement};
use regula_store::{FindingStore, RequirementStore, VectorIndex};
use tracing::warn;

pub use consult::{Citation, ConsultAnswer, ConsultOptions, NO_RULES_ANSWER, SystemInstructions};
pub use crosscheck::{Gap, GapAnalysis, ProcessStep, Severity};
pub use error::EngineError;
pub use ingest::{BatchItemError, BatchSummary, ImportItem, ReindexSummary};
pub use retrieve::SearchOptions;

pub struct Engine {
    requirements: Arc<dyn RequirementStore>,
    findings: Arc<dyn FindingStore>,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    config: EngineConfig,
    instructions: SystemInstructions,
}

impl Engine {
    pub fn new(
        requirements: Arc<dyn RequirementStore>,
        findings: Arc<dyn FindingStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            requirements,
            findings,
            index: None,
            embedder,
            generator,
            config: EngineConfig::default(),
            instructions: SystemInstructions::default(),
        }
    }

    /// Use `index` for candidate discovery and keep it in sync on writes.
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_instructions(mut self, instructions: SystemInstructions) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    // ── Provider calls, bounded by the configured timeout ──

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let limit = self.config.provider_timeout;
        tokio::time::timeout(limit, self.embedder.embed(text))
            .await
            .map_err(|_| ProviderError::Timeout(limit))?
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let limit = self.config.provider_timeout;
        tokio::time::timeout(limit, self.generator.generate(request))
            .await
            .map_err(|_| ProviderError::Timeout(limit))?
    }

    // ── Index sync (best effort) ──

    /// Upsert the index entry for `req`. Failures are logged and reported as `false`.
    async fn index_upsert(&self, req: &Requirement, vector: Vec<f32>) -> bool {
        let Some(index) = &self.index else {
            return false;
        };
        let entry = IndexEntry {
            id: req.id.clone(),
            vector,
            restricts: entry_restricts(req.tenant_id.as_deref(), req.framework),
        };
        match index.upsert(entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(index = index.name(), id = %req.id, error = %e, "index upsert failed");
                false
            }
        }
    }
}
