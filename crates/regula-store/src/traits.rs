//! Storage seams: the primary requirement store, the findings log, and the
//! secondary vector index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regula_core::{
    ComplianceFinding, Framework, IndexEntry, Page, Requirement, RequirementPatch, Restrict,
    SearchResult,
};

use crate::{IndexError, StoreError};

/// Parameters of a ranked cosine scan over the primary store.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
    pub vector: &'a [f32],
    pub framework: Option<Framework>,
    /// Tenant whose private requirements are visible in addition to the global corpus.
    pub tenant_id: Option<&'a str>,
    pub threshold: f32,
    pub limit: usize,
}

/// The relational store of requirements. This is the source of truth for
/// existence and content.
#[async_trait]
pub trait RequirementStore: Send + Sync {
    /// Exact-match lookup on the `(framework, code)` key.
    async fn find_by_code(
        &self,
        framework: Framework,
        code: &str,
    ) -> Result<Option<Requirement>, StoreError>;

    /// Fetch one requirement, including its embedding.
    async fn get(&self, id: &str) -> Result<Option<Requirement>, StoreError>;

    /// Fetch several requirements by id. Unknown ids are skipped; order is unspecified.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<Requirement>, StoreError>;

    /// Insert a requirement row without its embedding.
    ///
    /// Fails with [`StoreError::Duplicate`] when `(framework, code)` is taken.
    async fn insert(&self, req: &Requirement) -> Result<(), StoreError>;

    /// Set only the vector columns of an existing requirement.
    async fn set_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        vectorized_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Apply a content edit. Vector columns are left alone.
    async fn update_content(&self, id: &str, patch: &RequirementPatch) -> Result<(), StoreError>;

    /// Newest-first page of requirements, without embeddings.
    async fn list(
        &self,
        framework: Option<Framework>,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Requirement>, StoreError>;

    /// Cosine-ranked scan over vectorized requirements.
    ///
    /// Results have `similarity >= threshold`, are ordered by descending
    /// similarity (ties by id), and number at most `limit`.
    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchResult>, StoreError>;

    /// Every vectorized requirement, embeddings included.
    async fn vectorized(&self) -> Result<Vec<Requirement>, StoreError>;
}

/// Append-only log of compliance findings.
#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn insert_findings(&self, findings: &[ComplianceFinding]) -> Result<(), StoreError>;

    /// All findings recorded for an entity, newest first.
    async fn findings_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ComplianceFinding>, StoreError>;
}

/// A neighbour returned by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    /// Cosine distance to the query vector.
    pub distance: f32,
}

/// Derived, rebuildable projection of vectorized requirements used for fast
/// candidate discovery. Never authoritative for existence or content.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Insert or replace the entry with `entry.id`.
    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexError>;

    /// Nearest entries visible under `restricts`, by ascending distance.
    async fn search(
        &self,
        vector: &[f32],
        restricts: &[Restrict],
        limit: usize,
    ) -> Result<Vec<IndexMatch>, IndexError>;

    /// Remove the entry with `id`. Removing an absent entry is not an error.
    async fn delete(&self, id: &str) -> Result<(), IndexError>;
}
