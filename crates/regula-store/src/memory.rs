//! In-process store and index, for embedded deployments and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regula_core::{
    ComplianceFinding, Framework, IndexEntry, Page, Requirement, RequirementPatch, Restrict,
    SearchResult, cosine_similarity, rank, restrict,
};

use crate::{
    FindingStore, IndexError, IndexMatch, RequirementStore, StoreError, VectorIndex, VectorQuery,
};

/// Whether a requirement owned by `owner` is visible to a caller in `tenant`.
pub(crate) fn visible_to(owner: Option<&str>, tenant: Option<&str>) -> bool {
    match owner {
        None => true,
        Some(o) => tenant == Some(o),
    }
}

/// Requirement store and findings log held in memory.
///
/// The `(framework, code)` key is checked under the write lock, so it is a
/// real constraint, not an advisory check.
#[derive(Default)]
pub struct MemoryStore {
    requirements: RwLock<Vec<Requirement>>,
    findings: RwLock<Vec<ComplianceFinding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requirement_count(&self) -> usize {
        self.requirements.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn finding_count(&self) -> usize {
        self.findings.read().map(|f| f.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Other("memory store lock poisoned".into())
}

#[async_trait]
impl RequirementStore for MemoryStore {
    async fn find_by_code(
        &self,
        framework: Framework,
        code: &str,
    ) -> Result<Option<Requirement>, StoreError> {
        let reqs = self.requirements.read().map_err(poisoned)?;
        Ok(reqs
            .iter()
            .find(|r| r.framework == framework && r.code == code)
            .cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<Requirement>, StoreError> {
        let reqs = self.requirements.read().map_err(poisoned)?;
        Ok(reqs.iter().find(|r| r.id == id).cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Requirement>, StoreError> {
        let reqs = self.requirements.read().map_err(poisoned)?;
        Ok(reqs.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
    }

    async fn insert(&self, req: &Requirement) -> Result<(), StoreError> {
        let mut reqs = self.requirements.write().map_err(poisoned)?;
        if reqs
            .iter()
            .any(|r| r.framework == req.framework && r.code == req.code)
        {
            return Err(StoreError::Duplicate {
                framework: req.framework.to_string(),
                code: req.code.clone(),
            });
        }
        let mut row = req.clone();
        row.embedding = None;
        row.vectorized_at = None;
        reqs.push(row);
        Ok(())
    }

    async fn set_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        vectorized_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(StoreError::NonFiniteVector);
        }
        let mut reqs = self.requirements.write().map_err(poisoned)?;
        let row = reqs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.embedding = Some(embedding.to_vec());
        row.vectorized_at = Some(vectorized_at);
        Ok(())
    }

    async fn update_content(&self, id: &str, patch: &RequirementPatch) -> Result<(), StoreError> {
        let mut reqs = self.requirements.write().map_err(poisoned)?;
        let row = reqs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(row);
        Ok(())
    }

    async fn list(
        &self,
        framework: Option<Framework>,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Requirement>, StoreError> {
        let reqs = self.requirements.read().map_err(poisoned)?;
        // Rows are kept in insertion order; reversing gives newest first even
        // when created_at values collide.
        let matching: Vec<&Requirement> = reqs
            .iter()
            .rev()
            .filter(|r| framework.is_none_or(|f| r.framework == f))
            .collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| Requirement {
                embedding: None,
                ..r.clone()
            })
            .collect();
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchResult>, StoreError> {
        let reqs = self.requirements.read().map_err(poisoned)?;
        let mut results: Vec<SearchResult> = reqs
            .iter()
            .filter(|r| query.framework.is_none_or(|f| r.framework == f))
            .filter(|r| visible_to(r.tenant_id.as_deref(), query.tenant_id))
            .filter_map(|r| {
                let emb = r.embedding.as_ref()?;
                let similarity = cosine_similarity(emb, query.vector);
                (similarity >= query.threshold)
                    .then(|| SearchResult::from_requirement(r, similarity))
            })
            .collect();
        rank(&mut results);
        results.truncate(query.limit);
        Ok(results)
    }

    async fn vectorized(&self) -> Result<Vec<Requirement>, StoreError> {
        let reqs = self.requirements.read().map_err(poisoned)?;
        Ok(reqs.iter().filter(|r| r.is_vectorized()).cloned().collect())
    }
}

#[async_trait]
impl FindingStore for MemoryStore {
    async fn insert_findings(&self, findings: &[ComplianceFinding]) -> Result<(), StoreError> {
        let mut log = self.findings.write().map_err(poisoned)?;
        log.extend_from_slice(findings);
        Ok(())
    }

    async fn findings_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ComplianceFinding>, StoreError> {
        let log = self.findings.read().map_err(poisoned)?;
        let mut out: Vec<ComplianceFinding> = log
            .iter()
            .filter(|f| f.entity_type == entity_type && f.entity_id == entity_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion (rank) order within one run.
        out.sort_by(|a, b| b.analysed_at.cmp(&a.analysed_at));
        Ok(out)
    }
}

/// Brute-force vector index with restrict filtering.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, id: &str) -> Option<IndexEntry> {
        self.entries.read().ok()?.get(id).cloned()
    }
}

fn index_poisoned<T>(_: T) -> IndexError {
    IndexError::Other("memory index lock poisoned".into())
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexError> {
        let mut entries = self.entries.write().map_err(index_poisoned)?;
        entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        restricts: &[Restrict],
        limit: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let entries = self.entries.read().map_err(index_poisoned)?;
        let mut matches: Vec<IndexMatch> = entries
            .values()
            .filter(|e| restrict::matches(&e.restricts, restricts))
            .map(|e| IndexMatch {
                id: e.id.clone(),
                distance: 1.0 - cosine_similarity(&e.vector, vector),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<(), IndexError> {
        let mut entries = self.entries.write().map_err(index_poisoned)?;
        entries.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regula_core::NewRequirement;
    use regula_core::restrict::{entry_restricts, query_restricts};

    fn req(framework: Framework, code: &str, tenant: Option<&str>) -> Requirement {
        Requirement::from_new(NewRequirement {
            framework,
            code: code.into(),
            title: format!("title {code}"),
            description: format!("description of {code}"),
            category: None,
            version: None,
            tenant_id: tenant.map(str::to_string),
        })
    }

    async fn seeded(store: &MemoryStore, r: &Requirement, v: Vec<f32>) {
        store.insert(r).await.unwrap();
        store.set_embedding(&r.id, &v, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_key() {
        let store = MemoryStore::new();
        store.insert(&req(Framework::Ons, "A", None)).await.unwrap();
        let err = store
            .insert(&req(Framework::Ons, "A", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        // Same code under another framework is a different key.
        store.insert(&req(Framework::Aneel, "A", None)).await.unwrap();
        assert_eq!(store.requirement_count(), 2);
    }

    #[tokio::test]
    async fn set_embedding_unknown_id() {
        let store = MemoryStore::new();
        let err = store
            .set_embedding("missing", &[1.0], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_skips_unvectorized_and_applies_threshold() {
        let store = MemoryStore::new();
        let a = req(Framework::Ons, "A", None);
        let b = req(Framework::Ons, "B", None);
        let c = req(Framework::Ons, "C", None);
        seeded(&store, &a, vec![1.0, 0.0]).await;
        seeded(&store, &b, vec![0.6, 0.8]).await;
        store.insert(&c).await.unwrap();

        let results = store
            .search(&VectorQuery {
                vector: &[1.0, 0.0],
                framework: None,
                tenant_id: None,
                threshold: 0.7,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, a.id);
    }

    #[tokio::test]
    async fn search_respects_tenant_visibility() {
        let store = MemoryStore::new();
        let global = req(Framework::Ons, "G", None);
        let mine = req(Framework::Ons, "M", Some("acme"));
        let theirs = req(Framework::Ons, "T", Some("other"));
        for r in [&global, &mine, &theirs] {
            seeded(&store, r, vec![1.0, 0.0]).await;
        }

        let q = |tenant| VectorQuery {
            vector: &[1.0, 0.0],
            framework: None,
            tenant_id: tenant,
            threshold: 0.0,
            limit: 10,
        };
        let anon = store.search(&q(None)).await.unwrap();
        assert_eq!(anon.len(), 1);
        let acme = store.search(&q(Some("acme"))).await.unwrap();
        let ids: Vec<&str> = acme.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(acme.len(), 2);
        assert!(ids.contains(&"G") && ids.contains(&"M"));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let store = MemoryStore::new();
        for code in ["1", "2", "3"] {
            store.insert(&req(Framework::Bpmn, code, None)).await.unwrap();
        }
        store.insert(&req(Framework::Ons, "x", None)).await.unwrap();

        let page = store.list(Some(Framework::Bpmn), 2, 0).await.unwrap();
        assert_eq!(page.total, 3);
        let codes: Vec<&str> = page.items.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, ["3", "2"]);

        let page = store.list(None, 10, 3).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].code, "1");
    }

    #[tokio::test]
    async fn index_filters_by_restricts_and_orders_by_distance() {
        let index = MemoryIndex::new();
        let entries = [
            ("a", vec![1.0, 0.0], None),
            ("b", vec![0.8, 0.6], None),
            ("c", vec![1.0, 0.0], Some("acme")),
        ];
        for (id, v, tenant) in entries {
            index
                .upsert(IndexEntry {
                    id: id.into(),
                    vector: v,
                    restricts: entry_restricts(tenant, Framework::Ons),
                })
                .await
                .unwrap();
        }

        let hits = index
            .search(&[1.0, 0.0], &query_restricts(None, None), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(hits[0].distance.abs() < 1e-6);

        let hits = index
            .search(&[1.0, 0.0], &query_restricts(Some("acme"), None), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn index_upsert_replaces_and_delete_removes() {
        let index = MemoryIndex::new();
        let entry = IndexEntry {
            id: "a".into(),
            vector: vec![1.0, 0.0],
            restricts: entry_restricts(None, Framework::Aneel),
        };
        index.upsert(entry.clone()).await.unwrap();
        index
            .upsert(IndexEntry {
                vector: vec![0.0, 1.0],
                ..entry
            })
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entry("a").unwrap().vector, vec![0.0, 1.0]);

        index.delete("a").await.unwrap();
        index.delete("a").await.unwrap();
        assert!(index.is_empty());
    }
}
