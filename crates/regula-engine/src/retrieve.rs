//! Semantic retrieval over the requirement corpus.

use std::collections::HashMap;

use regula_core::restrict::query_restricts;
use regula_core::{Framework, SearchResult, rank};
use regula_store::{IndexMatch, VectorIndex, VectorQuery};
use tracing::{debug, error, info, warn};

use crate::{Engine, EngineError, validate};

/// Search parameters. Unset fields fall back to the engine configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub framework: Option<Framework>,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    /// Caller's tenant: its private requirements are searched alongside the global corpus.
    pub tenant_id: Option<String>,
}

/// Scope and cut-offs of one retrieval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Retrieval<'a> {
    pub framework: Option<Framework>,
    pub tenant_id: Option<&'a str>,
    pub threshold: f32,
    pub limit: usize,
}

impl Engine {
    /// Rank requirements by semantic similarity to `query`.
    ///
    /// Every result has `similarity >= threshold`; results are ordered by
    /// descending similarity with ties broken by id.
    pub async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let threshold = opts.threshold.unwrap_or(self.config.search_threshold);
        let limit = opts.limit.unwrap_or(self.config.search_limit);
        validate::search(query, threshold, limit)?;

        let vector = self.embed(query).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e
        })?;
        let results = self
            .retrieve(
                &vector,
                Retrieval {
                    framework: opts.framework,
                    tenant_id: opts.tenant_id.as_deref(),
                    threshold,
                    limit,
                },
            )
            .await?;
        info!(
            results = results.len(),
            threshold,
            framework = ?opts.framework,
            "semantic search"
        );
        Ok(results)
    }

    /// Find candidates through the vector index when one is configured,
    /// falling back to a scan of the primary store if the index fails.
    pub(crate) async fn retrieve(
        &self,
        vector: &[f32],
        scope: Retrieval<'_>,
    ) -> Result<Vec<SearchResult>, EngineError> {
        if let Some(index) = &self.index {
            let restricts = query_restricts(scope.tenant_id, scope.framework);
            match index.search(vector, &restricts, scope.limit).await {
                Ok(matches) => return self.hydrate(index.as_ref(), matches, scope).await,
                Err(e) => warn!(
                    index = index.name(),
                    error = %e,
                    "index search failed, falling back to primary store"
                ),
            }
        }

        let query = VectorQuery {
            vector,
            framework: scope.framework,
            tenant_id: scope.tenant_id,
            threshold: scope.threshold,
            limit: scope.limit,
        };
        Ok(self.requirements.search(&query).await?)
    }

    /// Resolve index matches against the primary store. Ids the store no
    /// longer knows, or rows outside the caller's scope, are dropped.
    async fn hydrate(
        &self,
        index: &dyn VectorIndex,
        matches: Vec<IndexMatch>,
        scope: Retrieval<'_>,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let ids: Vec<String> = matches.iter().map(|m| m.id.clone()).collect();
        let rows: HashMap<String, _> = self
            .requirements
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut stale = 0usize;
        let mut results = Vec::with_capacity(matches.len());
        for m in &matches {
            let Some(req) = rows.get(&m.id).filter(|r| r.is_vectorized()) else {
                stale += 1;
                continue;
            };
            let in_scope = scope.framework.is_none_or(|f| req.framework == f)
                && (req.tenant_id.is_none() || req.tenant_id.as_deref() == scope.tenant_id);
            if !in_scope {
                continue;
            }
            let similarity = 1.0 - m.distance;
            if similarity >= scope.threshold {
                results.push(SearchResult::from_requirement(req, similarity));
            }
        }
        if stale > 0 {
            debug!(index = index.name(), stale, "dropped index matches unknown to the primary store");
        }
        rank(&mut results);
        results.truncate(scope.limit);
        Ok(results)
    }
}
