//! Ingestion: add, import, re-vectorize, edit, list, and index maintenance.

use chrono::Utc;
use futures::future::join_all;
use regula_core::{Framework, NewRequirement, Page, Requirement, RequirementPatch};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{Engine, EngineError, validate};

/// One entry of an import file. Accepts both English and Portuguese keys,
/// and keeps the framework as text so an unknown value fails only its item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportItem {
    #[serde(default)]
    pub framework: String,
    #[serde(default, alias = "codigo")]
    pub code: String,
    #[serde(default, alias = "titulo")]
    pub title: String,
    #[serde(default, alias = "descricao")]
    pub description: String,
    #[serde(default, alias = "categoria")]
    pub category: Option<String>,
    #[serde(default, alias = "versao")]
    pub version: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl ImportItem {
    pub fn into_new(self) -> Result<NewRequirement, EngineError> {
        let framework: Framework = self.framework.parse()?;
        Ok(NewRequirement {
            framework,
            code: self.code,
            title: self.title,
            description: self.description,
            category: self.category,
            version: self.version,
            tenant_id: self.tenant_id,
        })
    }
}

impl From<NewRequirement> for ImportItem {
    fn from(new: NewRequirement) -> Self {
        Self {
            framework: new.framework.to_string(),
            code: new.code,
            title: new.title,
            description: new.description,
            category: new.category,
            version: new.version,
            tenant_id: new.tenant_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub code: String,
    #[serde(rename = "erro")]
    pub error: String,
}

/// Outcome of a batch import. `succeeded + failed` equals the number of items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    #[serde(rename = "sucesso")]
    pub succeeded: usize,
    #[serde(rename = "erro")]
    pub failed: usize,
    #[serde(rename = "erros")]
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReindexSummary {
    pub indexed: usize,
    pub failed: usize,
}

impl Engine {
    /// Validate, embed, and store a new requirement, then mirror it into the
    /// vector index.
    pub async fn add_requirement(&self, new: NewRequirement) -> Result<Requirement, EngineError> {
        validate::new_requirement(&new)?;

        if self
            .requirements
            .find_by_code(new.framework, &new.code)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "requirement {} {} already exists",
                new.framework, new.code
            )));
        }

        let mut req = Requirement::from_new(new);
        let embedding = self.embed(&req.embedding_text()).await.map_err(|e| {
            error!(framework = %req.framework, code = %req.code, error = %e, "embedding failed");
            e
        })?;

        self.requirements.insert(&req).await?;
        let vectorized_at = Utc::now();
        self.requirements
            .set_embedding(&req.id, &embedding, vectorized_at)
            .await?;
        self.index_upsert(&req, embedding.clone()).await;

        info!(id = %req.id, framework = %req.framework, code = %req.code, "requirement added and vectorized");
        req.embedding = Some(embedding);
        req.vectorized_at = Some(vectorized_at);
        Ok(req)
    }

    /// Import items in fixed-size batches. Items within a batch run
    /// concurrently and fail independently; batches run one after another with
    /// the configured delay between them.
    pub async fn import_batch(
        &self,
        items: Vec<ImportItem>,
        batch_size: usize,
    ) -> Result<BatchSummary, EngineError> {
        if batch_size == 0 {
            return Err(EngineError::Validation("batch_size must be at least 1".into()));
        }

        let total = items.len();
        let batches = total.div_ceil(batch_size);
        let mut summary = BatchSummary::default();
        let mut items = items.into_iter();

        for batch_no in 0..batches {
            let batch: Vec<ImportItem> = items.by_ref().take(batch_size).collect();
            info!(batch = batch_no + 1, of = batches, size = batch.len(), "importing batch");

            let outcomes = join_all(batch.into_iter().map(|item| async move {
                let code = item.code.clone();
                let result = match item.into_new() {
                    Ok(new) => self.add_requirement(new).await.map(|_| ()),
                    Err(e) => Err(e),
                };
                (code, result)
            }))
            .await;

            for (code, result) in outcomes {
                match result {
                    Ok(()) => summary.succeeded += 1,
                    Err(e) => {
                        warn!(code = %code, error = %e, "import item failed");
                        summary.failed += 1;
                        summary.errors.push(BatchItemError {
                            code,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if batch_no + 1 < batches {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch import complete"
        );
        Ok(summary)
    }

    /// Recompute the embedding from the current title and description.
    /// Only the vector columns change.
    pub async fn re_vectorize(&self, id: &str) -> Result<Requirement, EngineError> {
        let mut req = self
            .requirements
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("requirement {id}")))?;

        let embedding = self.embed(&req.embedding_text()).await.map_err(|e| {
            error!(id, error = %e, "re-vectorization failed");
            e
        })?;
        let vectorized_at = Utc::now();
        self.requirements
            .set_embedding(id, &embedding, vectorized_at)
            .await?;
        self.index_upsert(&req, embedding.clone()).await;

        info!(id, "requirement re-vectorized");
        req.embedding = Some(embedding);
        req.vectorized_at = Some(vectorized_at);
        Ok(req)
    }

    /// Edit requirement content. Changing the title or description
    /// re-vectorizes the requirement.
    pub async fn update_requirement(
        &self,
        id: &str,
        patch: RequirementPatch,
    ) -> Result<Requirement, EngineError> {
        validate::patch(&patch)?;
        let current = self
            .requirements
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("requirement {id}")))?;

        let revectorize = patch.touches_embedding_text(&current);
        self.requirements.update_content(id, &patch).await?;
        info!(id, revectorize, "requirement updated");

        if revectorize {
            return self.re_vectorize(id).await;
        }
        let mut updated = current;
        patch.apply(&mut updated);
        Ok(updated)
    }

    /// Newest-first page of requirements. `limit` is clamped to `1..=200`.
    pub async fn list_requirements(
        &self,
        framework: Option<Framework>,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Requirement>, EngineError> {
        let limit = validate::list_limit(limit);
        Ok(self.requirements.list(framework, limit, offset).await?)
    }

    /// Drop a requirement's entry from the vector index. Returns `false` when
    /// no index is configured or the removal failed.
    pub async fn remove_from_index(&self, id: &str) -> bool {
        let Some(index) = &self.index else {
            return false;
        };
        match index.delete(id).await {
            Ok(()) => {
                info!(index = index.name(), id, "removed from index");
                true
            }
            Err(e) => {
                warn!(index = index.name(), id, error = %e, "index removal failed");
                false
            }
        }
    }

    /// Re-upsert every vectorized requirement into the vector index.
    pub async fn rebuild_index(&self) -> Result<ReindexSummary, EngineError> {
        let mut summary = ReindexSummary::default();
        let Some(index) = &self.index else {
            info!("no vector index configured, nothing to rebuild");
            return Ok(summary);
        };

        for req in self.requirements.vectorized().await? {
            let Some(vector) = req.embedding.clone() else {
                continue;
            };
            if self.index_upsert(&req, vector).await {
                summary.indexed += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(
            index = index.name(),
            indexed = summary.indexed,
            failed = summary.failed,
            "index rebuilt"
        );
        Ok(summary)
    }
}
