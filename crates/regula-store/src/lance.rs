//! LanceDB vector index over vectorized requirements.
//!
//! One table, `requirement_index`, keyed by requirement id. Restrict
//! namespaces are flattened to one column each and queried with a SQL
//! prefilter.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use regula_core::index;
use regula_core::restrict::{FRAMEWORK_NAMESPACE, SCOPE_NAMESPACE, TENANT_NAMESPACE};
use regula_core::{IndexEntry, Restrict};
use tracing::{debug, info};

use crate::{IndexError, IndexMatch, VectorIndex};

const TABLE: &str = "requirement_index";
const DISTANCE_COLUMN: &str = "_distance";

pub struct LanceIndex {
    table: lancedb::Table,
    dim: usize,
}

impl LanceIndex {
    /// Connect to a LanceDB database at `path`, creating the index table if needed.
    pub async fn open(path: &Path, dim: usize) -> Result<Self, IndexError> {
        let uri = path
            .to_str()
            .ok_or_else(|| IndexError::Other("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;

        let existing = db.table_names().execute().await?;
        let table = if existing.iter().any(|n| n == TABLE) {
            db.open_table(TABLE).execute().await?
        } else {
            let schema = Arc::new(index::index_entry_schema(dim as i32));
            let table = db.create_empty_table(TABLE, schema).execute().await?;
            info!(table = TABLE, dim, "created LanceDB index table");
            table
        };
        Ok(Self { table, dim })
    }

    pub async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.table.count_rows(None).await?)
    }

    fn entry_batch(&self, entry: &IndexEntry) -> Result<RecordBatch, IndexError> {
        if entry.vector.len() != self.dim {
            return Err(IndexError::Dimension {
                expected: self.dim,
                got: entry.vector.len(),
            });
        }
        let token = |ns: &str| -> Result<String, IndexError> {
            entry
                .allow_list(ns)
                .and_then(|l| l.first())
                .cloned()
                .ok_or_else(|| IndexError::Namespace(format!("entry {} has no {ns} restrict", entry.id)))
        };

        let schema = Arc::new(index::index_entry_schema(self.dim as i32));
        let values = Float32Array::from(entry.vector.clone());
        let vectors = FixedSizeListArray::try_new(
            Arc::new(arrow::datatypes::Field::new("item", arrow::datatypes::DataType::Float32, true)),
            self.dim as i32,
            Arc::new(values),
            None,
        )?;
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![entry.id.clone()])),
                Arc::new(vectors),
                Arc::new(StringArray::from(vec![token(TENANT_NAMESPACE)?])),
                Arc::new(StringArray::from(vec![token(SCOPE_NAMESPACE)?])),
                Arc::new(StringArray::from(vec![token(FRAMEWORK_NAMESPACE)?])),
            ],
        )?;
        Ok(batch)
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn column_for(namespace: &str) -> Result<&'static str, IndexError> {
    match namespace {
        TENANT_NAMESPACE => Ok(index::TENANT_ID),
        SCOPE_NAMESPACE => Ok(index::SCOPE),
        FRAMEWORK_NAMESPACE => Ok(index::FRAMEWORK),
        other => Err(IndexError::Namespace(other.to_string())),
    }
}

/// SQL prefilter equivalent to a restrict set: one `IN` clause per namespace.
fn restrict_filter(restricts: &[Restrict]) -> Result<Option<String>, IndexError> {
    let clauses = restricts
        .iter()
        .map(|r| {
            let column = column_for(&r.namespace)?;
            let tokens: Vec<String> = r.allow_list.iter().map(|t| quote(t)).collect();
            Ok(format!("{column} IN ({})", tokens.join(", ")))
        })
        .collect::<Result<Vec<_>, IndexError>>()?;
    Ok((!clauses.is_empty()).then(|| clauses.join(" AND ")))
}

fn matches_from_batches(batches: &[RecordBatch]) -> Result<Vec<IndexMatch>, IndexError> {
    let mut out = Vec::new();
    for batch in batches {
        let ids = batch
            .column_by_name(index::ID)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| IndexError::Other("search result missing id column".into()))?;
        let distances = batch
            .column_by_name(DISTANCE_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| IndexError::Other("search result missing _distance column".into()))?;
        for i in 0..batch.num_rows() {
            if ids.is_null(i) {
                continue;
            }
            out.push(IndexMatch {
                id: ids.value(i).to_string(),
                distance: distances.value(i),
            });
        }
    }
    Ok(out)
}

#[async_trait]
impl VectorIndex for LanceIndex {
    fn name(&self) -> &'static str {
        "lancedb"
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexError> {
        let batch = self.entry_batch(&entry)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = self.table.merge_insert(&[index::ID]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge.execute(Box::new(reader)).await?;
        debug!(id = %entry.id, "upserted index entry");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        restricts: &[Restrict],
        limit: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::Dimension {
                expected: self.dim,
                got: vector.len(),
            });
        }
        let mut query = self
            .table
            .vector_search(vector)?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(filter) = restrict_filter(restricts)? {
            query = query.only_if(filter);
        }
        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;
        let mut matches = matches_from_batches(&batches)?;
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<(), IndexError> {
        self.table
            .delete(&format!("{} = {}", index::ID, quote(id)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regula_core::Framework;
    use regula_core::restrict::{entry_restricts, query_restricts};
    use tempfile::TempDir;

    fn entry(id: &str, vector: Vec<f32>, tenant: Option<&str>, framework: Framework) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            vector,
            restricts: entry_restricts(tenant, framework),
        }
    }

    #[test]
    fn restrict_filter_sql() {
        let filter = restrict_filter(&query_restricts(Some("o'brien"), Some(Framework::Ons)))
            .unwrap()
            .unwrap();
        assert_eq!(
            filter,
            "tenant_id IN ('o''brien', 'global') AND framework IN ('ONS')"
        );
        assert!(restrict_filter(&[]).unwrap().is_none());
        let err = restrict_filter(&[Restrict::new("color", &["red"])]).unwrap_err();
        assert!(matches!(err, IndexError::Namespace(_)));
    }

    #[tokio::test]
    async fn open_creates_empty_table() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 3).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 2).await.unwrap();
        index
            .upsert(entry("a", vec![1.0, 0.0], None, Framework::Aneel))
            .await
            .unwrap();
        index
            .upsert(entry("a", vec![0.0, 1.0], None, Framework::Aneel))
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        let hits = index
            .search(&[0.0, 1.0], &query_restricts(None, None), 5)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance.abs() < 1e-4);
    }

    #[tokio::test]
    async fn search_honours_restricts() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 2).await.unwrap();
        for e in [
            entry("global", vec![1.0, 0.0], None, Framework::Ons),
            entry("acme", vec![1.0, 0.0], Some("acme"), Framework::Ons),
            entry("other", vec![1.0, 0.0], Some("other"), Framework::Ons),
            entry("bpmn", vec![0.8, 0.6], None, Framework::Bpmn),
        ] {
            index.upsert(e).await.unwrap();
        }

        let ids = |hits: Vec<IndexMatch>| {
            let mut ids: Vec<String> = hits.into_iter().map(|m| m.id).collect();
            ids.sort();
            ids
        };
        let anon = index
            .search(&[1.0, 0.0], &query_restricts(None, None), 10)
            .await
            .unwrap();
        assert_eq!(ids(anon), ["bpmn", "global"]);

        let acme = index
            .search(&[1.0, 0.0], &query_restricts(Some("acme"), Some(Framework::Ons)), 10)
            .await
            .unwrap();
        assert_eq!(ids(acme), ["acme", "global"]);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 2).await.unwrap();
        index
            .upsert(entry("a", vec![1.0, 0.0], None, Framework::Bpmn))
            .await
            .unwrap();
        index.delete("a").await.unwrap();
        index.delete("a").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 3).await.unwrap();
        let err = index
            .upsert(entry("a", vec![1.0, 0.0], None, Framework::Bpmn))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Dimension { expected: 3, got: 2 }));
    }
}
