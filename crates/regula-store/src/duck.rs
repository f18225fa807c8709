//! DuckDB primary store for requirements, embeddings, and compliance findings.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params, params_from_iter};
use regula_core::{
    ComplianceFinding, ComplianceStatus, Framework, Page, Requirement, RequirementPatch,
    SearchResult,
};
use tracing::{debug, info};

use crate::{FindingStore, RequirementStore, StoreError, VectorQuery};

/// DuckDB store holding the requirement corpus and the findings log.
///
/// Embeddings live in a side table (`requirement_embeddings`) with no
/// constraints, so re-vectorizing never rewrites a row of the constrained
/// `requirements` table. Similarity search is a brute-force
/// `array_cosine_similarity` scan over the join of the two.
///
/// Supports both in-memory and persistent (file-backed) modes, like
/// [`open`](Self::open) and [`open_persistent`](Self::open_persistent).
pub struct DuckStore {
    conn: Mutex<Connection>,
    dim: usize,
}

const SELECT_REQUIREMENT: &str = "SELECT r.id, r.framework, r.code, r.title, r.description, \
     r.category, r.version, r.tenant_id, epoch_ms(r.created_at), \
     CAST(e.embedding AS VARCHAR), epoch_ms(e.vectorized_at) \
     FROM requirements r LEFT JOIN requirement_embeddings e ON e.requirement_id = r.id";

impl DuckStore {
    /// Open an in-memory database for embeddings of `dim` dimensions.
    pub fn open(dim: usize) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dim)
    }

    /// Open or create a persistent database at `path`.
    pub fn open_persistent(path: &Path, dim: usize) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::init(conn, dim)?;
        info!(path = %path.display(), requirements = store.requirement_count()?, "opened duckdb store");
        Ok(store)
    }

    fn init(conn: Connection, dim: usize) -> Result<Self, StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS requirements (
                id VARCHAR PRIMARY KEY,
                framework VARCHAR NOT NULL,
                code VARCHAR NOT NULL,
                title VARCHAR NOT NULL,
                description VARCHAR NOT NULL,
                category VARCHAR,
                version VARCHAR,
                tenant_id VARCHAR,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (framework, code)
            );
            CREATE TABLE IF NOT EXISTS requirement_embeddings (
                requirement_id VARCHAR NOT NULL,
                embedding FLOAT[{dim}] NOT NULL,
                vectorized_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS compliance_findings (
                id VARCHAR NOT NULL,
                entity_type VARCHAR NOT NULL,
                entity_id VARCHAR NOT NULL,
                requirement_id VARCHAR NOT NULL,
                similarity FLOAT NOT NULL,
                status VARCHAR NOT NULL,
                analisado_por_ia BOOLEAN NOT NULL,
                tenant_id VARCHAR,
                analysed_at TIMESTAMP NOT NULL
            );"
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
            dim,
        })
    }

    /// Embedding dimension this store was opened with.
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))
    }

    // ── Counts ──

    pub fn requirement_count(&self) -> Result<usize, StoreError> {
        self.count_table("requirements")
    }

    pub fn embedding_count(&self) -> Result<usize, StoreError> {
        self.count_table("requirement_embeddings")
    }

    pub fn finding_count(&self) -> Result<usize, StoreError> {
        self.count_table("compliance_findings")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let mut stmt = conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    fn check_vector(&self, v: &[f32]) -> Result<(), StoreError> {
        if v.len() != self.dim {
            return Err(StoreError::Dimension {
                expected: self.dim,
                got: v.len(),
            });
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(StoreError::NonFiniteVector);
        }
        Ok(())
    }

    fn query_requirements(
        &self,
        sql: &str,
        args: &[String],
    ) -> Result<Vec<Requirement>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), RawRequirement::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRequirement::into_requirement).collect()
    }
}

/// Row as read from DuckDB, before domain conversion.
struct RawRequirement {
    id: String,
    framework: String,
    code: String,
    title: String,
    description: String,
    category: Option<String>,
    version: Option<String>,
    tenant_id: Option<String>,
    created_at_ms: i64,
    embedding: Option<String>,
    vectorized_at_ms: Option<i64>,
}

impl RawRequirement {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            framework: row.get(1)?,
            code: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            category: row.get(5)?,
            version: row.get(6)?,
            tenant_id: row.get(7)?,
            created_at_ms: row.get(8)?,
            embedding: row.get(9)?,
            vectorized_at_ms: row.get(10)?,
        })
    }

    fn into_requirement(self) -> Result<Requirement, StoreError> {
        let framework: Framework = self
            .framework
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("{}: framework {}", self.id, self.framework)))?;
        let embedding = self.embedding.as_deref().map(parse_vector).transpose()?;
        let vectorized_at = self.vectorized_at_ms.map(from_millis).transpose()?;
        Ok(Requirement {
            created_at: from_millis(self.created_at_ms)?,
            id: self.id,
            framework,
            code: self.code,
            title: self.title,
            description: self.description,
            category: self.category,
            version: self.version,
            tenant_id: self.tenant_id,
            embedding,
            vectorized_at,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

/// Render a vector as a DuckDB fixed-size array literal.
fn vector_literal(v: &[f32], dim: usize) -> String {
    let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]::FLOAT[{dim}]", items.join(", "))
}

/// Parse the VARCHAR rendering of a FLOAT array, e.g. `[0.1, 0.2]`.
fn parse_vector(s: &str) -> Result<Vec<f32>, StoreError> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| StoreError::Corrupt(format!("embedding literal: {s}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|x| {
            x.trim()
                .parse::<f32>()
                .map_err(|e| StoreError::Corrupt(format!("embedding value {x:?}: {e}")))
        })
        .collect()
}

fn is_unique_violation(err: &duckdb::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("duplicate key") || msg.contains("unique constraint")
}

fn framework_filter(framework: Option<Framework>, clauses: &mut Vec<String>, args: &mut Vec<String>) {
    if let Some(f) = framework {
        clauses.push("r.framework = ?".into());
        args.push(f.as_str().to_string());
    }
}

#[async_trait]
impl RequirementStore for DuckStore {
    async fn find_by_code(
        &self,
        framework: Framework,
        code: &str,
    ) -> Result<Option<Requirement>, StoreError> {
        let sql = format!("{SELECT_REQUIREMENT} WHERE r.framework = ? AND r.code = ?");
        let rows =
            self.query_requirements(&sql, &[framework.as_str().to_string(), code.to_string()])?;
        Ok(rows.into_iter().next())
    }

    async fn get(&self, id: &str) -> Result<Option<Requirement>, StoreError> {
        let sql = format!("{SELECT_REQUIREMENT} WHERE r.id = ?");
        let rows = self.query_requirements(&sql, &[id.to_string()])?;
        Ok(rows.into_iter().next())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Requirement>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("{SELECT_REQUIREMENT} WHERE r.id IN ({placeholders})");
        self.query_requirements(&sql, ids)
    }

    async fn insert(&self, req: &Requirement) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO requirements
                (id, framework, code, title, description, category, version, tenant_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, epoch_ms(?::BIGINT))",
            params![
                req.id,
                req.framework.as_str(),
                req.code,
                req.title,
                req.description,
                req.category,
                req.version,
                req.tenant_id,
                req.created_at.timestamp_millis(),
            ],
        );
        match result {
            Ok(_) => {
                debug!(id = %req.id, framework = %req.framework, code = %req.code, "inserted requirement");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate {
                framework: req.framework.to_string(),
                code: req.code.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        vectorized_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_vector(embedding)?;
        let literal = vector_literal(embedding, self.dim);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let exists: i64 = tx.query_row(
            "SELECT count(*)::BIGINT FROM requirements WHERE id = ?",
            params![id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        tx.execute(
            "DELETE FROM requirement_embeddings WHERE requirement_id = ?",
            params![id],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO requirement_embeddings (requirement_id, embedding, vectorized_at)
                 VALUES (?, {literal}, epoch_ms(?::BIGINT))"
            ),
            params![id, vectorized_at.timestamp_millis()],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn update_content(&self, id: &str, patch: &RequirementPatch) -> Result<(), StoreError> {
        let mut sets = Vec::new();
        let mut args: Vec<Option<String>> = Vec::new();
        if let Some(title) = &patch.title {
            sets.push("title = ?");
            args.push(Some(title.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            args.push(Some(description.clone()));
        }
        if let Some(category) = &patch.category {
            sets.push("category = ?");
            args.push(Some(category.clone()));
        }
        if let Some(version) = &patch.version {
            sets.push("version = ?");
            args.push(Some(version.clone()));
        }
        if sets.is_empty() {
            return match self.get(id).await? {
                Some(_) => Ok(()),
                None => Err(StoreError::NotFound(id.to_string())),
            };
        }
        args.push(Some(id.to_string()));
        let sql = format!("UPDATE requirements SET {} WHERE id = ?", sets.join(", "));
        let conn = self.conn()?;
        let changed = conn.execute(&sql, params_from_iter(args.iter()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(
        &self,
        framework: Option<Framework>,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Requirement>, StoreError> {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        framework_filter(framework, &mut clauses, &mut args);
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT count(*)::BIGINT FROM requirements r{where_sql}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?
        };

        let sql = format!(
            "SELECT r.id, r.framework, r.code, r.title, r.description, r.category, r.version, \
             r.tenant_id, epoch_ms(r.created_at), NULL::VARCHAR, epoch_ms(e.vectorized_at) \
             FROM requirements r LEFT JOIN requirement_embeddings e ON e.requirement_id = r.id\
             {where_sql} ORDER BY r.created_at DESC, r.id LIMIT {limit} OFFSET {offset}"
        );
        let items = self.query_requirements(&sql, &args)?;
        Ok(Page {
            items,
            total: total as usize,
            limit,
            offset,
        })
    }

    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchResult>, StoreError> {
        self.check_vector(query.vector)?;
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        framework_filter(query.framework, &mut clauses, &mut args);
        match query.tenant_id {
            Some(tenant) => {
                clauses.push("(r.tenant_id IS NULL OR r.tenant_id = ?)".into());
                args.push(tenant.to_string());
            }
            None => clauses.push("r.tenant_id IS NULL".into()),
        }
        let literal = vector_literal(query.vector, self.dim);
        let sql = format!(
            "SELECT * FROM (
                SELECT r.id, r.framework, r.code, r.title, r.description, r.category,
                       array_cosine_similarity(e.embedding, {literal}) AS similarity
                FROM requirements r
                JOIN requirement_embeddings e ON e.requirement_id = r.id
                WHERE {}
            ) WHERE similarity >= {}
            ORDER BY similarity DESC, id
            LIMIT {}",
            clauses.join(" AND "),
            query.threshold,
            query.limit,
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, f32>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, framework, code, title, description, category, similarity)| {
                let framework = framework
                    .parse()
                    .map_err(|_| StoreError::Corrupt(format!("{id}: framework {framework}")))?;
                Ok(SearchResult {
                    id,
                    framework,
                    code,
                    title,
                    description,
                    category,
                    similarity,
                })
            })
            .collect()
    }

    async fn vectorized(&self) -> Result<Vec<Requirement>, StoreError> {
        let sql = format!("{SELECT_REQUIREMENT} WHERE e.requirement_id IS NOT NULL ORDER BY r.id");
        self.query_requirements(&sql, &[])
    }
}

#[async_trait]
impl FindingStore for DuckStore {
    async fn insert_findings(&self, findings: &[ComplianceFinding]) -> Result<(), StoreError> {
        if findings.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO compliance_findings
                    (id, entity_type, entity_id, requirement_id, similarity, status,
                     analisado_por_ia, tenant_id, analysed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, epoch_ms(?::BIGINT))",
            )?;
            for f in findings {
                stmt.execute(params![
                    f.id,
                    f.entity_type,
                    f.entity_id,
                    f.requirement_id,
                    f.similarity,
                    f.status.as_str(),
                    f.analisado_por_ia,
                    f.tenant_id,
                    f.analysed_at.timestamp_millis(),
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = findings.len(), "recorded compliance findings");
        Ok(())
    }

    async fn findings_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ComplianceFinding>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, requirement_id, similarity, status,
                    analisado_por_ia, tenant_id, epoch_ms(analysed_at)
             FROM compliance_findings
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY analysed_at DESC, rowid",
        )?;
        let rows = stmt
            .query_map(params![entity_type, entity_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, entity_type, entity_id, requirement_id, similarity, status, ai, tenant_id, at)| {
                    let status = ComplianceStatus::parse(&status)
                        .ok_or_else(|| StoreError::Corrupt(format!("{id}: status {status}")))?;
                    Ok(ComplianceFinding {
                        id,
                        entity_type,
                        entity_id,
                        requirement_id,
                        similarity,
                        status,
                        analisado_por_ia: ai,
                        tenant_id,
                        analysed_at: from_millis(at)?,
                    })
                },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regula_core::NewRequirement;

    fn req(framework: Framework, code: &str, tenant: Option<&str>) -> Requirement {
        Requirement::from_new(NewRequirement {
            framework,
            code: code.into(),
            title: format!("Title {code}"),
            description: format!("Description for {code}"),
            category: Some("operacao".into()),
            version: None,
            tenant_id: tenant.map(str::to_string),
        })
    }

    fn query<'a>(v: &'a [f32], tenant: Option<&'a str>, threshold: f32) -> VectorQuery<'a> {
        VectorQuery {
            vector: v,
            framework: None,
            tenant_id: tenant,
            threshold,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn open_in_memory_has_empty_tables() {
        let store = DuckStore::open(3).unwrap();
        assert_eq!(store.requirement_count().unwrap(), 0);
        assert_eq!(store.embedding_count().unwrap(), 0);
        assert_eq!(store.finding_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = DuckStore::open(3).unwrap();
        let r = req(Framework::Aneel, "REN-1000", None);
        store.insert(&r).await.unwrap();

        let got = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(got.code, "REN-1000");
        assert_eq!(got.category.as_deref(), Some("operacao"));
        assert_eq!(got.created_at.timestamp_millis(), r.created_at.timestamp_millis());
        assert!(got.embedding.is_none());

        let by_code = store
            .find_by_code(Framework::Aneel, "REN-1000")
            .await
            .unwrap();
        assert_eq!(by_code.map(|r| r.id), Some(r.id));
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_key_maps_to_duplicate() {
        let store = DuckStore::open(3).unwrap();
        store.insert(&req(Framework::Ons, "SM-1", None)).await.unwrap();
        let err = store
            .insert(&req(Framework::Ons, "SM-1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }), "{err}");
        assert_eq!(store.requirement_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn set_embedding_replaces_previous_vector() {
        let store = DuckStore::open(3).unwrap();
        let r = req(Framework::Bpmn, "TASK", None);
        store.insert(&r).await.unwrap();
        store.set_embedding(&r.id, &[1.0, 0.0, 0.0], Utc::now()).await.unwrap();
        store.set_embedding(&r.id, &[0.0, 0.5, 0.0], Utc::now()).await.unwrap();

        assert_eq!(store.embedding_count().unwrap(), 1);
        let got = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(got.embedding, Some(vec![0.0, 0.5, 0.0]));
        assert!(got.vectorized_at.is_some());
        assert_eq!(store.vectorized().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_embedding_rejects_bad_vectors() {
        let store = DuckStore::open(3).unwrap();
        let r = req(Framework::Bpmn, "GATEWAY", None);
        store.insert(&r).await.unwrap();

        let err = store.set_embedding(&r.id, &[1.0, 0.0], Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Dimension { expected: 3, got: 2 }));
        let err = store
            .set_embedding(&r.id, &[f32::NAN, 0.0, 0.0], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NonFiniteVector));
        let err = store
            .set_embedding("missing", &[1.0, 0.0, 0.0], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_ranks_and_filters() {
        let store = DuckStore::open(2).unwrap();
        let near = req(Framework::Ons, "NEAR", None);
        let mid = req(Framework::Ons, "MID", None);
        let far = req(Framework::Aneel, "FAR", None);
        let unvectorized = req(Framework::Ons, "NONE", None);
        for (r, v) in [(&near, [1.0, 0.0]), (&mid, [0.8, 0.6]), (&far, [0.0, 1.0])] {
            store.insert(r).await.unwrap();
            store.set_embedding(&r.id, &v, Utc::now()).await.unwrap();
        }
        store.insert(&unvectorized).await.unwrap();

        let results = store.search(&query(&[1.0, 0.0], None, 0.5)).await.unwrap();
        let codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, ["NEAR", "MID"]);
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
        assert!((results[1].similarity - 0.8).abs() < 1e-5);

        let mut q = query(&[1.0, 0.0], None, 0.0);
        q.framework = Some(Framework::Aneel);
        let results = store.search(&q).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, "FAR");
    }

    #[tokio::test]
    async fn search_tenant_visibility() {
        let store = DuckStore::open(2).unwrap();
        let global = req(Framework::Ons, "G", None);
        let mine = req(Framework::Ons, "M", Some("acme"));
        let theirs = req(Framework::Ons, "T", Some("other"));
        for r in [&global, &mine, &theirs] {
            store.insert(r).await.unwrap();
            store.set_embedding(&r.id, &[1.0, 0.0], Utc::now()).await.unwrap();
        }

        let anon = store.search(&query(&[1.0, 0.0], None, 0.0)).await.unwrap();
        assert_eq!(anon.len(), 1);
        assert_eq!(anon[0].code, "G");

        let acme = store
            .search(&query(&[1.0, 0.0], Some("acme"), 0.0))
            .await
            .unwrap();
        let mut codes: Vec<&str> = acme.iter().map(|r| r.code.as_str()).collect();
        codes.sort();
        assert_eq!(codes, ["G", "M"]);
    }

    #[tokio::test]
    async fn list_pages_without_embeddings() {
        let store = DuckStore::open(2).unwrap();
        for code in ["A", "B", "C"] {
            let r = req(Framework::Bpmn, code, None);
            store.insert(&r).await.unwrap();
            store.set_embedding(&r.id, &[1.0, 0.0], Utc::now()).await.unwrap();
        }
        store.insert(&req(Framework::Ons, "X", None)).await.unwrap();

        let page = store.list(Some(Framework::Bpmn), 2, 0).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|r| r.embedding.is_none()));
        assert!(page.items.iter().all(|r| r.vectorized_at.is_some()));

        let page = store.list(None, 50, 3).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn update_content_leaves_vector_alone() {
        let store = DuckStore::open(2).unwrap();
        let r = req(Framework::Aneel, "PRODIST-8", None);
        store.insert(&r).await.unwrap();
        store.set_embedding(&r.id, &[0.0, 1.0], Utc::now()).await.unwrap();

        let patch = RequirementPatch {
            category: Some("qualidade".into()),
            ..Default::default()
        };
        store.update_content(&r.id, &patch).await.unwrap();
        let got = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(got.category.as_deref(), Some("qualidade"));
        assert_eq!(got.embedding, Some(vec![0.0, 1.0]));

        let err = store.update_content("missing", &patch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn findings_are_append_only_newest_first() {
        let store = DuckStore::open(2).unwrap();
        let earlier = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let later = DateTime::from_timestamp_millis(1_700_000_600_000).unwrap();
        let first = vec![ComplianceFinding::new("processo", "p1", "r1", 0.95, None, earlier)];
        let second = vec![
            ComplianceFinding::new("processo", "p1", "r1", 0.75, Some("acme"), later),
            ComplianceFinding::new("processo", "p1", "r2", 0.65, Some("acme"), later),
        ];
        store.insert_findings(&first).await.unwrap();
        store.insert_findings(&second).await.unwrap();
        store
            .insert_findings(&[ComplianceFinding::new("processo", "p2", "r1", 0.9, None, later)])
            .await
            .unwrap();

        let history = store.findings_for("processo", "p1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].requirement_id, "r1");
        assert_eq!(history[0].status, ComplianceStatus::PartiallyMet);
        assert_eq!(history[1].requirement_id, "r2");
        assert_eq!(history[2].status, ComplianceStatus::Met);
        assert_eq!(history[2].analysed_at, earlier);
        assert_eq!(store.finding_count().unwrap(), 4);
    }

    #[tokio::test]
    async fn persistent_reopen_keeps_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("regula.duckdb");
        let r = req(Framework::Ons, "SUBMODULO-2.3", None);

        let store = DuckStore::open_persistent(&db_path, 2).unwrap();
        assert!(db_path.exists());
        store.insert(&r).await.unwrap();
        store.set_embedding(&r.id, &[0.6, 0.8], Utc::now()).await.unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path, 2).unwrap();
        assert_eq!(store.requirement_count().unwrap(), 1);
        let got = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(got.embedding, Some(vec![0.6, 0.8]));
    }

    #[test]
    fn vector_literal_and_parse() {
        assert_eq!(vector_literal(&[1.0, 0.25], 2), "[1, 0.25]::FLOAT[2]");
        assert_eq!(parse_vector("[1.0, 0.25]").unwrap(), vec![1.0, 0.25]);
        assert!(parse_vector("[]").unwrap().is_empty());
        assert!(matches!(parse_vector("1.0"), Err(StoreError::Corrupt(_))));
    }
}
