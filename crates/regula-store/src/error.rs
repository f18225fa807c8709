use thiserror::Error;

/// Errors from the primary requirement store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(framework, code)` unique constraint rejected an insert.
    #[error("requirement {framework} {code} already exists")]
    Duplicate { framework: String, code: String },

    #[error("requirement not found: {0}")]
    NotFound(String),

    #[error("no results for query")]
    NoResults,

    #[error("embedding has {got} dimensions, store expects {expected}")]
    Dimension { expected: usize, got: usize },

    #[error("embedding contains non-finite values")]
    NonFiniteVector,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors from a secondary vector index. Callers treat these as non-fatal.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index vector has {got} dimensions, expected {expected}")]
    Dimension { expected: usize, got: usize },

    #[error("unsupported restrict namespace: {0}")]
    Namespace(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[cfg(feature = "lancedb")]
    #[error("lancedb error: {0}")]
    Lance(#[from] ::lancedb::Error),

    #[cfg(feature = "vertex")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
