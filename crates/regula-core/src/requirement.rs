//! Requirement types shared by the stores, the providers, and the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Regulatory body or notation standard a requirement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Framework {
    /// Agência Nacional de Energia Elétrica.
    Aneel,
    /// Operador Nacional do Sistema Elétrico.
    Ons,
    /// Business Process Model and Notation 2.0.
    Bpmn,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::Aneel, Framework::Ons, Framework::Bpmn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aneel => "ANEEL",
            Self::Ons => "ONS",
            Self::Bpmn => "BPMN",
        }
    }

    /// Corpus domain used to pick the system instruction for generation.
    pub fn domain(&self) -> Domain {
        match self {
            Self::Bpmn => Domain::ProcessNotation,
            Self::Aneel | Self::Ons => Domain::Regulatory,
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ANEEL" => Ok(Self::Aneel),
            "ONS" => Ok(Self::Ons),
            "BPMN" => Ok(Self::Bpmn),
            other => Err(CoreError::UnknownFramework(other.to_string())),
        }
    }
}

/// Kind of corpus a framework belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Process-modelling notation standards.
    ProcessNotation,
    /// Regulatory and grid-operation rules.
    Regulatory,
}

/// A canonical regulatory or process requirement, as held by the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub framework: Framework,
    pub code: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub version: Option<String>,
    /// Owning tenant; `None` means the requirement is part of the global corpus.
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub vectorized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Requirement {
    /// Build an unvectorized requirement with a fresh id.
    pub fn from_new(new: NewRequirement) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            framework: new.framework,
            code: new.code,
            title: new.title,
            description: new.description,
            category: new.category,
            version: new.version,
            tenant_id: new.tenant_id,
            embedding: None,
            vectorized_at: None,
            created_at: Utc::now(),
        }
    }

    /// Text submitted to the embedding provider.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, &self.description)
    }

    pub fn is_vectorized(&self) -> bool {
        self.embedding.is_some()
    }
}

/// `title + "\n\n" + description`, the canonical text a requirement is embedded from.
pub fn embedding_text(title: &str, description: &str) -> String {
    format!("{title}\n\n{description}")
}

/// Input for a new requirement, as received from callers or import files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequirement {
    pub framework: Framework,
    pub code: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Content edit of an existing requirement. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub version: Option<String>,
}

impl RequirementPatch {
    /// Whether applying this patch changes the text the embedding is derived from.
    pub fn touches_embedding_text(&self, current: &Requirement) -> bool {
        self.title.as_ref().is_some_and(|t| *t != current.title)
            || self
                .description
                .as_ref()
                .is_some_and(|d| *d != current.description)
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.version.is_none()
    }

    /// Apply the content fields to `req`. Embedding fields are never touched here.
    pub fn apply(&self, req: &mut Requirement) {
        if let Some(t) = &self.title {
            req.title = t.clone();
        }
        if let Some(d) = &self.description {
            req.description = d.clone();
        }
        if let Some(c) = &self.category {
            req.category = Some(c.clone());
        }
        if let Some(v) = &self.version {
            req.version = Some(v.clone());
        }
    }
}

/// A requirement ranked against a query embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub framework: Framework,
    pub code: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    /// `1 - cosine_distance`.
    pub similarity: f32,
}

impl SearchResult {
    pub fn from_requirement(req: &Requirement, similarity: f32) -> Self {
        Self {
            id: req.id.clone(),
            framework: req.framework,
            code: req.code.clone(),
            title: req.title.clone(),
            description: req.description.clone(),
            category: req.category.clone(),
            similarity,
        }
    }
}

/// Order results by descending similarity, breaking ties by id so identical
/// inputs always produce the same sequence.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// One page of requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Cosine similarity of two vectors. Zero-norm input yields `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
