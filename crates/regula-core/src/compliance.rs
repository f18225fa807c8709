//! Compliance findings produced by scoring entity text against the requirement corpus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Similarity at or above which a requirement counts as met.
pub const MET_THRESHOLD: f32 = 0.9;
/// Similarity at or above which a requirement counts as partially met.
pub const PARTIAL_THRESHOLD: f32 = 0.7;

/// Compliance status of one entity against one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "atendido")]
    Met,
    #[serde(rename = "parcialmente_atendido")]
    PartiallyMet,
    #[serde(rename = "nao_atendido")]
    NotMet,
}

impl ComplianceStatus {
    /// Map a similarity score onto a status.
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity >= MET_THRESHOLD {
            Self::Met
        } else if similarity >= PARTIAL_THRESHOLD {
            Self::PartiallyMet
        } else {
            Self::NotMet
        }
    }

    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Met => "atendido",
            Self::PartiallyMet => "parcialmente_atendido",
            Self::NotMet => "nao_atendido",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "atendido" => Some(Self::Met),
            "parcialmente_atendido" => Some(Self::PartiallyMet),
            "nao_atendido" => Some(Self::NotMet),
            _ => None,
        }
    }
}

/// Result of scoring one entity against one matched requirement.
///
/// Findings are append-only: every scoring run writes new rows, so the
/// history for an entity is the full audit trail of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceFinding {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub requirement_id: String,
    pub similarity: f32,
    pub status: ComplianceStatus,
    pub analisado_por_ia: bool,
    pub tenant_id: Option<String>,
    pub analysed_at: DateTime<Utc>,
}

impl ComplianceFinding {
    pub fn new(
        entity_type: &str,
        entity_id: &str,
        requirement_id: &str,
        similarity: f32,
        tenant_id: Option<&str>,
        analysed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            requirement_id: requirement_id.to_string(),
            similarity,
            status: ComplianceStatus::from_similarity(similarity),
            analisado_por_ia: true,
            tenant_id: tenant_id.map(str::to_string),
            analysed_at,
        }
    }
}
