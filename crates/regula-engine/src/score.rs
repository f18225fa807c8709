use chrono::Utc;
use regula_core::ComplianceFinding;
use tracing::info;

use crate::retrieve::Retrieval;
use crate::{Engine, EngineError, validate};

impl Engine {
    /// Score an entity's text against the corpus and record one finding per
    /// matched requirement. Earlier findings for the entity are kept.
    pub async fn score_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        text: &str,
        tenant_id: Option<&str>,
    ) -> Result<Vec<ComplianceFinding>, EngineError> {
        validate::entity(entity_type, entity_id, text)?;

        let vector = self.embed(text).await?;
        let matches = self
            .retrieve(
                &vector,
                Retrieval {
                    framework: None,
                    tenant_id,
                    threshold: self.config.scoring_floor,
                    limit: self.config.scoring_limit,
                },
            )
            .await?;

        let analysed_at = Utc::now();
        let findings: Vec<ComplianceFinding> = matches
            .iter()
            .map(|m| {
                ComplianceFinding::new(entity_type, entity_id, &m.id, m.similarity, tenant_id, analysed_at)
            })
            .collect();
        if !findings.is_empty() {
            self.findings.insert_findings(&findings).await?;
        }
        info!(entity_type, entity_id, findings = findings.len(), "entity scored");
        Ok(findings)
    }

    /// Every finding recorded for the entity, newest first.
    pub async fn findings_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ComplianceFinding>, EngineError> {
        Ok(self.findings.findings_for(entity_type, entity_id).await?)
    }
}
