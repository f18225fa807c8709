//! Gap analysis of a process against one or more frameworks.

use regula_ai::{GenerateRequest, ProviderError, parse_json_output};
use regula_core::Framework;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consult::format_context;
use crate::retrieve::Retrieval;
use crate::{Engine, EngineError, NO_RULES_ANSWER};

/// One step of the process under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    #[serde(rename = "nome", alias = "name")]
    pub name: String,
    #[serde(rename = "descricao", alias = "description", default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Alta,
    #[serde(alias = "média")]
    Media,
    Baixa,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    #[serde(rename = "etapa")]
    pub step: String,
    #[serde(rename = "problema")]
    pub problem: String,
    #[serde(rename = "recomendacao", alias = "recomendação")]
    pub recommendation: String,
    #[serde(rename = "severidade")]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub framework: Framework,
    /// Adherence score in `0..=100`.
    #[serde(rename = "score_conformidade")]
    pub score: u8,
    pub gaps: Vec<Gap>,
    #[serde(rename = "pontos_fortes")]
    pub strengths: Vec<String>,
}

/// Shape the model is asked to produce. The framework it echoes back is ignored.
#[derive(Deserialize)]
struct RawAnalysis {
    score_conformidade: f64,
    #[serde(default)]
    gaps: Vec<Gap>,
    #[serde(default)]
    pontos_fortes: Vec<String>,
}

fn parse_analysis(framework: Framework, raw: &str) -> Result<GapAnalysis, ProviderError> {
    let parsed: RawAnalysis = parse_json_output(raw)?;
    let score = parsed.score_conformidade;
    if !(0.0..=100.0).contains(&score) {
        return Err(ProviderError::GenerationParse {
            message: format!("score_conformidade {score} is outside 0..=100"),
            raw: raw.to_string(),
        });
    }
    Ok(GapAnalysis {
        framework,
        score: score.round() as u8,
        gaps: parsed.gaps,
        strengths: parsed.pontos_fortes,
    })
}

fn rules_question(steps: &[ProcessStep]) -> String {
    let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    format!(
        "Quais requisitos de segurança e conformidade se aplicam às seguintes etapas de operação: {}?",
        names.join(", ")
    )
}

fn audit_prompt(framework: Framework, steps: &[ProcessStep], context: &str) -> String {
    let listed: Vec<String> = steps
        .iter()
        .map(|s| match &s.description {
            Some(d) => format!("- {}: {d}", s.name),
            None => format!("- {}", s.name),
        })
        .collect();
    format!(
        "Atue como auditor de conformidade. Avalie a aderência das etapas abaixo ao framework \
         {framework}, usando apenas o contexto normativo fornecido.\n\n\
         Etapas do processo:\n{steps}\n\n\
         Contexto normativo:\n{context}\n\n\
         Responda somente com um objeto JSON no formato:\n\
         {{\"framework\": \"{framework}\", \"score_conformidade\": <0 a 100>, \
         \"gaps\": [{{\"etapa\": \"...\", \"problema\": \"...\", \"recomendacao\": \"...\", \
         \"severidade\": \"alta|media|baixa\"}}], \"pontos_fortes\": [\"...\"]}}",
        steps = listed.join("\n"),
    )
}

impl Engine {
    /// Assess `steps` against each framework in turn. The rules retrieved for
    /// the step names become the context of one structured gap-analysis
    /// generation per framework.
    pub async fn cross_check(
        &self,
        steps: &[ProcessStep],
        frameworks: &[Framework],
    ) -> Result<Vec<GapAnalysis>, EngineError> {
        if steps.is_empty() {
            return Err(EngineError::Validation("process has no steps to analyse".into()));
        }
        if steps.iter().any(|s| s.name.trim().is_empty()) {
            return Err(EngineError::Validation("process step names must not be empty".into()));
        }
        if frameworks.is_empty() {
            return Err(EngineError::Validation("at least one framework is required".into()));
        }

        let mut unique: Vec<Framework> = Vec::with_capacity(frameworks.len());
        for f in frameworks {
            if !unique.contains(f) {
                unique.push(*f);
            }
        }

        let question = rules_question(steps);
        let vector = self.embed(&question).await?;
        let mut analyses = Vec::with_capacity(unique.len());
        for framework in unique {
            let rules = self
                .retrieve(
                    &vector,
                    Retrieval {
                        framework: Some(framework),
                        tenant_id: None,
                        threshold: self.config.consult_threshold,
                        limit: self.config.max_rules,
                    },
                )
                .await?;
            let context = if rules.is_empty() {
                NO_RULES_ANSWER.to_string()
            } else {
                format_context(&rules)
            };

            let request = GenerateRequest::new(audit_prompt(framework, steps, &context))
                .temperature(self.config.temperature)
                .json();
            let generation = self.generate(&request).await?;
            let analysis = parse_analysis(framework, &generation.text)?;
            info!(
                %framework,
                score = analysis.score,
                gaps = analysis.gaps.len(),
                "cross-check analysed"
            );
            analyses.push(analysis);
        }
        Ok(analyses)
    }
}
