//! Retrieval-augmented answers grounded in the requirement corpus.

use std::collections::HashMap;

use regula_ai::{GenerateRequest, Usage};
use regula_core::{Domain, Framework, SearchResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::retrieve::Retrieval;
use crate::{Engine, EngineError, validate};

/// Answer returned when retrieval finds nothing above the consult threshold.
pub const NO_RULES_ANSWER: &str = "Nenhuma regra relevante foi encontrada na base de conhecimento \
para esta pergunta. Reformule a pergunta ou confira se o framework informado possui requisitos \
cadastrados.";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const REGULATORY_INSTRUCTION: &str = "Você é um especialista em regulação do setor elétrico \
brasileiro, com domínio das resoluções da ANEEL e dos Procedimentos de Rede do ONS. Responda \
somente com base nas regras fornecidas no contexto. Cite o código de cada regra usada. Se o \
contexto não bastar para responder, diga isso claramente. Responda em português.";

const PROCESS_NOTATION_INSTRUCTION: &str = "Você é um especialista em modelagem de processos com \
BPMN 2.0. Responda somente com base nas regras da notação fornecidas no contexto, citando o código \
de cada regra usada. Aponte usos incorretos de elementos quando for o caso. Responda em português.";

/// System instruction per corpus domain.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInstructions {
    by_domain: HashMap<Domain, String>,
}

impl Default for SystemInstructions {
    fn default() -> Self {
        Self {
            by_domain: HashMap::from([
                (Domain::Regulatory, REGULATORY_INSTRUCTION.to_string()),
                (Domain::ProcessNotation, PROCESS_NOTATION_INSTRUCTION.to_string()),
            ]),
        }
    }
}

impl SystemInstructions {
    pub fn get(&self, domain: Domain) -> &str {
        self.by_domain
            .get(&domain)
            .map(String::as_str)
            .unwrap_or(REGULATORY_INSTRUCTION)
    }

    /// Replace the instruction used for `domain`.
    pub fn with(mut self, domain: Domain, instruction: impl Into<String>) -> Self {
        self.by_domain.insert(domain, instruction.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsultOptions {
    pub framework: Option<Framework>,
    /// Number of rules fed into the prompt. Defaults to the engine's `max_rules`.
    pub max_rules: Option<usize>,
    /// Return the assembled context alongside the answer.
    pub include_context: bool,
    pub tenant_id: Option<String>,
}

/// A rule the answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub framework: Framework,
    pub code: String,
    pub title: String,
    pub similarity: f32,
}

impl From<&SearchResult> for Citation {
    fn from(r: &SearchResult) -> Self {
        Self {
            id: r.id.clone(),
            framework: r.framework,
            code: r.code.clone(),
            title: r.title.clone(),
            similarity: r.similarity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultAnswer {
    #[serde(rename = "resposta")]
    pub answer: String,
    /// Ranked rules used as context.
    #[serde(rename = "regrasEncontradas")]
    pub rules: Vec<Citation>,
    #[serde(rename = "contexto")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<Usage>,
}

/// Render ranked results as the context block of a prompt.
pub(crate) fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| {
            let mut section = format!(
                "**{} - {}: {}**\n{}",
                r.framework, r.code, r.title, r.description
            );
            if let Some(category) = &r.category {
                section.push_str(&format!("\nCategoria: {category}"));
            }
            section.push_str(&format!("\nSimilaridade: {:.1}%", r.similarity * 100.0));
            section
        })
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

fn user_prompt(context: &str, question: &str) -> String {
    format!(
        "Regras recuperadas da base de conhecimento:\n\n{context}{SECTION_SEPARATOR}\
         Pergunta: {question}\n\n\
         Responda com base nas regras acima e cite os códigos (por exemplo, ONS - SM-2.3) \
         das regras que sustentam a resposta."
    )
}

impl Engine {
    /// Answer `question` from the rules most similar to it.
    ///
    /// When nothing clears the consult threshold the fixed
    /// [`NO_RULES_ANSWER`] is returned and the generator is never called.
    pub async fn consult(
        &self,
        question: &str,
        opts: &ConsultOptions,
    ) -> Result<ConsultAnswer, EngineError> {
        let max_rules = opts.max_rules.unwrap_or(self.config.max_rules);
        validate::question(question, max_rules)?;

        let vector = self.embed(question).await?;
        let results = self
            .retrieve(
                &vector,
                Retrieval {
                    framework: opts.framework,
                    tenant_id: opts.tenant_id.as_deref(),
                    threshold: self.config.consult_threshold,
                    limit: max_rules,
                },
            )
            .await?;

        if results.is_empty() {
            info!(framework = ?opts.framework, "consult found no rules");
            return Ok(ConsultAnswer {
                answer: NO_RULES_ANSWER.to_string(),
                rules: Vec::new(),
                context: None,
                usage: None,
            });
        }

        let domain = results
            .first()
            .map(|r| r.framework)
            .or(opts.framework)
            .map_or(Domain::Regulatory, |f| f.domain());
        let context = format_context(&results);
        let request = GenerateRequest::new(user_prompt(&context, question))
            .system(self.instructions.get(domain))
            .temperature(self.config.temperature);
        let generation = self.generate(&request).await?;
        info!(
            rules = results.len(),
            ?domain,
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "consult answered"
        );

        Ok(ConsultAnswer {
            answer: generation.text,
            rules: results.iter().map(Citation::from).collect(),
            context: opts.include_context.then_some(context),
            usage: Some(generation.usage),
        })
    }
}
