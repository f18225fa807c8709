//! Entry-point validation. Everything here runs before any external call.

use regula_core::{NewRequirement, RequirementPatch};

use crate::EngineError;

pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const MIN_QUERY_CHARS: usize = 3;
pub const MIN_QUESTION_CHARS: usize = 10;
pub const MAX_RULES: usize = 20;
pub const MAX_LIST_LIMIT: usize = 200;

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::Validation(msg.into())
}

fn chars(s: &str) -> usize {
    s.trim().chars().count()
}

fn non_empty(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn description(value: &str) -> Result<(), EngineError> {
    if chars(value) < MIN_DESCRIPTION_CHARS {
        return Err(invalid(format!(
            "description must have at least {MIN_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn new_requirement(req: &NewRequirement) -> Result<(), EngineError> {
    non_empty("code", &req.code)?;
    non_empty("title", &req.title)?;
    description(&req.description)?;
    if let Some(tenant) = &req.tenant_id {
        non_empty("tenant_id", tenant)?;
    }
    Ok(())
}

pub fn patch(patch: &RequirementPatch) -> Result<(), EngineError> {
    if patch.is_empty() {
        return Err(invalid("patch changes nothing"));
    }
    if let Some(title) = &patch.title {
        non_empty("title", title)?;
    }
    if let Some(desc) = &patch.description {
        description(desc)?;
    }
    Ok(())
}

pub fn search(query: &str, threshold: f32, limit: usize) -> Result<(), EngineError> {
    if chars(query) < MIN_QUERY_CHARS {
        return Err(invalid(format!(
            "query must have at least {MIN_QUERY_CHARS} characters"
        )));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(invalid(format!("threshold {threshold} is outside [0, 1]")));
    }
    if limit == 0 {
        return Err(invalid("limit must be at least 1"));
    }
    Ok(())
}

pub fn question(question: &str, max_rules: usize) -> Result<(), EngineError> {
    if chars(question) < MIN_QUESTION_CHARS {
        return Err(invalid(format!(
            "question must have at least {MIN_QUESTION_CHARS} characters"
        )));
    }
    if !(1..=MAX_RULES).contains(&max_rules) {
        return Err(invalid(format!("max_rules must be between 1 and {MAX_RULES}")));
    }
    Ok(())
}

pub fn entity(entity_type: &str, entity_id: &str, text: &str) -> Result<(), EngineError> {
    non_empty("entity_type", entity_type)?;
    non_empty("entity_id", entity_id)?;
    non_empty("text", text)
}

/// Clamp a listing limit into `1..=MAX_LIST_LIMIT`.
pub fn list_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regula_core::Framework;

    fn new(code: &str, title: &str, description: &str) -> NewRequirement {
        NewRequirement {
            framework: Framework::Aneel,
            code: code.into(),
            title: title.into(),
            description: description.into(),
            category: None,
            version: None,
            tenant_id: None,
        }
    }

    #[test]
    fn requirement_rules() {
        assert!(new_requirement(&new("REN-1", "Título", "Descrição longa o bastante")).is_ok());
        assert!(new_requirement(&new(" ", "Título", "Descrição longa o bastante")).is_err());
        assert!(new_requirement(&new("REN-1", "", "Descrição longa o bastante")).is_err());
        assert!(new_requirement(&new("REN-1", "Título", "curta")).is_err());
        // Ten characters, counted as chars rather than bytes.
        assert!(new_requirement(&new("REN-1", "Título", "ação ação!")).is_ok());
    }

    #[test]
    fn search_rules() {
        assert!(search("tensão", 0.7, 10).is_ok());
        assert!(search("ab", 0.7, 10).is_err());
        assert!(search("tensão", 1.2, 10).is_err());
        assert!(search("tensão", -0.1, 10).is_err());
        assert!(search("tensão", 0.0, 0).is_err());
    }

    #[test]
    fn question_rules() {
        assert!(question("Qual o prazo de religação?", 5).is_ok());
        assert!(question("Prazo?", 5).is_err());
        assert!(question("Qual o prazo de religação?", 0).is_err());
        assert!(question("Qual o prazo de religação?", 21).is_err());
        assert!(question("Qual o prazo de religação?", 20).is_ok());
    }

    #[test]
    fn patch_rules() {
        assert!(patch(&RequirementPatch::default()).is_err());
        let p = RequirementPatch {
            description: Some("curta".into()),
            ..Default::default()
        };
        assert!(patch(&p).is_err());
        let p = RequirementPatch {
            version: Some("2024".into()),
            ..Default::default()
        };
        assert!(patch(&p).is_ok());
    }

    #[test]
    fn list_limit_is_clamped() {
        assert_eq!(list_limit(0), 1);
        assert_eq!(list_limit(50), 50);
        assert_eq!(list_limit(10_000), 200);
    }
}
