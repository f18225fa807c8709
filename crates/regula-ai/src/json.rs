//! Parsing of model output that is supposed to be JSON.

use serde::de::DeserializeOwned;

use crate::ProviderError;

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Deserialize a JSON-mode generation, tolerating an incidental code fence.
pub fn parse_json_output<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| ProviderError::GenerationParse {
        message: e.to_string(),
        raw: raw.to_string(),
    })
}
