use regula_ai::ProviderError;
use regula_core::CoreError;
use regula_store::StoreError;
use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Vector index failures never appear here: they are logged and the engine
/// falls back to the primary store.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any provider or store call.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { framework, code } => {
                Self::Conflict(format!("requirement {framework} {code} already exists"))
            }
            StoreError::NotFound(id) => Self::NotFound(format!("requirement {id}")),
            other => Self::Store(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_maps_to_conflict() {
        let err: EngineError = StoreError::Duplicate {
            framework: "ONS".into(),
            code: "SM-2.3".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Conflict(ref m) if m.contains("SM-2.3")));
    }

    #[test]
    fn unknown_framework_is_validation() {
        let err: EngineError = "IEEE".parse::<regula_core::Framework>().unwrap_err().into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn other_store_errors_pass_through() {
        let err: EngineError = StoreError::NonFiniteVector.into();
        assert!(matches!(err, EngineError::Store(StoreError::NonFiniteVector)));
    }
}
