use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown framework {0:?} (expected ANEEL, ONS or BPMN)")]
    UnknownFramework(String),
}
