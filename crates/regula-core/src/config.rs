//! Engine tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds, limits and pacing used by the engine.
///
/// Defaults match the production settings; tests shorten `batch_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum similarity for plain semantic search.
    pub search_threshold: f32,
    /// Minimum similarity when assembling context for generation.
    pub consult_threshold: f32,
    /// Minimum similarity when scoring entity text.
    pub scoring_floor: f32,
    /// Maximum requirements matched per scoring run.
    pub scoring_limit: usize,
    /// Default result count for search.
    pub search_limit: usize,
    /// Default number of rules fed into a consult prompt.
    pub max_rules: usize,
    /// Items processed concurrently per import batch.
    pub batch_size: usize,
    /// Pause between import batches.
    #[serde(with = "millis")]
    pub batch_delay: Duration,
    /// Upper bound on any single provider call.
    #[serde(with = "millis")]
    pub provider_timeout: Duration,
    /// Sampling temperature for consult answers.
    pub temperature: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_threshold: 0.7,
            consult_threshold: 0.6,
            scoring_floor: 0.6,
            scoring_limit: 20,
            search_limit: 10,
            max_rules: 5,
            batch_size: 5,
            batch_delay: Duration::from_secs(2),
            provider_timeout: Duration::from_secs(30),
            temperature: 0.3,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
