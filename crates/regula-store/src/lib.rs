//! Requirement storage for Regula.
//!
//! The primary store (DuckDB, or memory for embedded use) is authoritative
//! for requirements and findings. Vector indexes (LanceDB, Vertex AI Vector
//! Search, memory) are derived projections that can be rebuilt from it.

mod error;
pub mod memory;
mod traits;

#[cfg(feature = "duckdb")]
pub mod duck;
#[cfg(feature = "lancedb")]
pub mod lance;
#[cfg(feature = "vertex")]
pub mod vertex;

pub use error::{IndexError, StoreError};
pub use memory::{MemoryIndex, MemoryStore};
pub use traits::{FindingStore, IndexMatch, RequirementStore, VectorIndex, VectorQuery};

#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
#[cfg(feature = "lancedb")]
pub use lance::LanceIndex;
#[cfg(feature = "vertex")]
pub use vertex::{DistanceMeasure, VertexConfig, VertexIndex};
