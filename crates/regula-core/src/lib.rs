//! Core types, index schemas, and shared configuration for the regulatory knowledge engine.

pub mod compliance;
pub mod config;
mod error;
pub mod requirement;
pub mod restrict;
pub mod schema;

pub use compliance::{ComplianceFinding, ComplianceStatus};
pub use config::EngineConfig;
pub use error::CoreError;
pub use requirement::{
    Domain, Framework, NewRequirement, Page, Requirement, RequirementPatch, SearchResult,
    cosine_similarity, embedding_text, rank,
};
pub use restrict::{IndexEntry, Restrict};
pub use schema::index;
