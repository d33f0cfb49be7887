//! GraphStore - embedded graph projection for coding standards
//!
//! Stores `Standard`, `Violation`, `CodePattern`, and `Project` entities with
//! the relationships the auditing pipeline needs (violations point at
//! standards, patterns evolve into standards). The projection is backed by an
//! embedded SQLite database; the client contract is transport-agnostic, so a
//! remote graph database can replace the embedded backend without touching
//! callers.
//!
//! # Key semantics
//!
//! - Upserts match on the natural key `(language, category, name)`. A match
//!   refreshes content fields and `updated_at` while preserving `id` and
//!   `created_at`.
//! - Schema setup is idempotent: unique constraints on entity ids plus
//!   secondary indexes on the hot query columns, created at `open`.
//! - Per-operation failures are reported as structured errors; callers decide
//!   whether to absorb or surface them.
//!
//! # Example
//!
//! ```ignore
//! use graphstore::{GraphStore, Standard};
//!
//! let mut store = GraphStore::open(".graphstore/standards.db")?;
//! store.upsert_standard(&standard)?;
//! let hits = store.semantic_search("error handling", 10, 0.5)?;
//! ```

mod entities;
mod store;

pub use entities::{
    Category, CodePattern, DuplicateGroup, Example, ParseEnumError, Project, SearchHit, Severity, Standard, Violation,
};
pub use store::{CleanupSummary, GraphStore, KeepStrategy, StandardChanges, StandardCriteria, StoreError,
    ViolationStats};

/// Relevance score when the query term matches the standard's name
pub const SCORE_NAME_MATCH: f64 = 1.0;

/// Relevance score when only the description matches
pub const SCORE_DESCRIPTION_MATCH: f64 = 0.8;

/// Relevance score when only the category matches
pub const SCORE_CATEGORY_MATCH: f64 = 0.6;

/// Default cutoff below which search hits are dropped
pub const DEFAULT_SEARCH_THRESHOLD: f64 = 0.5;
