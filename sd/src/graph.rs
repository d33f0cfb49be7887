//! Async facade over the graph projection store
//!
//! Serializes access behind a single lock (one writer at a time) and adds
//! per-operation structured logging. Connection-level failures surface to
//! the caller; query paths that the spec allows to degrade are absorbed at
//! the call sites.

use std::path::Path;
use std::sync::Arc;

use graphstore::{
    Category, CleanupSummary, CodePattern, DuplicateGroup, GraphStore, KeepStrategy, SearchHit, Standard,
    StandardChanges, StandardCriteria, StoreError, Violation, ViolationStats,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Shared handle to the graph projection
#[derive(Clone)]
pub struct GraphClient {
    store: Arc<Mutex<GraphStore>>,
}

impl GraphClient {
    /// Open (or create) the projection database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = GraphStore::open(path)?;
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
        })
    }

    /// In-memory projection for tests and degraded mode
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            store: Arc::new(Mutex::new(GraphStore::in_memory()?)),
        })
    }

    pub async fn health_check(&self) -> bool {
        self.store.lock().await.health_check()
    }

    pub async fn upsert_standard(&self, standard: &Standard) -> Result<Standard, StoreError> {
        debug!(name = %standard.name, language = %standard.language, "graph: upsert_standard");
        self.store.lock().await.upsert_standard(standard)
    }

    pub async fn get_standard(&self, id: &str) -> Result<Option<Standard>, StoreError> {
        self.store.lock().await.get_standard(id)
    }

    pub async fn find_by_natural_key(
        &self,
        language: &str,
        category: Category,
        name: &str,
    ) -> Result<Option<Standard>, StoreError> {
        self.store.lock().await.find_by_natural_key(language, category, name)
    }

    pub async fn find_by_criteria(&self, criteria: &StandardCriteria) -> Result<Vec<Standard>, StoreError> {
        self.store.lock().await.find_by_criteria(criteria)
    }

    pub async fn list_standards(
        &self,
        limit: usize,
        offset: usize,
        active_only: bool,
    ) -> Result<Vec<Standard>, StoreError> {
        self.store.lock().await.list_standards(limit, offset, active_only)
    }

    pub async fn count_standards(&self, active_only: bool) -> Result<u64, StoreError> {
        self.store.lock().await.count_standards(active_only)
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SearchHit>, StoreError> {
        debug!(%query, limit, "graph: semantic_search");
        self.store.lock().await.semantic_search(query, limit, threshold)
    }

    pub async fn update_standard(
        &self,
        id: &str,
        changes: &StandardChanges,
    ) -> Result<Option<Standard>, StoreError> {
        self.store.lock().await.update_standard(id, changes)
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool, StoreError> {
        self.store.lock().await.set_active(id, active)
    }

    pub async fn delete_standards_with_source(&self, file_source: &str) -> Result<usize, StoreError> {
        self.store.lock().await.delete_standards_with_source(file_source)
    }

    pub async fn record_violation(&self, violation: &Violation) -> Result<(), StoreError> {
        self.store.lock().await.record_violation(violation)
    }

    pub async fn violation_statistics(&self) -> Result<ViolationStats, StoreError> {
        self.store.lock().await.violation_statistics()
    }

    pub async fn upsert_pattern(&self, pattern: &CodePattern) -> Result<CodePattern, StoreError> {
        self.store.lock().await.upsert_pattern(pattern)
    }

    pub async fn emerging_patterns(&self, min_frequency: u64) -> Result<Vec<CodePattern>, StoreError> {
        self.store.lock().await.emerging_patterns(min_frequency)
    }

    pub async fn evolve_pattern_to_standard(&self, pattern_id: &str, standard_id: &str) -> Result<(), StoreError> {
        self.store.lock().await.evolve_pattern_to_standard(pattern_id, standard_id)
    }

    pub async fn find_duplicates(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        self.store.lock().await.find_duplicates()
    }

    pub async fn cleanup_duplicates(&self, keep: KeepStrategy) -> Result<CleanupSummary, StoreError> {
        self.store.lock().await.cleanup_duplicates(keep)
    }
}
