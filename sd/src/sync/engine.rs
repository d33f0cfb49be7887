//! Filesystem-to-graph synchronization engine

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use graphstore::StoreError;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::graph::GraphClient;
use crate::parser::StandardsParser;

use super::metadata::{FileMetadata, MetadataIndex};

/// Directory holding archived standard versions; not imported
const ARCHIVE_DIR: &str = "archive";

/// Errors from a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Counters for one sync run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub files_added: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub standards_added: usize,
    pub standards_deleted: usize,
    pub duration_seconds: f64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub fn has_changes(&self) -> bool {
        self.files_added + self.files_updated + self.files_deleted > 0
    }
}

/// Point-in-time sync status
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub files_tracked: usize,
    pub standards_in_files: usize,
    pub standards_in_db: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub synchronized: bool,
}

#[derive(Default)]
struct SyncState {
    index: MetadataIndex,
    last_stats: SyncStats,
}

/// Reconciles the standards tree with the graph projection
///
/// The whole run executes under one lock, so concurrent manual triggers
/// serialize and the scheduled loop can skip ticks instead of queuing.
pub struct SyncEngine {
    graph: GraphClient,
    parser: StandardsParser,
    standards_dir: PathBuf,
    metadata_path: PathBuf,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(graph: GraphClient, standards_dir: impl Into<PathBuf>) -> Self {
        let standards_dir = standards_dir.into();
        let metadata_path = standards_dir.join(".sync_metadata.json");
        let index = MetadataIndex::load(&metadata_path);

        Self {
            graph,
            parser: StandardsParser::new(),
            standards_dir,
            metadata_path,
            state: Mutex::new(SyncState {
                index,
                last_stats: SyncStats::default(),
            }),
        }
    }

    /// True while a sync run holds the engine
    pub fn is_syncing(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Reconcile the tree with the projection
    ///
    /// `force` reclassifies every discovered file as modified. Per-file
    /// failures are logged and skipped; their index entries stay untouched
    /// so the next run retries them.
    pub async fn sync_all(&self, force: bool) -> Result<SyncStats, SyncError> {
        let started = std::time::Instant::now();
        info!(force, "Starting standards synchronization");

        let mut state = self.state.lock().await;
        let mut stats = SyncStats::default();

        let current_files = self.discover_files();

        // Classify against the persisted index
        let mut added: Vec<String> = Vec::new();
        let mut modified: Vec<String> = Vec::new();
        for (rel_path, abs_path) in &current_files {
            let current = match FileMetadata::capture(rel_path, abs_path) {
                Ok(current) => current,
                Err(e) => {
                    warn!(path = %rel_path, error = %e, "Failed to stat standards file");
                    continue;
                }
            };
            match state.index.entries.get(rel_path) {
                None => added.push(rel_path.clone()),
                Some(previous) if force || current.has_changed(previous) => modified.push(rel_path.clone()),
                Some(_) => {}
            }
        }
        let deleted: Vec<String> = state
            .index
            .entries
            .keys()
            .filter(|rel| !current_files.contains_key(*rel))
            .cloned()
            .collect();

        debug!(
            added = added.len(),
            modified = modified.len(),
            deleted = deleted.len(),
            "Detected changes"
        );

        // Deletions first: a rename is not detectable, so it lands as
        // delete + add
        for rel_path in &deleted {
            match self.graph.delete_standards_with_source(rel_path).await {
                Ok(count) => {
                    stats.standards_deleted += count;
                    stats.files_deleted += 1;
                    state.index.entries.remove(rel_path);
                    info!(path = %rel_path, removed = count, "Removed standards for deleted file");
                }
                Err(e) => warn!(path = %rel_path, error = %e, "Failed to process deletion"),
            }
        }

        for rel_path in &modified {
            match self.graph.delete_standards_with_source(rel_path).await {
                Ok(count) => stats.standards_deleted += count,
                Err(e) => {
                    warn!(path = %rel_path, error = %e, "Failed to clear standards before reimport");
                    continue;
                }
            }
            match self.import_file(rel_path, &current_files[rel_path]).await {
                Ok(meta) => {
                    stats.standards_added += meta.standards_count;
                    stats.files_updated += 1;
                    state.index.entries.insert(rel_path.clone(), meta);
                }
                Err(e) => warn!(path = %rel_path, error = %e, "Failed to reimport modified file"),
            }
        }

        for rel_path in &added {
            match self.import_file(rel_path, &current_files[rel_path]).await {
                Ok(meta) => {
                    stats.standards_added += meta.standards_count;
                    stats.files_added += 1;
                    state.index.entries.insert(rel_path.clone(), meta);
                }
                Err(e) => warn!(path = %rel_path, error = %e, "Failed to import new file"),
            }
        }

        if let Err(e) = state.index.save(&self.metadata_path) {
            warn!(error = %e, "Failed to persist sync metadata; next run will re-detect");
        }

        stats.duration_seconds = started.elapsed().as_secs_f64();
        stats.last_sync = Some(Utc::now());
        state.last_stats = stats.clone();

        info!(
            files_added = stats.files_added,
            files_updated = stats.files_updated,
            files_deleted = stats.files_deleted,
            standards_added = stats.standards_added,
            standards_deleted = stats.standards_deleted,
            "Synchronization complete"
        );
        Ok(stats)
    }

    /// Parse a file and upsert every draft, stamping the source path
    async fn import_file(&self, rel_path: &str, abs_path: &Path) -> Result<FileMetadata, SyncError> {
        let mut meta = FileMetadata::capture(rel_path, abs_path)?;
        let language = rel_path.split('/').next().unwrap_or("general").to_string();

        let bytes = std::fs::read(abs_path)?;
        let drafts = self.parser.parse(&bytes, &language);

        let mut imported = 0;
        for draft in drafts {
            let standard = draft.into_standard(Some(rel_path.to_string()));
            match self.graph.upsert_standard(&standard).await {
                Ok(_) => imported += 1,
                Err(e) => warn!(path = %rel_path, name = %standard.name, error = %e, "Failed to import standard"),
            }
        }

        meta.standards_count = imported;
        info!(path = %rel_path, count = imported, "Imported standards from file");
        Ok(meta)
    }

    /// Walk the standards root: language directories, recursive `*.md`
    ///
    /// Hidden files and archive subdirectories are skipped. A missing root
    /// reads as empty.
    fn discover_files(&self) -> BTreeMap<String, PathBuf> {
        let mut files = BTreeMap::new();

        let entries = match std::fs::read_dir(&self.standards_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.standards_dir.display(), error = %e, "Standards root not readable");
                return files;
            }
        };

        for language_dir in entries.flatten() {
            let path = language_dir.path();
            let name = language_dir.file_name().to_string_lossy().to_string();
            if !path.is_dir() || name.starts_with('.') {
                continue;
            }

            for entry in WalkDir::new(&path).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let hidden_or_archived = entry.path().components().any(|c| {
                    let part = c.as_os_str().to_string_lossy();
                    part.starts_with('.') && part.len() > 1 || part == ARCHIVE_DIR
                });
                if hidden_or_archived {
                    continue;
                }

                if let Ok(rel) = entry.path().strip_prefix(&self.standards_dir) {
                    let rel_path = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.insert(rel_path, entry.path().to_path_buf());
                }
            }
        }

        debug!(count = files.len(), "Discovered markdown files");
        files
    }

    /// Current synchronization status
    pub async fn status(&self) -> SyncStatus {
        let state = self.state.lock().await;
        let standards_in_files: usize = state.index.entries.values().map(|m| m.standards_count).sum();

        let standards_in_db = match self.graph.count_standards(false).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count standards in store");
                0
            }
        };

        SyncStatus {
            files_tracked: state.index.entries.len(),
            standards_in_files,
            standards_in_db,
            last_sync: state.last_stats.last_sync,
            synchronized: standards_in_files as u64 == standards_in_db,
        }
    }

    /// Stats of the last completed run
    pub async fn last_stats(&self) -> SyncStats {
        self.state.lock().await.last_stats.clone()
    }
}
