//! Standards synchronization engine
//!
//! Discovers markdown files under the standards root, detects changes by
//! mtime and content hash against a sidecar index, and reconciles
//! adds/modifications/deletions into the graph projection. A scheduled
//! wrapper re-runs the sync on an interval.

mod engine;
mod metadata;
mod scheduler;

pub use engine::{SyncEngine, SyncError, SyncStats, SyncStatus};
pub use metadata::{FileMetadata, MetadataIndex};
pub use scheduler::ScheduledSync;
