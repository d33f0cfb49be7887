//! Sidecar index for sync change detection
//!
//! A single JSON document mapping relative file paths to their last observed
//! mtime, content hash, and extracted standards count. Writes go to a
//! temporary file and rename into place so a crash never leaves a torn
//! index.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Per-file state captured at the last successful sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Relative path under the standards root
    pub path: String,
    /// Modification time, seconds since the epoch
    pub last_modified: i64,
    /// SHA-256 of the file bytes, hex
    pub content_hash: String,
    /// Standards extracted from the file at last import
    pub standards_count: usize,
}

impl FileMetadata {
    /// Capture current metadata for a file
    pub fn capture(rel_path: &str, abs_path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(abs_path)?;
        let mtime = std::fs::metadata(abs_path)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Self {
            path: rel_path.to_string(),
            last_modified: mtime,
            content_hash: format!("{:x}", Sha256::digest(&bytes)),
            standards_count: 0,
        })
    }

    /// True when mtime or content hash differs
    pub fn has_changed(&self, other: &FileMetadata) -> bool {
        self.last_modified != other.last_modified || self.content_hash != other.content_hash
    }
}

/// The on-disk index, keyed by relative path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataIndex {
    #[serde(flatten)]
    pub entries: HashMap<String, FileMetadata>,
}

impl MetadataIndex {
    /// Load the index; a missing or corrupt file reads as empty
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(index) => index,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt sync metadata, starting fresh");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read sync metadata");
                Self::default()
            }
        }
    }

    /// Persist atomically: write a temp file, then rename over the target
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let serialized = serde_json::to_string_pretty(&self.entries)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_change_detection() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("rule.md");
        std::fs::write(&file, "alpha").unwrap();

        let before = FileMetadata::capture("rule.md", &file).unwrap();
        let same = FileMetadata::capture("rule.md", &file).unwrap();
        assert!(!before.has_changed(&same));

        std::fs::write(&file, "beta").unwrap();
        let after = FileMetadata::capture("rule.md", &file).unwrap();
        assert!(after.has_changed(&before), "hash differs after edit");
    }

    #[test]
    fn test_index_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".sync_metadata.json");

        let mut index = MetadataIndex::default();
        index.entries.insert(
            "python/err.md".to_string(),
            FileMetadata {
                path: "python/err.md".to_string(),
                last_modified: 1700000000,
                content_hash: "abc".to_string(),
                standards_count: 2,
            },
        );
        index.save(&path).unwrap();

        let loaded = MetadataIndex::load(&path);
        assert_eq!(loaded.entries, index.entries);
        assert!(!path.with_extension("json.tmp").exists(), "temp file renamed away");
    }

    #[test]
    fn test_missing_and_corrupt_index_read_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".sync_metadata.json");
        assert!(MetadataIndex::load(&path).entries.is_empty());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(MetadataIndex::load(&path).entries.is_empty());
    }
}
