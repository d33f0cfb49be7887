//! Core projection store implementation

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::entities::{
    Category, CodePattern, DuplicateGroup, Example, Project, SearchHit, Severity, Standard, Violation,
};
use crate::{SCORE_CATEGORY_MATCH, SCORE_DESCRIPTION_MATCH, SCORE_NAME_MATCH};

/// Errors from projection store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown standard: {0}")]
    UnknownStandard(String),

    #[error("unknown pattern: {0}")]
    UnknownPattern(String),
}

/// Which record survives duplicate cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepStrategy {
    /// Keep the earliest-created record
    #[default]
    First,
    /// Keep the most recently created record
    Newest,
}

/// Filters for standard queries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct StandardCriteria {
    pub language: Option<String>,
    pub category: Option<Category>,
    pub active_only: bool,
}

/// Partial update applied to a standard by id
#[derive(Debug, Clone, Default)]
pub struct StandardChanges {
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub examples: Option<Vec<Example>>,
    pub version: Option<String>,
    pub active: Option<bool>,
}

/// Summary of a duplicate cleanup run
#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupSummary {
    pub deleted_count: usize,
    pub duplicate_groups: usize,
}

/// Violation counts grouped by severity
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ViolationStats {
    pub total: u64,
    pub by_severity: HashMap<Severity, u64>,
}

/// The embedded graph projection store
///
/// One writer at a time; callers serialize access (the daemon wraps the
/// store behind an async mutex).
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open (or create) the projection database at the given path
    ///
    /// Schema setup runs on every open and is idempotent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Sqlite(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(e.to_string()),
                ))
            })?;
        }
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.ensure_schema()?;
        info!(path = %path.as_ref().display(), "Opened graph projection store");
        Ok(store)
    }

    /// Open an in-memory store (tests and degraded mode)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create tables, unique constraints, and secondary indexes
    ///
    /// Safe to call repeatedly; every statement is IF NOT EXISTS.
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"CREATE TABLE IF NOT EXISTS standards (
                id          TEXT NOT NULL,
                name        TEXT NOT NULL,
                language    TEXT NOT NULL,
                category    TEXT NOT NULL,
                severity    TEXT NOT NULL,
                description TEXT NOT NULL,
                examples    TEXT NOT NULL,
                version     TEXT NOT NULL,
                active      INTEGER NOT NULL,
                file_source TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS standard_id ON standards(id);
            CREATE INDEX IF NOT EXISTS standard_language ON standards(language);
            CREATE INDEX IF NOT EXISTS standard_category ON standards(category);

            CREATE TABLE IF NOT EXISTS violations (
                id          TEXT NOT NULL,
                standard_id TEXT NOT NULL,
                file_path   TEXT NOT NULL,
                line        INTEGER NOT NULL,
                "column"    INTEGER NOT NULL,
                message     TEXT NOT NULL,
                severity    TEXT NOT NULL,
                suggestion  TEXT NOT NULL,
                project_id  TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS violation_id ON violations(id);
            CREATE INDEX IF NOT EXISTS violation_severity ON violations(severity);
            CREATE INDEX IF NOT EXISTS violation_timestamp ON violations(timestamp);

            CREATE TABLE IF NOT EXISTS patterns (
                id           TEXT NOT NULL,
                pattern      TEXT NOT NULL,
                language     TEXT NOT NULL,
                description  TEXT NOT NULL,
                category     TEXT NOT NULL,
                frequency    INTEGER NOT NULL,
                first_seen   TEXT NOT NULL,
                last_seen    TEXT NOT NULL,
                evolved_into TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS pattern_id ON patterns(id);
            CREATE INDEX IF NOT EXISTS pattern_language ON patterns(language);
            CREATE INDEX IF NOT EXISTS pattern_category ON patterns(category);

            CREATE TABLE IF NOT EXISTS projects (
                id         TEXT NOT NULL,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS project_id ON projects(id);"#,
        )?;
        Ok(())
    }

    /// Cheap connectivity probe
    pub fn health_check(&self) -> bool {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }

    // === Standards ===

    /// Insert or update a standard, matching on `(language, category, name)`
    ///
    /// On match the stored `id` and `created_at` are preserved and content
    /// fields are refreshed. Returns the record as stored.
    pub fn upsert_standard(&self, standard: &Standard) -> Result<Standard, StoreError> {
        let existing: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT id, created_at FROM standards
                 WHERE language = ?1 AND category = ?2 AND name = ?3
                 ORDER BY created_at LIMIT 1",
                params![standard.language, standard.category.as_str(), standard.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let examples = serde_json::to_string(&standard.examples)?;
        let updated_at = Utc::now();

        let stored = match existing {
            Some((id, created_at)) => {
                self.conn.execute(
                    "UPDATE standards SET description = ?1, severity = ?2, examples = ?3,
                     updated_at = ?4, version = ?5, active = ?6, file_source = ?7
                     WHERE id = ?8",
                    params![
                        standard.description,
                        standard.severity.as_str(),
                        examples,
                        updated_at.to_rfc3339(),
                        standard.version,
                        standard.active,
                        standard.file_source,
                        id
                    ],
                )?;
                debug!(%id, language = %standard.language, name = %standard.name, "Upsert matched existing standard");
                Standard {
                    id,
                    created_at: parse_ts(&created_at)?,
                    updated_at,
                    ..standard.clone()
                }
            }
            None => {
                self.conn.execute(
                    "INSERT INTO standards
                     (id, name, language, category, severity, description, examples,
                      version, active, file_source, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        standard.id,
                        standard.name,
                        standard.language,
                        standard.category.as_str(),
                        standard.severity.as_str(),
                        standard.description,
                        examples,
                        standard.version,
                        standard.active,
                        standard.file_source,
                        standard.created_at.to_rfc3339(),
                        updated_at.to_rfc3339(),
                    ],
                )?;
                debug!(id = %standard.id, language = %standard.language, name = %standard.name, "Created standard");
                Standard {
                    updated_at,
                    ..standard.clone()
                }
            }
        };

        Ok(stored)
    }

    /// Get a standard by id
    pub fn get_standard(&self, id: &str) -> Result<Option<Standard>, StoreError> {
        let row = self
            .conn
            .query_row("SELECT * FROM standards WHERE id = ?1", params![id], map_standard)
            .optional()?;
        Ok(row)
    }

    /// Look up by the natural key
    pub fn find_by_natural_key(
        &self,
        language: &str,
        category: Category,
        name: &str,
    ) -> Result<Option<Standard>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT * FROM standards WHERE language = ?1 AND category = ?2 AND name = ?3
                 ORDER BY created_at LIMIT 1",
                params![language, category.as_str(), name],
                map_standard,
            )
            .optional()?;
        Ok(row)
    }

    /// Find standards matching the given criteria
    pub fn find_by_criteria(&self, criteria: &StandardCriteria) -> Result<Vec<Standard>, StoreError> {
        let mut sql = String::from("SELECT * FROM standards WHERE 1=1");
        let mut args: Vec<String> = Vec::new();

        if let Some(ref language) = criteria.language {
            args.push(language.clone());
            sql.push_str(&format!(" AND language = ?{}", args.len()));
        }
        if let Some(category) = criteria.category {
            args.push(category.as_str().to_string());
            sql.push_str(&format!(" AND category = ?{}", args.len()));
        }
        if criteria.active_only {
            sql.push_str(" AND active = 1");
        }
        sql.push_str(" ORDER BY severity, category, name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_standard)?;
        let standards = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(count = standards.len(), ?criteria, "find_by_criteria");
        Ok(standards)
    }

    /// List standards with pagination
    pub fn list_standards(&self, limit: usize, offset: usize, active_only: bool) -> Result<Vec<Standard>, StoreError> {
        let sql = if active_only {
            "SELECT * FROM standards WHERE active = 1
             ORDER BY language, category, name LIMIT ?1 OFFSET ?2"
        } else {
            "SELECT * FROM standards
             ORDER BY language, category, name LIMIT ?1 OFFSET ?2"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], map_standard)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total number of standards
    pub fn count_standards(&self, active_only: bool) -> Result<u64, StoreError> {
        let sql = if active_only {
            "SELECT COUNT(*) FROM standards WHERE active = 1"
        } else {
            "SELECT COUNT(*) FROM standards"
        };
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Text-based relevance search over name, description, and category
    ///
    /// Scores: name match 1.0, description 0.8, category 0.6. Hits below
    /// `threshold` are dropped; results are ordered by score descending,
    /// then name. A vector-embedding backend may replace this with the same
    /// contract.
    pub fn semantic_search(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>, StoreError> {
        let term = query.to_lowercase();
        let mut stmt = self.conn.prepare("SELECT * FROM standards WHERE active = 1")?;
        let rows = stmt.query_map([], map_standard)?;

        let mut hits = Vec::new();
        for row in rows {
            let standard = row?;
            let score = if standard.name.to_lowercase().contains(&term) {
                SCORE_NAME_MATCH
            } else if standard.description.to_lowercase().contains(&term) {
                SCORE_DESCRIPTION_MATCH
            } else if standard.category.as_str().contains(&term) {
                SCORE_CATEGORY_MATCH
            } else {
                continue;
            };
            if score >= threshold {
                hits.push(SearchHit {
                    standard,
                    relevance_score: score,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.standard.name.cmp(&b.standard.name))
        });
        hits.truncate(limit);
        debug!(query = %query, count = hits.len(), "semantic_search");
        Ok(hits)
    }

    /// Apply a partial update to a standard; `id` and `created_at` never change
    pub fn update_standard(&self, id: &str, changes: &StandardChanges) -> Result<Option<Standard>, StoreError> {
        let Some(mut standard) = self.get_standard(id)? else {
            return Ok(None);
        };

        if let Some(ref description) = changes.description {
            standard.description = description.clone();
        }
        if let Some(severity) = changes.severity {
            standard.severity = severity;
        }
        if let Some(ref examples) = changes.examples {
            standard.examples = examples.clone();
        }
        if let Some(ref version) = changes.version {
            standard.version = version.clone();
        }
        if let Some(active) = changes.active {
            standard.active = active;
        }
        standard.updated_at = Utc::now();

        self.conn.execute(
            "UPDATE standards SET description = ?1, severity = ?2, examples = ?3,
             version = ?4, active = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                standard.description,
                standard.severity.as_str(),
                serde_json::to_string(&standard.examples)?,
                standard.version,
                standard.active,
                standard.updated_at.to_rfc3339(),
                id
            ],
        )?;
        Ok(Some(standard))
    }

    /// Soft delete: mark a standard inactive
    pub fn set_active(&self, id: &str, active: bool) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE standards SET active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    /// Hard delete every standard whose `file_source` equals the given path
    ///
    /// Used by the sync engine when a source file changes or disappears.
    pub fn delete_standards_with_source(&self, file_source: &str) -> Result<usize, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM standards WHERE file_source = ?1", params![file_source])?;
        if deleted > 0 {
            info!(file_source, deleted, "Deleted standards by source file");
        }
        Ok(deleted)
    }

    // === Duplicates ===

    /// Group standards sharing a natural key, largest groups first
    pub fn find_duplicates(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT language, category, name, COUNT(*) AS cnt FROM standards
             GROUP BY language, category, name HAVING cnt > 1
             ORDER BY cnt DESC, language, category, name",
        )?;
        let keys = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups = Vec::new();
        for (language, category, name, count) in keys {
            let mut id_stmt = self.conn.prepare(
                "SELECT id FROM standards WHERE language = ?1 AND category = ?2 AND name = ?3
                 ORDER BY created_at",
            )?;
            let ids = id_stmt
                .query_map(params![language, category, name], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let category = category
                .parse::<Category>()
                .map_err(|e| conversion_error(3, e))?;
            groups.push(DuplicateGroup {
                language,
                category,
                name,
                ids,
                count: count as usize,
            });
        }
        info!(groups = groups.len(), "find_duplicates");
        Ok(groups)
    }

    /// Delete duplicate standards, keeping one record per natural key
    pub fn cleanup_duplicates(&self, keep: KeepStrategy) -> Result<CleanupSummary, StoreError> {
        let groups = self.find_duplicates()?;
        let mut deleted_total = 0usize;

        for group in &groups {
            // ids are in creation order; pick the survivor per strategy
            let survivor = match keep {
                KeepStrategy::First => group.ids.first(),
                KeepStrategy::Newest => group.ids.last(),
            };
            let Some(survivor) = survivor else { continue };

            for id in group.ids.iter().filter(|id| *id != survivor) {
                deleted_total += self.conn.execute("DELETE FROM standards WHERE id = ?1", params![id])?;
            }
        }

        info!(
            deleted = deleted_total,
            groups = groups.len(),
            "Duplicate cleanup complete"
        );
        Ok(CleanupSummary {
            deleted_count: deleted_total,
            duplicate_groups: groups.len(),
        })
    }

    // === Violations ===

    /// Record a violation; the referenced standard must exist
    ///
    /// The owning project is merged (created if missing).
    pub fn record_violation(&self, violation: &Violation) -> Result<(), StoreError> {
        let standard_exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM standards WHERE id = ?1",
                params![violation.standard_id],
                |row| row.get(0),
            )
            .optional()?;
        if standard_exists.is_none() {
            return Err(StoreError::UnknownStandard(violation.standard_id.clone()));
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO projects (id, name, created_at) VALUES (?1, ?1, ?2)",
            params![violation.project_id, Utc::now().to_rfc3339()],
        )?;

        self.conn.execute(
            "INSERT INTO violations
             (id, standard_id, file_path, line, \"column\", message, severity, suggestion, project_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                violation.id,
                violation.standard_id,
                violation.file_path,
                violation.line,
                violation.column,
                violation.message,
                violation.severity.as_str(),
                violation.suggestion,
                violation.project_id,
                violation.timestamp.to_rfc3339(),
            ],
        )?;
        debug!(id = %violation.id, standard = %violation.standard_id, "Recorded violation");
        Ok(())
    }

    /// Violations recorded for a project, newest first
    pub fn violations_for_project(&self, project_id: &str, limit: usize) -> Result<Vec<Violation>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM violations WHERE project_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![project_id, limit as i64], map_violation)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Violation counts grouped by severity
    pub fn violation_statistics(&self) -> Result<ViolationStats, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT severity, COUNT(*) FROM violations GROUP BY severity")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut stats = ViolationStats::default();
        for row in rows {
            let (severity, count) = row?;
            let severity = severity.parse::<Severity>().map_err(|e| conversion_error(0, e))?;
            stats.total += count as u64;
            stats.by_severity.insert(severity, count as u64);
        }
        Ok(stats)
    }

    /// Fetch a project by id
    pub fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let row = self
            .conn
            .query_row("SELECT id, name, created_at FROM projects WHERE id = ?1", params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .optional()?;
        match row {
            Some((id, name, created_at)) => Ok(Some(Project {
                id,
                name,
                created_at: parse_ts(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    // === Patterns ===

    /// Record a pattern observation
    ///
    /// An existing pattern (same canonical form + language) accumulates
    /// `frequency` and advances `last_seen`; `first_seen` is immutable.
    pub fn upsert_pattern(&self, pattern: &CodePattern) -> Result<CodePattern, StoreError> {
        let existing = self
            .conn
            .query_row(
                "SELECT * FROM patterns WHERE pattern = ?1 AND language = ?2",
                params![pattern.pattern, pattern.language],
                map_pattern,
            )
            .optional()?;

        match existing {
            Some(mut stored) => {
                stored.frequency += pattern.frequency.max(1);
                stored.last_seen = Utc::now();
                self.conn.execute(
                    "UPDATE patterns SET frequency = ?1, last_seen = ?2 WHERE id = ?3",
                    params![stored.frequency as i64, stored.last_seen.to_rfc3339(), stored.id],
                )?;
                debug!(id = %stored.id, frequency = stored.frequency, "Pattern re-observed");
                Ok(stored)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO patterns
                     (id, pattern, language, description, category, frequency, first_seen, last_seen, evolved_into)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        pattern.id,
                        pattern.pattern,
                        pattern.language,
                        pattern.description,
                        pattern.category.as_str(),
                        pattern.frequency as i64,
                        pattern.first_seen.to_rfc3339(),
                        pattern.last_seen.to_rfc3339(),
                        pattern.evolved_into,
                    ],
                )?;
                Ok(pattern.clone())
            }
        }
    }

    /// Patterns observed at least `min_frequency` times and not yet evolved
    pub fn emerging_patterns(&self, min_frequency: u64) -> Result<Vec<CodePattern>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM patterns WHERE frequency >= ?1 AND evolved_into IS NULL
             ORDER BY frequency DESC",
        )?;
        let rows = stmt.query_map(params![min_frequency as i64], map_pattern)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Link a pattern to the standard it evolved into (exactly one)
    pub fn evolve_pattern_to_standard(&self, pattern_id: &str, standard_id: &str) -> Result<(), StoreError> {
        if self.get_standard(standard_id)?.is_none() {
            return Err(StoreError::UnknownStandard(standard_id.to_string()));
        }
        let changed = self.conn.execute(
            "UPDATE patterns SET evolved_into = ?1 WHERE id = ?2",
            params![standard_id, pattern_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownPattern(pattern_id.to_string()));
        }
        info!(pattern_id, standard_id, "Pattern evolved into standard");
        Ok(())
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(0, e))
}

fn map_standard(row: &Row<'_>) -> rusqlite::Result<Standard> {
    let category: String = row.get("category")?;
    let severity: String = row.get("severity")?;
    let examples: String = row.get("examples")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Standard {
        id: row.get("id")?,
        name: row.get("name")?,
        language: row.get("language")?,
        category: category
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        severity: severity
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        description: row.get("description")?,
        examples: serde_json::from_str(&examples)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        version: row.get("version")?,
        active: row.get("active")?,
        file_source: row.get("file_source")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?,
    })
}

fn map_violation(row: &Row<'_>) -> rusqlite::Result<Violation> {
    let severity: String = row.get("severity")?;
    let timestamp: String = row.get("timestamp")?;
    Ok(Violation {
        id: row.get("id")?,
        standard_id: row.get("standard_id")?,
        file_path: row.get("file_path")?,
        line: row.get::<_, i64>("line")? as u32,
        column: row.get::<_, i64>("column")? as u32,
        message: row.get("message")?,
        severity: severity
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        suggestion: row.get("suggestion")?,
        project_id: row.get("project_id")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?,
    })
}

fn map_pattern(row: &Row<'_>) -> rusqlite::Result<CodePattern> {
    let category: String = row.get("category")?;
    let first_seen: String = row.get("first_seen")?;
    let last_seen: String = row.get("last_seen")?;
    Ok(CodePattern {
        id: row.get("id")?,
        pattern: row.get("pattern")?,
        language: row.get("language")?,
        description: row.get("description")?,
        category: category
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        frequency: row.get::<_, i64>("frequency")? as u64,
        first_seen: DateTime::parse_from_rfc3339(&first_seen)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        last_seen: DateTime::parse_from_rfc3339(&last_seen)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        evolved_into: row.get("evolved_into")?,
    })
}
