//! Entity types stored in the graph projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error parsing a category or severity token
#[derive(Debug, Error)]
#[error("unknown {kind} token: '{token}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub token: String,
}

/// Topical axis of a standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Security,
    Performance,
    Testing,
    ErrorHandling,
    Style,
    Documentation,
    Architecture,
    Api,
    Deployment,
    BestPractices,
}

impl Category {
    /// Stable token used in storage and file layouts
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Testing => "testing",
            Category::ErrorHandling => "error-handling",
            Category::Style => "style",
            Category::Documentation => "documentation",
            Category::Architecture => "architecture",
            Category::Api => "api",
            Category::Deployment => "deployment",
            Category::BestPractices => "best-practices",
        }
    }

    /// All categories, for iteration in reports
    pub fn all() -> &'static [Category] {
        &[
            Category::Security,
            Category::Performance,
            Category::Testing,
            Category::ErrorHandling,
            Category::Style,
            Category::Documentation,
            Category::Architecture,
            Category::Api,
            Category::Deployment,
            Category::BestPractices,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security" => Ok(Category::Security),
            "performance" => Ok(Category::Performance),
            "testing" => Ok(Category::Testing),
            "error-handling" => Ok(Category::ErrorHandling),
            "style" => Ok(Category::Style),
            "documentation" => Ok(Category::Documentation),
            "architecture" => Ok(Category::Architecture),
            "api" => Ok(Category::Api),
            "deployment" => Ok(Category::Deployment),
            "best-practices" => Ok(Category::BestPractices),
            other => Err(ParseEnumError {
                kind: "category",
                token: other.to_string(),
            }),
        }
    }
}

/// Urgency axis of a standard or violation
///
/// Ordering: `Critical` sorts before `Low`, so `Severity::Critical < Severity::Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(ParseEnumError {
                kind: "severity",
                token: other.to_string(),
            }),
        }
    }
}

/// A before/after example pair attached to a standard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub before: String,
    pub after: String,
}

/// A named, categorized coding rule - the canonical unit of guidance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standard {
    /// Opaque unique id; identifies revisions, not duplicates
    pub id: String,
    /// Short title
    pub name: String,
    /// Language token, "general" when universal
    pub language: String,
    pub category: Category,
    pub severity: Severity,
    /// Markdown body
    pub description: String,
    pub examples: Vec<Example>,
    /// Dotted MAJOR.MINOR.PATCH
    pub version: String,
    pub active: bool,
    /// Origin path; None for AI-generated standards
    pub file_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Standard {
    /// Create a new standard with a fresh id and current timestamps
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        category: Category,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            language: language.into(),
            category,
            severity,
            description: description.into(),
            examples: Vec::new(),
            version: "1.0.0".to_string(),
            active: true,
            file_source: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deduplication key: all upserts match on this tuple
    pub fn natural_key(&self) -> (&str, &str, &str) {
        (&self.language, self.category.as_str(), &self.name)
    }
}

/// A recorded breach of a standard in user code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    /// Must resolve to an existing Standard at creation
    pub standard_id: String,
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
    pub suggestion: String,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    pub fn new(
        standard_id: impl Into<String>,
        file_path: impl Into<String>,
        line: u32,
        column: u32,
        message: impl Into<String>,
        severity: Severity,
        suggestion: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            standard_id: standard_id.into(),
            file_path: file_path.into(),
            line,
            column,
            message: message.into(),
            severity,
            suggestion: suggestion.into(),
            project_id: project_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A recurring code shape observed across audits
///
/// `frequency` accumulates on re-observation and `last_seen` advances;
/// `first_seen` never changes. A pattern may be marked as evolved into
/// exactly one standard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePattern {
    pub id: String,
    /// Canonical form of the pattern
    pub pattern: String,
    pub language: String,
    pub description: String,
    pub category: Category,
    pub frequency: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Standard id this pattern evolved into, if any
    pub evolved_into: Option<String>,
}

impl CodePattern {
    pub fn new(
        pattern: impl Into<String>,
        language: impl Into<String>,
        description: impl Into<String>,
        category: Category,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            pattern: pattern.into(),
            language: language.into(),
            description: description.into(),
            category,
            frequency: 1,
            first_seen: now,
            last_seen: now,
            evolved_into: None,
        }
    }
}

/// A project that violations are attributed to; merged (created-if-missing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A semantic search result with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub standard: Standard,
    pub relevance_score: f64,
}

/// A group of standards sharing a natural key
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub language: String,
    pub category: Category,
    pub name: String,
    /// Ids in creation order
    pub ids: Vec<String>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for cat in Category::all() {
            assert_eq!(cat.as_str().parse::<Category>().unwrap(), *cat);
        }
    }

    #[test]
    fn test_category_unknown_token() {
        let err = "nonsense".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("nonsense"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Medium < Severity::Low);
    }

    #[test]
    fn test_standard_natural_key() {
        let std = Standard::new(
            "Use structured logging",
            "rust",
            Category::BestPractices,
            Severity::Medium,
            "Use structured logging",
        );
        assert_eq!(std.natural_key(), ("rust", "best-practices", "Use structured logging"));
        assert!(std.active);
        assert_eq!(std.version, "1.0.0");
    }

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let json = serde_json::to_string(&Category::ErrorHandling).unwrap();
        assert_eq!(json, "\"error-handling\"");
    }
}
