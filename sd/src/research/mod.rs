//! Standards research service
//!
//! Classifies free-text research requests, produces new Standard drafts via
//! the LLM layer, and owns versioning: bumps and the append-only archive of
//! prior versions. Shared by the workflow orchestrator and the direct API
//! path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use graphstore::{Category, CodePattern, Severity, Standard, StandardChanges, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{Namespace, ResponseCache, cache_key};
use crate::graph::GraphClient;
use crate::llm::{LlmError, LlmRequest, ModelTier, ProviderManager, extract_json};
use crate::parser;
use crate::prompts::{PromptError, PromptStore};

/// Errors from research operations
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed classification of a research request
///
/// Parsed from LLM JSON with documented defaults: absent fields fall back
/// to a title derived from the request, the `best-practices` category,
/// `general` language, `intermediate` complexity, and `medium` priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub title: String,
    pub category: Category,
    pub language: String,
    pub description: String,
    pub key_topics: Vec<String>,
    pub complexity: String,
    pub priority: String,
}

impl RequestAnalysis {
    /// Fallback when the classifier output cannot be parsed
    pub fn fallback(request: &str) -> Self {
        let title: String = request.trim().chars().take(80).collect();
        Self {
            title: if title.is_empty() { "Untitled standard".to_string() } else { title },
            category: Category::BestPractices,
            language: "general".to_string(),
            description: request.trim().to_string(),
            key_topics: Vec::new(),
            complexity: "intermediate".to_string(),
            priority: "medium".to_string(),
        }
    }

    /// Validate LLM output at the boundary; unknown fields are ignored
    pub fn from_llm_value(value: &Value, request: &str) -> Self {
        let fallback = Self::fallback(request);
        Self {
            title: value["title"].as_str().map(str::to_string).unwrap_or(fallback.title),
            category: value["category"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback.category),
            language: value["language"].as_str().map(str::to_string).unwrap_or(fallback.language),
            description: value["description"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(fallback.description),
            key_topics: value["key_topics"]
                .as_array()
                .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            complexity: value["complexity"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(fallback.complexity),
            priority: value["priority"].as_str().map(str::to_string).unwrap_or(fallback.priority),
        }
    }
}

/// Which version component an update advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    /// Breaking changes
    Major,
    /// New sections
    Minor,
    /// Wording or example changes
    Patch,
}

/// Advance a dotted MAJOR.MINOR.PATCH version; malformed input restarts at 1.0.0
pub fn bump_version(version: &str, bump: VersionBump) -> String {
    let mut parts = version.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    let (major, minor, patch) = (
        parts.next().unwrap_or(1),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    match bump {
        VersionBump::Major => format!("{}.0.0", major + 1),
        VersionBump::Minor => format!("{}.{}.0", major, minor + 1),
        VersionBump::Patch => format!("{}.{}.{}", major, minor, patch + 1),
    }
}

/// Fields an update may change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandardUpdate {
    pub content: Option<String>,
    pub severity: Option<Severity>,
    /// Explicit version; overrides `bump`
    pub version: Option<String>,
    pub bump: Option<VersionBump>,
}

/// Research pipeline over the LLM layer
pub struct ResearchService {
    manager: Arc<ProviderManager>,
    prompts: Arc<PromptStore>,
    graph: GraphClient,
    cache: Arc<ResponseCache>,
    standards_dir: PathBuf,
}

impl ResearchService {
    pub fn new(
        manager: Arc<ProviderManager>,
        prompts: Arc<PromptStore>,
        graph: GraphClient,
        cache: Arc<ResponseCache>,
        standards_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager,
            prompts,
            graph,
            cache,
            standards_dir: standards_dir.into(),
        }
    }

    /// Classify a free-text request into a typed analysis
    pub async fn classify_request(
        &self,
        request: &str,
        project_context: &Value,
        preferences: &Value,
    ) -> Result<RequestAnalysis, ResearchError> {
        let prompt = format!(
            "Analyze this coding standard research request and extract requirements.\n\
             Request: \"{request}\"\n\n\
             Project context: {project_context}\n\
             User preferences: {preferences}\n\n\
             Respond with JSON:\n\
             {{\"title\": \"...\", \"category\": \"security|performance|testing|error-handling|style|documentation|architecture|api|deployment|best-practices\", \
             \"language\": \"language or general\", \"description\": \"...\", \"key_topics\": [\"...\"], \
             \"complexity\": \"basic|intermediate|advanced|expert\", \"priority\": \"low|medium|high|critical\"}}"
        );

        let llm_request = LlmRequest::new(prompt)
            .with_system_prompt("You classify coding-standard research requests into structured requirements.")
            .with_tier(ModelTier::Balanced);
        let response = self.manager.generate(&llm_request, None).await?;

        let analysis = match extract_json(&response.content) {
            Some(value) => RequestAnalysis::from_llm_value(&value, request),
            None => {
                warn!("Classifier returned no parseable JSON, using fallback analysis");
                RequestAnalysis::fallback(request)
            }
        };
        debug!(title = %analysis.title, category = %analysis.category, "Classified research request");
        Ok(analysis)
    }

    /// Produce a new Standard for a topic
    ///
    /// The draft is cached by (topic, category, language); it is not stored
    /// in the graph here - deployment decides the sinks.
    pub async fn research_standard(
        &self,
        topic: &str,
        category: Category,
        language: &str,
        focus_areas: &str,
    ) -> Result<Standard, ResearchError> {
        let key = cache_key(
            Namespace::Standards,
            topic,
            language,
            0.0,
            &std::iter::once(("category".to_string(), Value::String(category.as_str().to_string()))).collect(),
        );
        if let Some(cached) = self.cache.get(&key).await
            && let Ok(standard) = serde_json::from_value::<Standard>(cached)
        {
            debug!(topic, "Research served from cache");
            return Ok(standard);
        }

        let bindings: HashMap<String, String> = [
            ("topic".to_string(), topic.to_string()),
            ("language".to_string(), language.to_string()),
            ("focus_areas".to_string(), focus_areas.to_string()),
        ]
        .into();
        let (prompt, system_prompt) = self.prompts.render("standards_research", &bindings)?;

        let mut llm_request = LlmRequest::new(prompt).with_tier(ModelTier::Advanced);
        llm_request.system_prompt = system_prompt;
        let response = self.manager.generate(&llm_request, None).await?;

        let severity = parser::infer_severity(&response.content, category);
        let mut standard = Standard::new(topic, language, category, severity, response.content);
        standard.file_source = None;

        if let Ok(value) = serde_json::to_value(&standard) {
            self.cache.set(&key, value, None).await;
        }

        info!(topic, category = %category, language, "Researched new standard");
        Ok(standard)
    }

    /// Apply an update: archive the previous version, bump, persist
    ///
    /// Returns the updated standard, or None when the id is unknown.
    pub async fn update_standard(&self, id: &str, update: StandardUpdate) -> Result<Option<Standard>, ResearchError> {
        let Some(existing) = self.graph.get_standard(id).await? else {
            return Ok(None);
        };

        let archive_path = self.archive_version(&existing)?;

        let new_version = match (&update.version, update.bump) {
            (Some(version), _) => version.clone(),
            (None, Some(bump)) => bump_version(&existing.version, bump),
            (None, None) => bump_version(&existing.version, VersionBump::Patch),
        };

        self.append_changelog(&existing, &new_version, &archive_path)?;

        let changes = StandardChanges {
            description: update.content,
            severity: update.severity,
            version: Some(new_version),
            ..Default::default()
        };
        let updated = self.graph.update_standard(id, &changes).await?;
        if let Some(ref standard) = updated {
            info!(id, version = %standard.version, "Updated standard");
        }
        Ok(updated)
    }

    /// Mine recurring patterns from code samples and record observations
    ///
    /// Re-observed patterns accumulate frequency in the store; patterns
    /// seen often enough become research candidates via
    /// `emerging_patterns`.
    pub async fn discover_patterns(&self, code_samples: &[String], language: &str) -> Result<Vec<CodePattern>, ResearchError> {
        if code_samples.is_empty() {
            return Ok(Vec::new());
        }

        let joined = code_samples.join("\n\n---\n\n");
        let prompt = format!(
            "Identify recurring code patterns in these {language} samples.\n\n\
             {joined}\n\n\
             Respond with JSON:\n\
             {{\"patterns\": [{{\"pattern\": \"canonical form\", \"description\": \"...\", \
             \"category\": \"security|performance|testing|error-handling|style|documentation|architecture|api|deployment|best-practices\"}}]}}"
        );
        let request = LlmRequest::new(prompt)
            .with_system_prompt("You catalogue recurring code patterns for standards research.")
            .with_tier(ModelTier::Fast);
        let response = self.manager.generate(&request, None).await?;

        let Some(value) = extract_json(&response.content) else {
            warn!("Pattern discovery returned no parseable JSON");
            return Ok(Vec::new());
        };

        let mut recorded = Vec::new();
        for entry in value["patterns"].as_array().map(Vec::as_slice).unwrap_or_default() {
            let Some(pattern_text) = entry["pattern"].as_str().filter(|p| !p.trim().is_empty()) else {
                continue;
            };
            let category = entry["category"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Category::BestPractices);
            let pattern = CodePattern::new(
                pattern_text,
                language,
                entry["description"].as_str().unwrap_or_default(),
                category,
            );
            match self.graph.upsert_pattern(&pattern).await {
                Ok(stored) => recorded.push(stored),
                Err(e) => warn!(pattern = %pattern_text, error = %e, "Failed to record pattern"),
            }
        }

        info!(count = recorded.len(), language, "Recorded discovered patterns");
        Ok(recorded)
    }

    /// Write the current content to the language archive
    ///
    /// Archive entries are append-only: `<slug>_v<version>_<timestamp>.md`.
    fn archive_version(&self, standard: &Standard) -> Result<PathBuf, ResearchError> {
        let archive_dir = self.standards_dir.join(&standard.language).join("archive");
        std::fs::create_dir_all(&archive_dir)?;

        let filename = format!(
            "{}_v{}_{}.md",
            slugify(&standard.name),
            standard.version,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = archive_dir.join(filename);
        std::fs::write(&path, parser::render_markdown(standard))?;

        debug!(path = %path.display(), "Archived standard version");
        Ok(path)
    }

    /// Changelog line linking the new version to the archived one
    fn append_changelog(
        &self,
        previous: &Standard,
        new_version: &str,
        archive_path: &std::path::Path,
    ) -> Result<(), ResearchError> {
        use std::io::Write;

        let changelog = self.standards_dir.join(&previous.language).join("archive").join("CHANGELOG.md");
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(changelog)?;
        writeln!(
            file,
            "- {}: {} v{} -> v{} (previous archived at {})",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            previous.name,
            previous.version,
            new_version,
            archive_path.display()
        )?;
        Ok(())
    }
}

/// Lowercase alphanumeric slug with hyphens
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::mock::MockProvider;
    use crate::llm::{LlmProvider, ProviderKind};
    use std::time::Duration;

    fn service_with(provider: MockProvider, dir: &std::path::Path) -> ResearchService {
        let mut manager = ProviderManager::new(vec![ProviderKind::Anthropic]);
        manager.register_provider(Arc::new(provider) as Arc<dyn LlmProvider>);
        ResearchService::new(
            Arc::new(manager),
            Arc::new(PromptStore::with_builtins()),
            GraphClient::in_memory().unwrap(),
            Arc::new(ResponseCache::memory(50, Duration::from_secs(60))),
            dir,
        )
    }

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version("1.2.3", VersionBump::Major), "2.0.0");
        assert_eq!(bump_version("1.2.3", VersionBump::Minor), "1.3.0");
        assert_eq!(bump_version("1.2.3", VersionBump::Patch), "1.2.4");
        assert_eq!(bump_version("garbage", VersionBump::Patch), "0.0.1");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Catch specific exceptions!"), "catch-specific-exceptions");
        assert_eq!(slugify("  API / REST rules  "), "api-rest-rules");
    }

    #[test]
    fn test_analysis_defaults_on_missing_fields() {
        let value = serde_json::json!({ "title": "Error handling", "category": "error-handling" });
        let analysis = RequestAnalysis::from_llm_value(&value, "please research error handling");

        assert_eq!(analysis.title, "Error handling");
        assert_eq!(analysis.category, Category::ErrorHandling);
        assert_eq!(analysis.language, "general");
        assert_eq!(analysis.complexity, "intermediate");
        assert_eq!(analysis.priority, "medium");
    }

    #[test]
    fn test_analysis_ignores_unknown_category() {
        let value = serde_json::json!({ "category": "language_specific" });
        let analysis = RequestAnalysis::from_llm_value(&value, "req");
        assert_eq!(analysis.category, Category::BestPractices);
    }

    #[tokio::test]
    async fn test_classify_request_parses_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"title": "SQL injection prevention", "category": "security", "language": "python", "complexity": "advanced", "priority": "critical"}"#,
        );
        let service = service_with(provider, dir.path());

        let analysis = service
            .classify_request("how do I stop sql injection", &Value::Null, &Value::Null)
            .await
            .unwrap();
        assert_eq!(analysis.category, Category::Security);
        assert_eq!(analysis.language, "python");
        assert_eq!(analysis.priority, "critical");
    }

    #[tokio::test]
    async fn test_classify_request_falls_back_on_prose() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "I cannot answer in JSON today");
        let service = service_with(provider, dir.path());

        let analysis = service
            .classify_request("naming conventions", &Value::Null, &Value::Null)
            .await
            .unwrap();
        assert_eq!(analysis.title, "naming conventions");
        assert_eq!(analysis.category, Category::BestPractices);
    }

    #[tokio::test]
    async fn test_research_standard_builds_and_caches() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "Always handle errors explicitly.");
        let service = service_with(provider, dir.path());

        let standard = service
            .research_standard("Error handling", Category::ErrorHandling, "rust", "errors")
            .await
            .unwrap();
        assert_eq!(standard.language, "rust");
        assert_eq!(standard.category, Category::ErrorHandling);
        assert!(standard.file_source.is_none());

        // Second research of the same topic is served from cache
        let again = service
            .research_standard("Error handling", Category::ErrorHandling, "rust", "errors")
            .await
            .unwrap();
        assert_eq!(again.id, standard.id);
        assert_eq!(service.cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_discover_patterns_accumulates_frequency() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"patterns": [{"pattern": "try/except pass", "description": "swallowed errors", "category": "error-handling"}]}"#,
        );
        let service = service_with(provider, dir.path());

        let samples = vec!["try:\n  x()\nexcept:\n  pass".to_string()];
        let first = service.discover_patterns(&samples, "python").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].frequency, 1);

        let second = service.discover_patterns(&samples, "python").await.unwrap();
        assert_eq!(second[0].frequency, 2);
        assert_eq!(second[0].id, first[0].id);

        let emerging = service.graph.emerging_patterns(2).await.unwrap();
        assert_eq!(emerging.len(), 1);
    }

    #[tokio::test]
    async fn test_discover_patterns_empty_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "unused");
        let service = service_with(provider, dir.path());
        assert!(service.discover_patterns(&[], "python").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_standard_archives_and_bumps() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "unused");
        let service = service_with(provider, dir.path());

        let standard = service
            .graph
            .upsert_standard(&Standard::new(
                "Wrap errors",
                "rust",
                Category::ErrorHandling,
                Severity::High,
                "Wrap errors with context",
            ))
            .await
            .unwrap();

        let updated = service
            .update_standard(
                &standard.id,
                StandardUpdate {
                    content: Some("Wrap errors with rich context".to_string()),
                    bump: Some(VersionBump::Minor),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.version, "1.1.0");
        assert_eq!(updated.description, "Wrap errors with rich context");

        let archive_dir = dir.path().join("rust").join("archive");
        let entries: Vec<_> = std::fs::read_dir(&archive_dir).unwrap().collect();
        assert_eq!(entries.len(), 2, "archived markdown plus changelog");
        assert!(archive_dir.join("CHANGELOG.md").exists());

        // Unknown id is a clean None
        assert!(service.update_standard("missing", StandardUpdate::default()).await.unwrap().is_none());
    }
}
