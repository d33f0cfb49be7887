//! Code recommendations service
//!
//! Sends submitted code through the `code_analysis` prompt, validates the
//! LLM's JSON at the boundary into typed recommendations, and filters by
//! priority. Serves both the workflow orchestrator's analysis phase and the
//! direct API operation.

use std::collections::HashMap;
use std::sync::Arc;

use graphstore::{Category, Severity, Standard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Namespace, ResponseCache, cache_key};
use crate::llm::{LlmError, LlmRequest, ModelTier, ProviderManager, extract_json};
use crate::prompts::{PromptError, PromptStore};

/// Errors from recommendation operations
#[derive(Debug, Error)]
pub enum RecommendationsError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
}

/// One actionable recommendation for submitted code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub description: String,
    pub category: Category,
    pub priority: Severity,
    pub suggestion: String,
    /// Present when the fix is safe to apply mechanically
    pub automated_fix: Option<String>,
    /// Source line, when the model pinned one down
    pub line: Option<u32>,
}

impl Recommendation {
    /// Validate one LLM-produced entry; defaults: category best-practices,
    /// priority medium. Entries without a description are dropped.
    pub fn from_llm_value(value: &Value) -> Option<Self> {
        let description = value["description"].as_str()?.trim().to_string();
        if description.is_empty() {
            return None;
        }

        Some(Self {
            description,
            category: value["category"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Category::BestPractices),
            priority: value["priority"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Severity::Medium),
            suggestion: value["suggestion"].as_str().unwrap_or_default().to_string(),
            automated_fix: value["automated_fix"].as_str().map(str::to_string),
            line: value["line"].as_u64().map(|l| l as u32),
        })
    }
}

/// Analysis of one code submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAnalysis {
    pub language: String,
    pub summary: Option<String>,
    pub recommendations: Vec<Recommendation>,
}

impl CodeAnalysis {
    /// Recommendations at or above the given urgency
    pub fn at_or_above(&self, threshold: Severity) -> Vec<&Recommendation> {
        self.recommendations.iter().filter(|r| r.priority <= threshold).collect()
    }

    pub fn count_with_priority(&self, priority: Severity) -> usize {
        self.recommendations.iter().filter(|r| r.priority == priority).count()
    }
}

/// Recommendations pipeline over the LLM layer
pub struct RecommendationsService {
    manager: Arc<ProviderManager>,
    prompts: Arc<PromptStore>,
    cache: Arc<ResponseCache>,
}

impl RecommendationsService {
    pub fn new(manager: Arc<ProviderManager>, prompts: Arc<PromptStore>, cache: Arc<ResponseCache>) -> Self {
        Self { manager, prompts, cache }
    }

    /// Analyze code against the optional focus area and standards context
    pub async fn analyze_code(
        &self,
        code: &str,
        language: &str,
        focus: Option<&str>,
        standards: &[Standard],
    ) -> Result<CodeAnalysis, RecommendationsError> {
        if code.trim().is_empty() {
            return Err(RecommendationsError::Validation("code must not be empty".to_string()));
        }

        let mut extras = std::collections::BTreeMap::new();
        if let Some(focus) = focus {
            extras.insert("focus".to_string(), Value::String(focus.to_string()));
        }
        let key = cache_key(Namespace::AuditResult, code, language, 0.0, &extras);
        if let Some(cached) = self.cache.get(&key).await
            && let Ok(analysis) = serde_json::from_value::<CodeAnalysis>(cached)
        {
            debug!(language, "Code analysis served from cache");
            return Ok(analysis);
        }

        let bindings: HashMap<String, String> = [
            ("language".to_string(), language.to_string()),
            ("code".to_string(), code.to_string()),
        ]
        .into();
        let (mut prompt, system_prompt) = self.prompts.render("code_analysis", &bindings)?;

        if let Some(focus) = focus {
            prompt.push_str(&format!("\n\nFocus the review on: {focus}"));
        }
        if !standards.is_empty() {
            prompt.push_str("\n\nApplicable standards:\n");
            for standard in standards {
                prompt.push_str(&format!("- [{}] {}\n", standard.severity, standard.name));
            }
        }

        let mut llm_request = LlmRequest::new(prompt).with_tier(ModelTier::Balanced);
        llm_request.system_prompt = system_prompt;
        let response = self.manager.generate(&llm_request, None).await?;

        let analysis = Self::parse_analysis(&response.content, language);
        if let Ok(value) = serde_json::to_value(&analysis) {
            self.cache.set(&key, value, None).await;
        }
        Ok(analysis)
    }

    /// Boundary validation of model output
    ///
    /// Prose without JSON degrades to an empty recommendation list with the
    /// prose kept as the summary.
    fn parse_analysis(content: &str, language: &str) -> CodeAnalysis {
        match extract_json(content) {
            Some(value) => {
                let recommendations = value["recommendations"]
                    .as_array()
                    .map(|items| items.iter().filter_map(Recommendation::from_llm_value).collect())
                    .unwrap_or_default();
                CodeAnalysis {
                    language: language.to_string(),
                    summary: value["summary"].as_str().map(str::to_string),
                    recommendations,
                }
            }
            None => {
                warn!("Analysis response had no parseable JSON");
                CodeAnalysis {
                    language: language.to_string(),
                    summary: Some(content.trim().to_string()),
                    recommendations: Vec::new(),
                }
            }
        }
    }
}

/// Best-effort language detection for unlabeled code samples
pub fn detect_language(code: &str) -> &'static str {
    if code.contains("def ") && code.contains(':') {
        "python"
    } else if code.contains("fn ") && (code.contains("let ") || code.contains("->")) {
        "rust"
    } else if code.contains("function ") || code.contains("=>") {
        "javascript"
    } else if code.contains("public class") {
        "java"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::mock::MockProvider;
    use crate::llm::{LlmProvider, ProviderKind};
    use std::time::Duration;

    fn service_with(provider: MockProvider) -> RecommendationsService {
        let mut manager = ProviderManager::new(vec![ProviderKind::Anthropic]);
        manager.register_provider(Arc::new(provider) as Arc<dyn LlmProvider>);
        RecommendationsService::new(
            Arc::new(manager),
            Arc::new(PromptStore::with_builtins()),
            Arc::new(ResponseCache::memory(50, Duration::from_secs(60))),
        )
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("def foo():\n    pass"), "python");
        assert_eq!(detect_language("fn main() { let x = 1; }"), "rust");
        assert_eq!(detect_language("const f = () => 1"), "javascript");
        assert_eq!(detect_language("public class Foo {}"), "java");
        assert_eq!(detect_language("SELECT 1"), "unknown");
    }

    #[test]
    fn test_recommendation_boundary_defaults() {
        let value = serde_json::json!({ "description": "Avoid bare except" });
        let rec = Recommendation::from_llm_value(&value).unwrap();
        assert_eq!(rec.category, Category::BestPractices);
        assert_eq!(rec.priority, Severity::Medium);
        assert!(rec.automated_fix.is_none());

        // Unknown enum tokens fall back instead of failing
        let value = serde_json::json!({ "description": "x marks the spot", "category": "weird", "priority": "urgent" });
        let rec = Recommendation::from_llm_value(&value).unwrap();
        assert_eq!(rec.category, Category::BestPractices);
        assert_eq!(rec.priority, Severity::Medium);

        assert!(Recommendation::from_llm_value(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_at_or_above_threshold() {
        let analysis = CodeAnalysis {
            language: "python".to_string(),
            summary: None,
            recommendations: vec![
                Recommendation {
                    description: "a".to_string(),
                    category: Category::Security,
                    priority: Severity::Critical,
                    suggestion: String::new(),
                    automated_fix: None,
                    line: None,
                },
                Recommendation {
                    description: "b".to_string(),
                    category: Category::Style,
                    priority: Severity::Low,
                    suggestion: String::new(),
                    automated_fix: None,
                    line: None,
                },
            ],
        };
        let filtered = analysis.at_or_above(Severity::High);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].description, "a");
    }

    #[tokio::test]
    async fn test_analyze_code_parses_recommendations() {
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"recommendations": [{"description": "Use parameterized queries", "category": "security", "priority": "critical", "suggestion": "bind parameters", "line": 3}], "summary": "one issue"}"#,
        );
        let service = service_with(provider);

        let analysis = service
            .analyze_code("cursor.execute(q)", "python", Some("security"), &[])
            .await
            .unwrap();
        assert_eq!(analysis.recommendations.len(), 1);
        assert_eq!(analysis.recommendations[0].priority, Severity::Critical);
        assert_eq!(analysis.recommendations[0].line, Some(3));
        assert_eq!(analysis.summary.as_deref(), Some("one issue"));
    }

    #[tokio::test]
    async fn test_analyze_code_empty_input_rejected() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "unused");
        let service = service_with(provider);

        let err = service.analyze_code("   ", "python", None, &[]).await.unwrap_err();
        assert!(matches!(err, RecommendationsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_analyze_code_prose_degrades_to_summary() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "Looks fine to me overall.");
        let service = service_with(provider);

        let analysis = service.analyze_code("x = 1", "python", None, &[]).await.unwrap();
        assert!(analysis.recommendations.is_empty());
        assert_eq!(analysis.summary.as_deref(), Some("Looks fine to me overall."));
    }

    #[tokio::test]
    async fn test_analyze_code_cached_second_call() {
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"recommendations": [], "summary": "clean"}"#,
        );
        let provider = std::sync::Arc::new(provider);
        let mut manager = ProviderManager::new(vec![ProviderKind::Anthropic]);
        manager.register_provider(provider.clone() as Arc<dyn LlmProvider>);
        let service = RecommendationsService::new(
            Arc::new(manager),
            Arc::new(PromptStore::with_builtins()),
            Arc::new(ResponseCache::memory(50, Duration::from_secs(60))),
        );

        service.analyze_code("x = 1", "python", None, &[]).await.unwrap();
        service.analyze_code("x = 1", "python", None, &[]).await.unwrap();
        assert_eq!(provider.call_count(), 1);
    }
}
