//! Standard quality validators
//!
//! Five dimensions run in parallel: completeness and examples are computed
//! from the content itself; clarity, practicality, and consistency ask the
//! LLM for a score and fall back to fixed defaults when the answer cannot
//! be parsed. A failed validator contributes an error but does not veto.

use std::sync::Arc;

use tracing::warn;

use crate::llm::{LlmRequest, ModelTier, ProviderManager, extract_json};

use super::{ValidationOutcome, ValidatorReport};

/// Aggregate score at or above which validation passes
pub const VALIDATION_PASS_SCORE: f64 = 75.0;

/// Fallback scores when the LLM verdict cannot be parsed
const CLARITY_FALLBACK: f64 = 85.0;
const PRACTICALITY_FALLBACK: f64 = 80.0;
const CONSISTENCY_FALLBACK: f64 = 90.0;

/// Sections a complete standard is expected to mention
const REQUIRED_SECTIONS: &[&str] = &["overview", "principle", "example", "pitfall", "testing"];

/// Points per before/after code block pair
const EXAMPLE_BLOCK_POINTS: f64 = 25.0;

/// Map a score to a human quality label
pub fn quality_level(score: f64) -> &'static str {
    if score >= 90.0 {
        "excellent"
    } else if score >= VALIDATION_PASS_SCORE {
        "good"
    } else if score >= 60.0 {
        "fair"
    } else {
        "poor"
    }
}

/// Section-presence score
fn validate_completeness(content: &str) -> ValidatorReport {
    let lowered = content.to_lowercase();
    let found: Vec<&str> = REQUIRED_SECTIONS.iter().copied().filter(|s| lowered.contains(*s)).collect();
    let score = (found.len() as f64 / REQUIRED_SECTIONS.len() as f64) * 100.0;

    let issues = REQUIRED_SECTIONS
        .iter()
        .filter(|s| !found.contains(s))
        .map(|s| format!("Missing section: {s}"))
        .collect::<Vec<_>>();
    let recommendations = if issues.is_empty() {
        Vec::new()
    } else {
        vec!["Add the missing sections to improve completeness".to_string()]
    };

    ValidatorReport {
        name: "completeness".to_string(),
        score,
        issues,
        recommendations,
    }
}

/// Code-example coverage score
fn validate_examples(content: &str) -> ValidatorReport {
    let fence_pairs = content.matches("```").count() / 2;
    let score = (fence_pairs as f64 * EXAMPLE_BLOCK_POINTS).min(100.0);

    ValidatorReport {
        name: "examples".to_string(),
        score,
        issues: if score < 60.0 {
            vec!["Insufficient code examples".to_string()]
        } else {
            Vec::new()
        },
        recommendations: if score < 80.0 {
            vec!["Add more code examples".to_string()]
        } else {
            Vec::new()
        },
    }
}

/// Ask the LLM to score one dimension; fall back to a fixed default
async fn validate_with_llm(
    manager: &ProviderManager,
    dimension: &str,
    instructions: &str,
    fallback_score: f64,
    content: &str,
) -> Result<ValidatorReport, String> {
    let prompt = format!(
        "Evaluate the {dimension} of this coding standard. {instructions}\n\n\
         Standard:\n{content}\n\n\
         Respond with JSON: {{\"score\": 0-100, \"issues\": [\"...\"], \"recommendations\": [\"...\"]}}"
    );
    let request = LlmRequest::new(prompt)
        .with_system_prompt("You are a standards quality auditor. Answer only with the requested JSON.")
        .with_tier(ModelTier::Fast);

    let response = manager.generate(&request, None).await.map_err(|e| e.to_string())?;

    match extract_json(&response.content) {
        Some(value) => Ok(ValidatorReport {
            name: dimension.to_string(),
            score: value["score"].as_f64().unwrap_or(fallback_score).clamp(0.0, 100.0),
            issues: string_array(&value["issues"]),
            recommendations: string_array(&value["recommendations"]),
        }),
        None => {
            warn!(dimension, "Validator returned no JSON, using fallback score");
            Ok(ValidatorReport {
                name: dimension.to_string(),
                score: fallback_score,
                issues: Vec::new(),
                recommendations: Vec::new(),
            })
        }
    }
}

fn string_array(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Run all five validators in parallel and aggregate
///
/// The aggregate score is the arithmetic mean of the validators that
/// completed; a failed validator is reported as an issue only.
pub async fn run_validators(manager: &Arc<ProviderManager>, content: &str) -> ValidationOutcome {
    let (completeness, examples, clarity, practicality, consistency) = tokio::join!(
        async { Ok::<_, String>(validate_completeness(content)) },
        async { Ok::<_, String>(validate_examples(content)) },
        validate_with_llm(
            manager,
            "clarity",
            "Is the standard unambiguous and readable?",
            CLARITY_FALLBACK,
            content
        ),
        validate_with_llm(
            manager,
            "practicality",
            "Can a real team adopt this as written?",
            PRACTICALITY_FALLBACK,
            content
        ),
        validate_with_llm(
            manager,
            "consistency",
            "Do the sections agree with each other?",
            CONSISTENCY_FALLBACK,
            content
        ),
    );

    let mut reports = Vec::new();
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    for (index, outcome) in [completeness, examples, clarity, practicality, consistency]
        .into_iter()
        .enumerate()
    {
        match outcome {
            Ok(report) => {
                issues.extend(report.issues.clone());
                recommendations.extend(report.recommendations.clone());
                reports.push(report);
            }
            Err(e) => issues.push(format!("Validation task {index} failed: {e}")),
        }
    }

    let overall_score = if reports.is_empty() {
        0.0
    } else {
        reports.iter().map(|r| r.score).sum::<f64>() / reports.len() as f64
    };

    ValidationOutcome {
        overall_score,
        validation_passed: overall_score >= VALIDATION_PASS_SCORE,
        quality_level: quality_level(overall_score).to_string(),
        reports,
        issues,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::mock::MockProvider;
    use crate::llm::{LlmProvider, ProviderKind};

    fn manager_with(provider: MockProvider) -> Arc<ProviderManager> {
        let mut manager = ProviderManager::new(vec![ProviderKind::Anthropic]);
        manager.register_provider(Arc::new(provider) as Arc<dyn LlmProvider>);
        Arc::new(manager)
    }

    #[test]
    fn test_quality_levels() {
        assert_eq!(quality_level(95.0), "excellent");
        assert_eq!(quality_level(80.0), "good");
        assert_eq!(quality_level(65.0), "fair");
        assert_eq!(quality_level(10.0), "poor");
    }

    #[test]
    fn test_completeness_scores_sections() {
        let full = "## Overview\n## Principles\n## Examples\n## Pitfalls\n## Testing requirements\n";
        assert_eq!(validate_completeness(full).score, 100.0);

        let partial = validate_completeness("## Overview only");
        assert!(partial.score < 100.0);
        assert!(!partial.issues.is_empty());
    }

    #[test]
    fn test_examples_scores_fence_pairs() {
        let none = validate_examples("no code at all");
        assert_eq!(none.score, 0.0);
        assert!(!none.issues.is_empty());

        let four_blocks = "```\na\n```\n```\nb\n```\n```\nc\n```\n```\nd\n```\n";
        assert_eq!(validate_examples(four_blocks).score, 100.0);
    }

    #[tokio::test]
    async fn test_run_validators_parses_llm_scores() {
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"score": 70, "issues": ["vague wording"], "recommendations": ["tighten phrasing"]}"#,
        );
        let manager = manager_with(provider);

        let content = "## Overview\n## Principles\n## Examples\n## Pitfalls\n## Testing\n```\nx\n```\n```\ny\n```\n```\nz\n```\n";
        let outcome = run_validators(&manager, content).await;

        assert_eq!(outcome.reports.len(), 5);
        // completeness 100, examples 75, three LLM validators at 70
        let expected = (100.0 + 75.0 + 70.0 * 3.0) / 5.0;
        assert!((outcome.overall_score - expected).abs() < 0.01);
        assert!(outcome.validation_passed);
        assert!(outcome.issues.iter().any(|i| i.contains("vague wording")));
    }

    #[tokio::test]
    async fn test_run_validators_fallback_scores_on_prose() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "cannot do JSON");
        let manager = manager_with(provider);

        let outcome = run_validators(&manager, "## Overview\n").await;
        let clarity = outcome.reports.iter().find(|r| r.name == "clarity").unwrap();
        assert_eq!(clarity.score, CLARITY_FALLBACK);
        let consistency = outcome.reports.iter().find(|r| r.name == "consistency").unwrap();
        assert_eq!(consistency.score, CONSISTENCY_FALLBACK);
    }

    #[tokio::test]
    async fn test_failed_validator_does_not_veto() {
        let provider = MockProvider::always_err(ProviderKind::Anthropic, "provider down");
        let manager = manager_with(provider);

        let content = "## Overview\n## Principles\n## Examples\n## Pitfalls\n## Testing\n";
        let outcome = run_validators(&manager, content).await;

        // Only the two computed validators complete
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.issues.iter().filter(|i| i.contains("failed")).count(), 3);
        // Mean over completed validators only
        let expected = (100.0 + 0.0) / 2.0;
        assert!((outcome.overall_score - expected).abs() < 0.01);
        assert!(!outcome.validation_passed);
    }
}
