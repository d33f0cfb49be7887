//! Integrated research-to-audit workflow
//!
//! A six-phase async state machine: research, documentation, validation,
//! deployment, optional code analysis, and feedback. Each workflow runs in
//! a background task with per-workflow lifecycle tracking and cooperative
//! cancellation at phase boundaries.

mod orchestrator;
mod reports;
mod validators;

use chrono::{DateTime, Utc};
use graphstore::StoreError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::LlmError;
use crate::recommendations::{Recommendation, RecommendationsError};
use crate::research::{RequestAnalysis, ResearchError};

pub use orchestrator::Orchestrator;
pub use validators::{VALIDATION_PASS_SCORE, quality_level};

/// Compliance penalty per critical recommendation
pub const CRITICAL_PENALTY: f64 = 20.0;

/// Compliance penalty per high recommendation
pub const HIGH_PENALTY: f64 = 10.0;

/// Phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowPhase {
    Initialization,
    Research,
    Documentation,
    Validation,
    Deployment,
    Analysis,
    Feedback,
    Completion,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Initialization => "initialization",
            WorkflowPhase::Research => "research",
            WorkflowPhase::Documentation => "documentation",
            WorkflowPhase::Validation => "validation",
            WorkflowPhase::Deployment => "deployment",
            WorkflowPhase::Analysis => "analysis",
            WorkflowPhase::Feedback => "feedback",
            WorkflowPhase::Completion => "completion",
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// Per-workflow input context
///
/// Released when the workflow reaches a terminal state; only the
/// `WorkflowResult` is retained.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub user_id: Option<String>,
    pub research_request: String,
    pub project_context: Value,
    pub preferences: Value,
    pub code_samples: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Research phase output
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    pub analysis: RequestAnalysis,
    pub standard: graphstore::Standard,
}

/// Documentation phase output
#[derive(Debug, Clone, Serialize)]
pub struct DocumentationOutcome {
    pub enhanced_content: String,
    pub quick_reference: String,
    pub implementation_checklist: String,
    pub onboarding_guide: String,
    pub compliance_checklist: String,
}

/// One validator's verdict
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorReport {
    pub name: String,
    pub score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Validation phase output
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub overall_score: f64,
    pub reports: Vec<ValidatorReport>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub validation_passed: bool,
    pub quality_level: String,
}

/// One deployment sink's result
#[derive(Debug, Clone, Serialize)]
pub struct SinkReport {
    pub sink: String,
    pub success: bool,
    pub detail: Option<String>,
}

/// Deployment phase output
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub sinks: Vec<SinkReport>,
    pub file_path: Option<String>,
    pub standard_id: Option<String>,
    pub cache_keys: Vec<String>,
}

/// Per-sample code analysis
#[derive(Debug, Clone, Serialize)]
pub struct SampleAnalysis {
    pub index: usize,
    pub language: String,
    pub compliance_score: f64,
    pub recommendations: Vec<Recommendation>,
}

/// Analysis phase output
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub samples: Vec<SampleAnalysis>,
    pub overall_compliance: f64,
    /// Top three recommendation categories across samples
    pub common_categories: Vec<String>,
}

/// Feedback phase output
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackOutcome {
    pub summary: String,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub lessons_learned: Vec<String>,
    pub report_markdown: String,
}

/// Accumulated per-phase results
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseResults {
    pub research: Option<ResearchOutcome>,
    pub documentation: Option<DocumentationOutcome>,
    pub validation: Option<ValidationOutcome>,
    pub deployment: Option<DeploymentOutcome>,
    pub analysis: Option<AnalysisOutcome>,
    pub feedback: Option<FeedbackOutcome>,
}

/// Terminal record of a workflow
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Last phase reached
    pub phase: WorkflowPhase,
    pub results: PhaseResults,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub execution_time: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status view answering workflow queries
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatusReport {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub phase: WorkflowPhase,
    pub result: Option<WorkflowResult>,
}

/// Orchestrator counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowStats {
    pub workflows_started: u64,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub workflows_cancelled: u64,
    pub standards_created: u64,
    pub code_analyses_performed: u64,
}

/// Errors from workflow execution
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("research error: {0}")]
    Research(#[from] ResearchError),

    #[error("recommendations error: {0}")]
    Recommendations(#[from] RecommendationsError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error("report rendering failed: {0}")]
    Report(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Per-sample compliance: 100 minus 20 per critical and 10 per high, floored at 0
pub fn compliance_score(recommendations: &[Recommendation]) -> f64 {
    use graphstore::Severity;

    let criticals = recommendations.iter().filter(|r| r.priority == Severity::Critical).count();
    let highs = recommendations.iter().filter(|r| r.priority == Severity::High).count();
    (100.0 - CRITICAL_PENALTY * criticals as f64 - HIGH_PENALTY * highs as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphstore::{Category, Severity};

    fn rec(priority: Severity) -> Recommendation {
        Recommendation {
            description: "x".to_string(),
            category: Category::BestPractices,
            priority,
            suggestion: String::new(),
            automated_fix: None,
            line: None,
        }
    }

    #[test]
    fn test_compliance_score_penalties() {
        assert_eq!(compliance_score(&[]), 100.0);
        assert_eq!(compliance_score(&[rec(Severity::Critical)]), 80.0);
        assert_eq!(compliance_score(&[rec(Severity::Critical), rec(Severity::High)]), 70.0);
        assert_eq!(compliance_score(&[rec(Severity::Low), rec(Severity::Medium)]), 100.0);
    }

    #[test]
    fn test_compliance_score_floors_at_zero() {
        let recs: Vec<_> = (0..10).map(|_| rec(Severity::Critical)).collect();
        assert_eq!(compliance_score(&recs), 0.0);
    }

    #[test]
    fn test_status_terminality() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::InProgress.is_terminal());
        assert!(!WorkflowStatus::Pending.is_terminal());
    }
}
