//! Workflow orchestrator
//!
//! Owns workflow contexts and results. `start` returns immediately; the
//! phases run in a background task. Cancellation is cooperative and checked
//! at phase boundaries; a phase error terminates the workflow in `failed`
//! with prior phases' results preserved.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{Namespace, ResponseCache};
use crate::graph::GraphClient;
use crate::llm::{LlmRequest, ModelTier, ProviderManager, extract_json};
use crate::parser;
use crate::recommendations::{RecommendationsService, detect_language};
use crate::research::{ResearchService, slugify};

use super::reports::Reports;
use super::validators;
use super::{
    AnalysisOutcome, DeploymentOutcome, DocumentationOutcome, FeedbackOutcome, PhaseResults, ResearchOutcome,
    SampleAnalysis, SinkReport, WorkflowContext, WorkflowError, WorkflowPhase, WorkflowResult, WorkflowStats,
    WorkflowStatus, WorkflowStatusReport, compliance_score,
};

struct ActiveWorkflow {
    context: WorkflowContext,
    cancel: Arc<AtomicBool>,
    status: WorkflowStatus,
    phase: WorkflowPhase,
}

#[derive(Default)]
struct Inner {
    active: HashMap<String, ActiveWorkflow>,
    results: HashMap<String, WorkflowResult>,
    stats: WorkflowStats,
}

/// Drives the six-phase research-to-audit pipeline
pub struct Orchestrator {
    research: Arc<ResearchService>,
    recommendations: Arc<RecommendationsService>,
    manager: Arc<ProviderManager>,
    graph: GraphClient,
    cache: Arc<ResponseCache>,
    reports: Reports,
    standards_dir: PathBuf,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    pub fn new(
        research: Arc<ResearchService>,
        recommendations: Arc<RecommendationsService>,
        manager: Arc<ProviderManager>,
        graph: GraphClient,
        cache: Arc<ResponseCache>,
        standards_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            research,
            recommendations,
            manager,
            graph,
            cache,
            reports: Reports::new(),
            standards_dir: standards_dir.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start a workflow; returns its id immediately
    pub async fn start(
        self: &Arc<Self>,
        research_request: &str,
        code_samples: Vec<String>,
        project_context: Value,
        preferences: Value,
    ) -> Result<String, WorkflowError> {
        if research_request.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("research request must not be empty".to_string()));
        }

        let workflow_id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let context = WorkflowContext {
            workflow_id: workflow_id.clone(),
            user_id: project_context["user_id"].as_str().map(str::to_string),
            research_request: research_request.to_string(),
            project_context,
            preferences,
            code_samples,
            created_at: now,
            updated_at: now,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.stats.workflows_started += 1;
            inner.active.insert(
                workflow_id.clone(),
                ActiveWorkflow {
                    context,
                    cancel: Arc::new(AtomicBool::new(false)),
                    status: WorkflowStatus::Pending,
                    phase: WorkflowPhase::Initialization,
                },
            );
        }

        let orchestrator = self.clone();
        let id = workflow_id.clone();
        tokio::spawn(async move {
            orchestrator.execute(id).await;
        });

        info!(workflow_id, "Started research-to-analysis workflow");
        Ok(workflow_id)
    }

    async fn set_phase(&self, workflow_id: &str, phase: WorkflowPhase) {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.active.get_mut(workflow_id) {
            active.status = WorkflowStatus::InProgress;
            active.phase = phase;
            active.context.updated_at = Utc::now();
        }
        info!(workflow_id, %phase, "Workflow phase started");
    }

    /// Run the phases to a terminal state
    async fn execute(self: Arc<Self>, workflow_id: String) {
        let started = std::time::Instant::now();

        let (context, cancel) = {
            let inner = self.inner.lock().await;
            match inner.active.get(&workflow_id) {
                Some(active) => (active.context.clone(), active.cancel.clone()),
                None => return,
            }
        };

        let mut results = PhaseResults::default();

        // Initialization
        self.set_phase(&workflow_id, WorkflowPhase::Initialization).await;

        // Research
        self.set_phase(&workflow_id, WorkflowPhase::Research).await;
        let research_outcome = match self.run_research(&context).await {
            Ok(outcome) => {
                results.research = Some(outcome.clone());
                self.inner.lock().await.stats.standards_created += 1;
                outcome
            }
            Err(e) => {
                return self
                    .finalize(&workflow_id, WorkflowStatus::Failed, WorkflowPhase::Research, results, vec![e.to_string()], started)
                    .await;
            }
        };
        if cancel.load(Ordering::Acquire) {
            return self
                .finalize(&workflow_id, WorkflowStatus::Cancelled, WorkflowPhase::Research, results, vec![], started)
                .await;
        }

        // Documentation
        self.set_phase(&workflow_id, WorkflowPhase::Documentation).await;
        let documentation = match self.run_documentation(&context, &research_outcome).await {
            Ok(outcome) => {
                results.documentation = Some(outcome.clone());
                outcome
            }
            Err(e) => {
                return self
                    .finalize(&workflow_id, WorkflowStatus::Failed, WorkflowPhase::Documentation, results, vec![e.to_string()], started)
                    .await;
            }
        };
        if cancel.load(Ordering::Acquire) {
            return self
                .finalize(&workflow_id, WorkflowStatus::Cancelled, WorkflowPhase::Documentation, results, vec![], started)
                .await;
        }

        // Validation
        self.set_phase(&workflow_id, WorkflowPhase::Validation).await;
        results.validation = Some(validators::run_validators(&self.manager, &documentation.enhanced_content).await);
        if cancel.load(Ordering::Acquire) {
            return self
                .finalize(&workflow_id, WorkflowStatus::Cancelled, WorkflowPhase::Validation, results, vec![], started)
                .await;
        }

        // Deployment
        self.set_phase(&workflow_id, WorkflowPhase::Deployment).await;
        let deployment = match self.run_deployment(&context, &research_outcome, &documentation).await {
            Ok(outcome) => {
                results.deployment = Some(outcome.clone());
                outcome
            }
            Err(e) => {
                return self
                    .finalize(&workflow_id, WorkflowStatus::Failed, WorkflowPhase::Deployment, results, vec![e.to_string()], started)
                    .await;
            }
        };
        if cancel.load(Ordering::Acquire) {
            return self
                .finalize(&workflow_id, WorkflowStatus::Cancelled, WorkflowPhase::Deployment, results, vec![], started)
                .await;
        }

        // Analysis runs only when code samples were provided
        if !context.code_samples.is_empty() {
            self.set_phase(&workflow_id, WorkflowPhase::Analysis).await;
            match self.run_analysis(&context, &research_outcome, &deployment).await {
                Ok(outcome) => {
                    let samples = outcome.samples.len() as u64;
                    results.analysis = Some(outcome);
                    self.inner.lock().await.stats.code_analyses_performed += samples;
                }
                Err(e) => {
                    return self
                        .finalize(&workflow_id, WorkflowStatus::Failed, WorkflowPhase::Analysis, results, vec![e.to_string()], started)
                        .await;
                }
            }
            if cancel.load(Ordering::Acquire) {
                return self
                    .finalize(&workflow_id, WorkflowStatus::Cancelled, WorkflowPhase::Analysis, results, vec![], started)
                    .await;
            }
        }

        // Feedback
        self.set_phase(&workflow_id, WorkflowPhase::Feedback).await;
        match self.run_feedback(&context, &results).await {
            Ok(outcome) => results.feedback = Some(outcome),
            Err(e) => {
                return self
                    .finalize(&workflow_id, WorkflowStatus::Failed, WorkflowPhase::Feedback, results, vec![e.to_string()], started)
                    .await;
            }
        }

        self.finalize(&workflow_id, WorkflowStatus::Completed, WorkflowPhase::Completion, results, vec![], started)
            .await;
    }

    /// Record the terminal result and release the context
    async fn finalize(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        phase: WorkflowPhase,
        results: PhaseResults,
        errors: Vec<String>,
        started: std::time::Instant,
    ) {
        let result = WorkflowResult {
            workflow_id: workflow_id.to_string(),
            status,
            phase,
            results,
            errors,
            warnings: Vec::new(),
            execution_time: started.elapsed().as_secs_f64(),
            completed_at: Some(Utc::now()),
        };

        let mut inner = self.inner.lock().await;
        inner.active.remove(workflow_id);
        match status {
            WorkflowStatus::Completed => inner.stats.workflows_completed += 1,
            WorkflowStatus::Failed => inner.stats.workflows_failed += 1,
            WorkflowStatus::Cancelled => inner.stats.workflows_cancelled += 1,
            _ => {}
        }
        inner.results.insert(workflow_id.to_string(), result);

        info!(workflow_id, ?status, %phase, "Workflow finished");
    }

    // === Phases ===

    async fn run_research(&self, context: &WorkflowContext) -> Result<ResearchOutcome, WorkflowError> {
        let analysis = self
            .research
            .classify_request(&context.research_request, &context.project_context, &context.preferences)
            .await?;

        let focus_areas = if analysis.key_topics.is_empty() {
            analysis.description.clone()
        } else {
            analysis.key_topics.join(", ")
        };
        let standard = self
            .research
            .research_standard(&analysis.title, analysis.category, &analysis.language, &focus_areas)
            .await?;

        Ok(ResearchOutcome { analysis, standard })
    }

    async fn run_documentation(
        &self,
        context: &WorkflowContext,
        research: &ResearchOutcome,
    ) -> Result<DocumentationOutcome, WorkflowError> {
        let standard = &research.standard;

        let enhancement_prompt = format!(
            "Enhance this coding standard with the following sections where missing:\n\
             1. Implementation guide with step-by-step instructions\n\
             2. Examples and anti-examples\n\
             3. Tools and automation recommendations\n\
             4. Team adoption strategy\n\
             5. Metrics and compliance checking\n\
             6. FAQ\n\n\
             Standard title: {}\n\
             Content:\n{}\n\n\
             Return the enhanced markdown content.",
            standard.name, standard.description
        );
        let enhanced = self
            .manager
            .generate(
                &LlmRequest::new(enhancement_prompt)
                    .with_system_prompt("You are a technical writer expanding coding standards into full documentation.")
                    .with_tier(ModelTier::Balanced),
                None,
            )
            .await?;

        let quick_reference_prompt = format!(
            "Create a concise one-page quick reference for this standard.\n\
             Title: {}\n\
             Content:\n{:.500}\n\n\
             Use bullet points for key rules, do's and don'ts, quick examples, and\n\
             common pitfalls. Keep it under 500 words.",
            standard.name, standard.description
        );
        let quick_reference = self
            .manager
            .generate(
                &LlmRequest::new(quick_reference_prompt)
                    .with_system_prompt("You write terse, accurate reference cards for engineers.")
                    .with_tier(ModelTier::Fast),
                None,
            )
            .await?;

        Ok(DocumentationOutcome {
            enhanced_content: enhanced.content,
            quick_reference: quick_reference.content,
            implementation_checklist: self
                .reports
                .implementation_checklist(&standard.name)
                .map_err(WorkflowError::Report)?,
            onboarding_guide: self
                .reports
                .onboarding_guide(&standard.name, context)
                .map_err(WorkflowError::Report)?,
            compliance_checklist: self
                .reports
                .compliance_checklist(&standard.name)
                .map_err(WorkflowError::Report)?,
        })
    }

    /// Write the standard to every configured sink in parallel
    ///
    /// A sink failure is recorded; the phase fails only when all sinks fail.
    async fn run_deployment(
        &self,
        context: &WorkflowContext,
        research: &ResearchOutcome,
        documentation: &DocumentationOutcome,
    ) -> Result<DeploymentOutcome, WorkflowError> {
        let mut standard = research.standard.clone();
        standard.description = documentation.enhanced_content.clone();

        let filesystem = self.deploy_to_filesystem(&standard);
        let graph = self.deploy_to_graph(&standard);
        let cache = self.deploy_to_cache(context, &standard);
        let (filesystem, graph, cache) = tokio::join!(filesystem, graph, cache);

        let mut outcome = DeploymentOutcome {
            sinks: Vec::new(),
            file_path: None,
            standard_id: None,
            cache_keys: Vec::new(),
        };

        match filesystem {
            Ok(path) => {
                outcome.file_path = Some(path.clone());
                outcome.sinks.push(SinkReport {
                    sink: "filesystem".to_string(),
                    success: true,
                    detail: Some(path),
                });
            }
            Err(e) => outcome.sinks.push(SinkReport {
                sink: "filesystem".to_string(),
                success: false,
                detail: Some(e),
            }),
        }
        match graph {
            Ok(id) => {
                outcome.standard_id = Some(id.clone());
                outcome.sinks.push(SinkReport {
                    sink: "graph".to_string(),
                    success: true,
                    detail: Some(id),
                });
            }
            Err(e) => outcome.sinks.push(SinkReport {
                sink: "graph".to_string(),
                success: false,
                detail: Some(e),
            }),
        }
        match cache {
            Ok(keys) => {
                outcome.cache_keys = keys;
                outcome.sinks.push(SinkReport {
                    sink: "cache".to_string(),
                    success: true,
                    detail: None,
                });
            }
            Err(e) => outcome.sinks.push(SinkReport {
                sink: "cache".to_string(),
                success: false,
                detail: Some(e),
            }),
        }

        if outcome.sinks.iter().all(|s| !s.success) {
            let details: Vec<String> = outcome
                .sinks
                .iter()
                .filter_map(|s| s.detail.clone())
                .collect();
            return Err(WorkflowError::Deployment(details.join("; ")));
        }

        Ok(outcome)
    }

    async fn deploy_to_filesystem(&self, standard: &graphstore::Standard) -> Result<String, String> {
        let dir = self.standards_dir.join(&standard.language);
        std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;

        let path = dir.join(format!("{}_v{}.md", slugify(&standard.name), standard.version));
        std::fs::write(&path, parser::render_markdown(standard)).map_err(|e| e.to_string())?;
        Ok(path.display().to_string())
    }

    async fn deploy_to_graph(&self, standard: &graphstore::Standard) -> Result<String, String> {
        self.graph
            .upsert_standard(standard)
            .await
            .map(|stored| stored.id)
            .map_err(|e| e.to_string())
    }

    async fn deploy_to_cache(
        &self,
        context: &WorkflowContext,
        standard: &graphstore::Standard,
    ) -> Result<Vec<String>, String> {
        let value = serde_json::to_value(standard).map_err(|e| e.to_string())?;
        let keys = vec![
            format!("{}:standard:{}", Namespace::Standards.as_str(), standard.id),
            format!("{}:workflow:{}", Namespace::Standards.as_str(), context.workflow_id),
        ];
        let mut stored_any = false;
        for key in &keys {
            stored_any |= self.cache.set(key, value.clone(), None).await;
        }
        if stored_any {
            Ok(keys)
        } else {
            Err("cache backend unavailable".to_string())
        }
    }

    async fn run_analysis(
        &self,
        context: &WorkflowContext,
        research: &ResearchOutcome,
        deployment: &DeploymentOutcome,
    ) -> Result<AnalysisOutcome, WorkflowError> {
        // Prefer the deployed copy so analysis sees the enhanced content
        let standard = match &deployment.standard_id {
            Some(id) => self.graph.get_standard(id).await?.unwrap_or_else(|| research.standard.clone()),
            None => research.standard.clone(),
        };

        let project_id = context.project_context["project_id"]
            .as_str()
            .unwrap_or(&context.workflow_id)
            .to_string();

        let mut samples = Vec::new();
        for (index, code) in context.code_samples.iter().enumerate() {
            let language = detect_language(code);
            let analysis = self
                .recommendations
                .analyze_code(code, language, None, std::slice::from_ref(&standard))
                .await?;

            // Line-pinned findings are recorded as violations against the
            // deployed standard; the project is merged on first sight
            for rec in analysis.recommendations.iter().filter(|r| r.line.is_some()) {
                let violation = graphstore::Violation::new(
                    standard.id.as_str(),
                    format!("sample_{index}"),
                    rec.line.unwrap_or(0),
                    0,
                    rec.description.as_str(),
                    rec.priority,
                    rec.suggestion.as_str(),
                    project_id.as_str(),
                );
                if let Err(e) = self.graph.record_violation(&violation).await {
                    warn!(error = %e, "Failed to record violation");
                }
            }

            samples.push(SampleAnalysis {
                index,
                language: language.to_string(),
                compliance_score: compliance_score(&analysis.recommendations),
                recommendations: analysis.recommendations,
            });
        }

        let overall_compliance = if samples.is_empty() {
            100.0
        } else {
            samples.iter().map(|s| s.compliance_score).sum::<f64>() / samples.len() as f64
        };

        // Top three recommendation categories across all samples
        let mut category_counts: HashMap<&'static str, usize> = HashMap::new();
        for sample in &samples {
            for rec in &sample.recommendations {
                *category_counts.entry(rec.category.as_str()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = category_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let common_categories = ranked.into_iter().take(3).map(|(c, _)| c.to_string()).collect();

        Ok(AnalysisOutcome {
            samples,
            overall_compliance,
            common_categories,
        })
    }

    async fn run_feedback(
        &self,
        context: &WorkflowContext,
        results: &PhaseResults,
    ) -> Result<FeedbackOutcome, WorkflowError> {
        let validation_score = results
            .validation
            .as_ref()
            .map(|v| v.overall_score)
            .unwrap_or_default();
        let deployment_count = results
            .deployment
            .as_ref()
            .map(|d| d.sinks.iter().filter(|s| s.success).count())
            .unwrap_or(0);

        let feedback_prompt = format!(
            "Summarize this completed standards workflow for its user.\n\
             Request: {}\n\
             Validation score: {validation_score:.0}/100\n\
             Deployment sinks succeeded: {deployment_count}\n\
             Code analysis: {}\n\n\
             Respond with JSON:\n\
             {{\"summary\": \"...\", \"recommendations\": [\"...\"], \"next_steps\": [\"...\"], \"lessons_learned\": [\"...\"]}}",
            context.research_request,
            if results.analysis.is_some() { "performed" } else { "skipped" },
        );
        let response = self
            .manager
            .generate(
                &LlmRequest::new(feedback_prompt)
                    .with_system_prompt("You write concise, actionable workflow summaries.")
                    .with_tier(ModelTier::Fast),
                None,
            )
            .await?;

        let mut feedback = match extract_json(&response.content) {
            Some(value) => FeedbackOutcome {
                summary: value["summary"]
                    .as_str()
                    .unwrap_or("Workflow completed successfully")
                    .to_string(),
                recommendations: string_list(&value["recommendations"]),
                next_steps: string_list(&value["next_steps"]),
                lessons_learned: string_list(&value["lessons_learned"]),
                report_markdown: String::new(),
            },
            None => {
                warn!("Feedback response had no parseable JSON");
                FeedbackOutcome {
                    summary: response.content.trim().to_string(),
                    recommendations: Vec::new(),
                    next_steps: Vec::new(),
                    lessons_learned: Vec::new(),
                    report_markdown: String::new(),
                }
            }
        };

        feedback.report_markdown = self
            .reports
            .completion_report(&feedback, results.validation.as_ref())
            .map_err(WorkflowError::Report)?;
        Ok(feedback)
    }

    // === Queries ===

    /// Status of a workflow; None when the id is unknown
    pub async fn status(&self, workflow_id: &str) -> Option<WorkflowStatusReport> {
        let inner = self.inner.lock().await;

        if let Some(result) = inner.results.get(workflow_id) {
            return Some(WorkflowStatusReport {
                workflow_id: workflow_id.to_string(),
                status: result.status,
                phase: result.phase,
                result: Some(result.clone()),
            });
        }
        inner.active.get(workflow_id).map(|active| WorkflowStatusReport {
            workflow_id: workflow_id.to_string(),
            status: active.status,
            phase: active.phase,
            result: None,
        })
    }

    /// Request cancellation; takes effect at the next phase boundary
    pub async fn cancel(&self, workflow_id: &str) -> bool {
        let inner = self.inner.lock().await;
        match inner.active.get(workflow_id) {
            Some(active) => {
                active.cancel.store(true, Ordering::Release);
                info!(workflow_id, "Workflow cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Terminal result of a workflow, if it finished
    pub async fn result(&self, workflow_id: &str) -> Option<WorkflowResult> {
        self.inner.lock().await.results.get(workflow_id).cloned()
    }

    /// Human-readable completion report
    pub async fn report_markdown(&self, workflow_id: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        let result = inner.results.get(workflow_id)?;
        match &result.results.feedback {
            Some(feedback) => Some(feedback.report_markdown.clone()),
            None => self
                .reports
                .completion_report(
                    &FeedbackOutcome {
                        summary: format!("Workflow ended with status {:?} at phase {}", result.status, result.phase),
                        recommendations: Vec::new(),
                        next_steps: Vec::new(),
                        lessons_learned: Vec::new(),
                        report_markdown: String::new(),
                    },
                    result.results.validation.as_ref(),
                )
                .ok(),
        }
    }

    pub async fn statistics(&self) -> WorkflowStats {
        self.inner.lock().await.stats.clone()
    }

    /// Number of workflows currently executing
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    /// Drop old terminal results, keeping the most recent `keep_recent`
    pub async fn cleanup_results(&self, keep_recent: usize) -> usize {
        let mut inner = self.inner.lock().await;

        let mut finished: Vec<(String, chrono::DateTime<Utc>)> = inner
            .results
            .iter()
            .map(|(id, result)| (id.clone(), result.completed_at.unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)))
            .collect();
        finished.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (id, _) in finished.into_iter().skip(keep_recent) {
            inner.results.remove(&id);
            removed += 1;
        }
        removed
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::ResponseCache;
    use crate::llm::provider::mock::MockProvider;
    use crate::llm::{LlmProvider, ProviderKind};
    use crate::prompts::PromptStore;

    fn orchestrator_with(provider: MockProvider, dir: &std::path::Path) -> Arc<Orchestrator> {
        let mut manager = ProviderManager::new(vec![ProviderKind::Anthropic]);
        manager.register_provider(Arc::new(provider) as Arc<dyn LlmProvider>);
        let manager = Arc::new(manager);

        let prompts = Arc::new(PromptStore::with_builtins());
        let cache = Arc::new(ResponseCache::memory(100, Duration::from_secs(60)));
        let graph = GraphClient::in_memory().unwrap();

        let research = Arc::new(ResearchService::new(
            manager.clone(),
            prompts.clone(),
            graph.clone(),
            cache.clone(),
            dir,
        ));
        let recommendations = Arc::new(RecommendationsService::new(
            manager.clone(),
            prompts,
            cache.clone(),
        ));

        Arc::new(Orchestrator::new(
            research,
            recommendations,
            manager,
            graph,
            cache,
            dir,
        ))
    }

    async fn wait_terminal(orchestrator: &Arc<Orchestrator>, id: &str) -> WorkflowResult {
        for _ in 0..200 {
            if let Some(result) = orchestrator.result(id).await {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workflow {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_workflow_completes_without_code_samples() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"title": "Error handling", "category": "error-handling", "language": "rust", "summary": "done", "score": 80}"#,
        );
        let orchestrator = orchestrator_with(provider, dir.path());

        let id = orchestrator
            .start("research error handling", vec![], Value::Null, Value::Null)
            .await
            .unwrap();
        let result = wait_terminal(&orchestrator, &id).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.phase, WorkflowPhase::Completion);
        assert!(result.results.research.is_some());
        assert!(result.results.documentation.is_some());
        assert!(result.results.validation.is_some());
        assert!(result.results.deployment.is_some());
        assert!(result.results.analysis.is_none(), "analysis skipped without samples");
        assert!(result.results.feedback.is_some());

        // Deployment reached the graph sink
        let deployed = result.results.deployment.as_ref().unwrap();
        assert!(deployed.standard_id.is_some());
        assert!(deployed.sinks.iter().any(|s| s.sink == "filesystem" && s.success));

        // Context released, result retained
        assert_eq!(orchestrator.active_count().await, 0);
        let stats = orchestrator.statistics().await;
        assert_eq!(stats.workflows_started, 1);
        assert_eq!(stats.workflows_completed, 1);
        assert_eq!(stats.standards_created, 1);
    }

    #[tokio::test]
    async fn test_workflow_runs_analysis_with_samples() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"title": "T", "category": "testing", "language": "python", "summary": "s", "score": 90,
                "recommendations": [{"description": "add tests", "category": "testing", "priority": "high"}]}"#,
        );
        let orchestrator = orchestrator_with(provider, dir.path());

        let id = orchestrator
            .start(
                "testing standards",
                vec!["def foo():\n    return 1".to_string()],
                Value::Null,
                Value::Null,
            )
            .await
            .unwrap();
        let result = wait_terminal(&orchestrator, &id).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        let analysis = result.results.analysis.as_ref().expect("analysis ran");
        assert_eq!(analysis.samples.len(), 1);
        assert_eq!(analysis.samples[0].language, "python");
        // One high recommendation: 100 - 10
        assert_eq!(analysis.samples[0].compliance_score, 90.0);
        assert_eq!(analysis.common_categories, vec!["testing"]);

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.code_analyses_performed, 1);
    }

    #[tokio::test]
    async fn test_workflow_fails_at_research_when_all_providers_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_err(ProviderKind::Anthropic, "provider down");
        let orchestrator = orchestrator_with(provider, dir.path());

        let id = orchestrator
            .start("anything", vec![], Value::Null, Value::Null)
            .await
            .unwrap();
        let result = wait_terminal(&orchestrator, &id).await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.phase, WorkflowPhase::Research);
        assert!(!result.errors.is_empty());
        assert!(result.results.research.is_none());

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.workflows_failed, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_execution_terminates_cancelled() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, r#"{"title": "T"}"#);
        let orchestrator = orchestrator_with(provider, dir.path());

        let id = orchestrator.start("req", vec![], Value::Null, Value::Null).await.unwrap();
        // Cancel immediately; the flag lands before one of the boundaries
        orchestrator.cancel(&id).await;
        let result = wait_terminal(&orchestrator, &id).await;

        assert!(
            result.status == WorkflowStatus::Cancelled || result.status == WorkflowStatus::Completed,
            "cancel is cooperative; terminal state must be cancelled or already completed"
        );
        if result.status == WorkflowStatus::Cancelled {
            assert!(result.results.feedback.is_none(), "no phases after the cancel point");
        }
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "x");
        let orchestrator = orchestrator_with(provider, dir.path());

        let err = orchestrator.start("   ", vec![], Value::Null, Value::Null).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_status_of_unknown_workflow_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "x");
        let orchestrator = orchestrator_with(provider, dir.path());
        assert!(orchestrator.status("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_report_markdown_available_after_completion() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(
            ProviderKind::Anthropic,
            r#"{"title": "T", "summary": "all good", "score": 88, "next_steps": ["adopt the standard"]}"#,
        );
        let orchestrator = orchestrator_with(provider, dir.path());

        let id = orchestrator.start("req", vec![], Value::Null, Value::Null).await.unwrap();
        wait_terminal(&orchestrator, &id).await;

        let report = orchestrator.report_markdown(&id).await.unwrap();
        assert!(report.contains("Workflow Completion Report"));
        assert!(report.contains("all good"));
    }

    #[tokio::test]
    async fn test_cleanup_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, r#"{"title": "T", "summary": "s"}"#);
        let orchestrator = orchestrator_with(provider, dir.path());

        let mut ids = Vec::new();
        for i in 0..3 {
            let id = orchestrator
                .start(&format!("req {i}"), vec![], Value::Null, Value::Null)
                .await
                .unwrap();
            wait_terminal(&orchestrator, &id).await;
            ids.push(id);
        }

        let removed = orchestrator.cleanup_results(1).await;
        assert_eq!(removed, 2);
        assert!(orchestrator.result(&ids[2]).await.is_some() || orchestrator.result(&ids[1]).await.is_some());
    }
}
