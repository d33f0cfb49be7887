//! Service facade implementing the published operations

use std::collections::HashMap;
use std::sync::Arc;

use graphstore::{Category, Severity, Standard, StandardCriteria};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::batch::BatchDispatcher;
use crate::cache::ResponseCache;
use crate::graph::GraphClient;
use crate::llm::{LlmError, ProviderManager};
use crate::recommendations::{Recommendation, RecommendationsError, RecommendationsService};
use crate::research::{ResearchError, ResearchService, StandardUpdate};
use crate::sync::{SyncEngine, SyncStats, SyncStatus};
use crate::workflow::{Orchestrator, WorkflowError, WorkflowStats, WorkflowStatusReport};

use super::types::ApiError;

/// Context-aware standards search
#[derive(Debug, Clone, Deserialize)]
pub struct SearchStandardsRequest {
    pub query: String,
    pub language: Option<String>,
    pub category: Option<Category>,
    pub limit: Option<usize>,
    /// Free-form caller context; echoed in metadata
    pub agent_context: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub language: String,
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMetadata {
    pub query: String,
    pub total_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_context: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStandardsResponse {
    pub results: Vec<SearchResult>,
    pub metadata: SearchMetadata,
}

/// Code analysis request
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeCodeRequest {
    pub code: String,
    pub language: String,
    pub focus: Option<String>,
}

/// A violation pinned to a source line
#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    pub line: u32,
    pub message: String,
    pub severity: Severity,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeCodeResponse {
    pub language: String,
    pub violations: Vec<ViolationReport>,
    pub recommendations: Vec<Recommendation>,
    pub summary: Option<String>,
}

/// Standards listing with pagination
#[derive(Debug, Clone, Deserialize)]
pub struct ListStandardsQuery {
    pub language: Option<String>,
    pub category: Option<Category>,
    #[serde(default = "default_true")]
    pub active_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct ListStandardsResponse {
    pub standards: Vec<Standard>,
    pub total: u64,
}

/// Prioritized recommendations request
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationsRequest {
    pub code: String,
    pub language: String,
    pub priority_threshold: Option<Severity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
    pub total: usize,
}

/// Research a new standard
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStandardRequest {
    pub topic: String,
    pub category: Option<Category>,
    pub language: Option<String>,
    #[serde(default)]
    pub auto_approve: bool,
}

/// Start an integrated workflow
#[derive(Debug, Clone, Deserialize)]
pub struct StartWorkflowRequest {
    pub research_request: String,
    #[serde(default)]
    pub code_samples: Vec<String>,
    #[serde(default)]
    pub project_context: Value,
    #[serde(default)]
    pub preferences: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartWorkflowResponse {
    pub workflow_id: String,
}

/// Overall plus per-collaborator readiness
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub collaborators: HashMap<String, Value>,
}

/// Implements every published operation over the core components
pub struct ApiService {
    graph: GraphClient,
    cache: Arc<ResponseCache>,
    manager: Arc<ProviderManager>,
    recommendations: Arc<RecommendationsService>,
    research: Arc<ResearchService>,
    orchestrator: Arc<Orchestrator>,
    batch: Arc<BatchDispatcher>,
    sync: Arc<SyncEngine>,
}

impl ApiService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: GraphClient,
        cache: Arc<ResponseCache>,
        manager: Arc<ProviderManager>,
        recommendations: Arc<RecommendationsService>,
        research: Arc<ResearchService>,
        orchestrator: Arc<Orchestrator>,
        batch: Arc<BatchDispatcher>,
        sync: Arc<SyncEngine>,
    ) -> Self {
        Self {
            graph,
            cache,
            manager,
            recommendations,
            research,
            orchestrator,
            batch,
            sync,
        }
    }

    /// Ranked search with relevance scores
    ///
    /// A store failure degrades to an empty result set with a warning, not
    /// an error to the caller.
    pub async fn search_standards(&self, request: SearchStandardsRequest) -> SearchStandardsResponse {
        let limit = request.limit.unwrap_or(10);
        let hits = match self
            .graph
            .semantic_search(&request.query, limit, graphstore::DEFAULT_SEARCH_THRESHOLD)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Semantic search failed, returning empty results");
                Vec::new()
            }
        };

        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| {
                request
                    .language
                    .as_ref()
                    .is_none_or(|language| hit.standard.language == *language)
                    && request.category.is_none_or(|category| hit.standard.category == category)
            })
            .map(|hit| SearchResult {
                id: hit.standard.id,
                name: hit.standard.name,
                language: hit.standard.language,
                category: hit.standard.category,
                severity: hit.standard.severity,
                description: hit.standard.description,
                relevance_score: hit.relevance_score,
            })
            .collect();

        SearchStandardsResponse {
            metadata: SearchMetadata {
                query: request.query,
                total_results: results.len(),
                agent_context: request.agent_context,
            },
            results,
        }
    }

    /// Analyze code; returns violations and prioritized recommendations
    pub async fn analyze_code(&self, request: AnalyzeCodeRequest) -> Result<AnalyzeCodeResponse, ApiError> {
        const PATH: &str = "/api/v1/agent/analyze-code";

        let context = match self
            .graph
            .find_by_criteria(&StandardCriteria {
                language: Some(request.language.clone()),
                category: None,
                active_only: true,
            })
            .await
        {
            Ok(standards) => standards,
            Err(e) => {
                warn!(error = %e, "Standards context unavailable for analysis");
                Vec::new()
            }
        };

        let analysis = self
            .recommendations
            .analyze_code(&request.code, &request.language, request.focus.as_deref(), &context)
            .await
            .map_err(|e| map_recommendations_error(e, PATH))?;

        let violations = analysis
            .recommendations
            .iter()
            .filter_map(|rec| {
                rec.line.map(|line| ViolationReport {
                    line,
                    message: rec.description.clone(),
                    severity: rec.priority,
                    suggestion: rec.suggestion.clone(),
                })
            })
            .collect();

        let mut recommendations = analysis.recommendations;
        recommendations.sort_by_key(|r| r.priority);

        Ok(AnalyzeCodeResponse {
            language: analysis.language,
            violations,
            recommendations,
            summary: analysis.summary,
        })
    }

    /// Paginated standards listing
    pub async fn list_standards(&self, query: ListStandardsQuery) -> Result<ListStandardsResponse, ApiError> {
        const PATH: &str = "/api/v1/standards/list";

        let standards = if query.language.is_some() || query.category.is_some() {
            self.graph
                .find_by_criteria(&StandardCriteria {
                    language: query.language.clone(),
                    category: query.category,
                    active_only: query.active_only,
                })
                .await
                .map_err(|e| ApiError::unavailable(e.to_string(), PATH))?
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .collect()
        } else {
            self.graph
                .list_standards(query.limit, query.offset, query.active_only)
                .await
                .map_err(|e| ApiError::unavailable(e.to_string(), PATH))?
        };

        let total = self
            .graph
            .count_standards(query.active_only)
            .await
            .map_err(|e| ApiError::unavailable(e.to_string(), PATH))?;

        Ok(ListStandardsResponse { standards, total })
    }

    /// Single standard by id
    pub async fn get_standard(&self, id: &str) -> Result<Standard, ApiError> {
        let path = format!("/api/v1/standards/{id}");
        self.graph
            .get_standard(id)
            .await
            .map_err(|e| ApiError::unavailable(e.to_string(), path.clone()))?
            .ok_or_else(|| ApiError::not_found(format!("standard {id} not found"), path))
    }

    /// Update a standard: archives the previous version and bumps
    pub async fn update_standard(&self, id: &str, update: StandardUpdate) -> Result<Standard, ApiError> {
        let path = format!("/api/v1/standards/{id}");
        self.research
            .update_standard(id, update)
            .await
            .map_err(|e| map_research_error(e, &path))?
            .ok_or_else(|| ApiError::not_found(format!("standard {id} not found"), path))
    }

    /// Soft delete (active=false)
    pub async fn delete_standard(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/api/v1/standards/{id}");
        let deleted = self
            .graph
            .set_active(id, false)
            .await
            .map_err(|e| ApiError::unavailable(e.to_string(), path.clone()))?;
        if deleted {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("standard {id} not found"), path))
        }
    }

    /// Ranked recommendations at or above the priority threshold
    pub async fn get_recommendations(
        &self,
        request: RecommendationsRequest,
    ) -> Result<RecommendationsResponse, ApiError> {
        const PATH: &str = "/api/v1/standards/recommendations";

        let analysis = self
            .recommendations
            .analyze_code(&request.code, &request.language, None, &[])
            .await
            .map_err(|e| map_recommendations_error(e, PATH))?;

        let threshold = request.priority_threshold.unwrap_or(Severity::Low);
        let mut recommendations: Vec<Recommendation> =
            analysis.at_or_above(threshold).into_iter().cloned().collect();
        recommendations.sort_by_key(|r| r.priority);

        Ok(RecommendationsResponse {
            total: recommendations.len(),
            recommendations,
        })
    }

    /// Research and optionally store a new standard
    pub async fn create_standard(&self, request: CreateStandardRequest) -> Result<Standard, ApiError> {
        const PATH: &str = "/api/v1/standards/research";

        if request.topic.trim().is_empty() {
            return Err(ApiError::bad_request("topic must not be empty", PATH));
        }

        let category = request.category.unwrap_or(Category::BestPractices);
        let language = request.language.unwrap_or_else(|| "general".to_string());

        let standard = self
            .research
            .research_standard(&request.topic, category, &language, &request.topic)
            .await
            .map_err(|e| map_research_error(e, PATH))?;

        if request.auto_approve {
            return self
                .graph
                .upsert_standard(&standard)
                .await
                .map_err(|e| ApiError::unavailable(e.to_string(), PATH));
        }
        Ok(standard)
    }

    /// Kick off the integrated workflow
    pub async fn start_workflow(&self, request: StartWorkflowRequest) -> Result<StartWorkflowResponse, ApiError> {
        const PATH: &str = "/api/v1/workflow/start";

        let workflow_id = self
            .orchestrator
            .start(
                &request.research_request,
                request.code_samples,
                request.project_context,
                request.preferences,
            )
            .await
            .map_err(|e| match e {
                WorkflowError::InvalidRequest(detail) => ApiError::bad_request(detail, PATH),
                other => ApiError::internal(other.to_string(), PATH),
            })?;

        Ok(StartWorkflowResponse { workflow_id })
    }

    pub async fn workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatusReport, ApiError> {
        let path = format!("/api/v1/workflow/{workflow_id}/status");
        self.orchestrator
            .status(workflow_id)
            .await
            .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found"), path))
    }

    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/v1/workflow/{workflow_id}/cancel");
        if self.orchestrator.cancel(workflow_id).await {
            Ok(())
        } else {
            Err(ApiError::not_found(
                format!("workflow {workflow_id} not found or already finished"),
                path,
            ))
        }
    }

    /// Workflow report as JSON or rendered markdown
    pub async fn workflow_report(&self, workflow_id: &str, format: &str) -> Result<Value, ApiError> {
        let path = format!("/api/v1/workflow/{workflow_id}/report");

        match format {
            "markdown" => self
                .orchestrator
                .report_markdown(workflow_id)
                .await
                .map(|report| json!({ "format": "markdown", "report": report }))
                .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found"), path)),
            "json" => {
                let result = self
                    .orchestrator
                    .result(workflow_id)
                    .await
                    .ok_or_else(|| ApiError::not_found(format!("workflow {workflow_id} not found"), path.clone()))?;
                serde_json::to_value(&result).map_err(|e| ApiError::internal(e.to_string(), path))
            }
            other => Err(ApiError::bad_request(format!("unknown report format: {other}"), path)),
        }
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync.status().await
    }

    /// Trigger a sync run now
    pub async fn trigger_sync(&self, force: bool) -> Result<SyncStats, ApiError> {
        const PATH: &str = "/api/v1/sync/trigger";
        self.sync
            .sync_all(force)
            .await
            .map_err(|e| ApiError::internal(e.to_string(), PATH))
    }

    pub async fn workflow_statistics(&self) -> WorkflowStats {
        self.orchestrator.statistics().await
    }

    pub async fn batch_statistics(&self) -> crate::batch::BatchStatistics {
        self.batch.statistics().await
    }

    /// Overall plus per-collaborator readiness
    pub async fn health(&self) -> HealthResponse {
        let graph_ok = self.graph.health_check().await;
        let cache_ok = self.cache.health_check().await;
        let providers = self.manager.provider_status();
        let any_provider = providers.values().any(|p| p.available);

        let status = if graph_ok && any_provider { "healthy" } else { "degraded" };

        let mut collaborators = HashMap::new();
        collaborators.insert("graph_store".to_string(), json!({ "available": graph_ok }));
        collaborators.insert(
            "cache".to_string(),
            json!({ "backend": self.cache.backend_name(), "available": cache_ok, "stats": self.cache.stats() }),
        );
        collaborators.insert(
            "llm_providers".to_string(),
            serde_json::to_value(&providers).unwrap_or(Value::Null),
        );

        HealthResponse {
            status: status.to_string(),
            collaborators,
        }
    }
}

fn map_recommendations_error(error: RecommendationsError, path: &str) -> ApiError {
    match error {
        RecommendationsError::Validation(detail) => ApiError::bad_request(detail, path),
        RecommendationsError::Llm(e) => map_llm_error(e, path),
        RecommendationsError::Prompt(e) => ApiError::internal(e.to_string(), path),
    }
}

fn map_research_error(error: ResearchError, path: &str) -> ApiError {
    match error {
        ResearchError::Llm(e) => map_llm_error(e, path),
        other => ApiError::internal(other.to_string(), path),
    }
}

fn map_llm_error(error: LlmError, path: &str) -> ApiError {
    match &error {
        LlmError::AllProvidersFailed { .. } | LlmError::Unavailable { .. } => {
            ApiError::unavailable(error.to_string(), path)
        }
        _ => ApiError::internal(error.to_string(), path),
    }
}
