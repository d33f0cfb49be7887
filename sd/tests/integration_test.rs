//! Integration tests for StandardsDaemon
//!
//! These tests verify end-to-end behavior of the daemon components.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;

use standardsd::api::{ApiRequest, ApiResponse};
use standardsd::batch::{BatchDispatcher, BatchSettings, BatchStatus};
use standardsd::cache::ResponseCache;
use standardsd::graph::GraphClient;
use standardsd::llm::{
    ChunkStream, LlmError, LlmProvider, LlmRequest, LlmResponse, ModelTier, ProviderHealth, ProviderKind,
    ProviderManager, TokenUsage,
};
use standardsd::middleware::{Authenticator, MiddlewareStack, RateLimiter, RequestLogger};
use standardsd::prompts::PromptStore;
use standardsd::recommendations::RecommendationsService;
use standardsd::research::ResearchService;
use standardsd::sync::SyncEngine;
use standardsd::workflow::{Orchestrator, WorkflowPhase, WorkflowStatus};

// =============================================================================
// Test provider
// =============================================================================

/// Scripted provider: fails `failures` times, then answers with `content`
struct ScriptedProvider {
    kind: ProviderKind,
    content: String,
    failures: AtomicUsize,
    calls: AtomicUsize,
    health: ProviderHealth,
}

impl ScriptedProvider {
    fn ok(kind: ProviderKind, content: &str) -> Self {
        Self {
            kind,
            content: content.to_string(),
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            health: ProviderHealth::new(),
        }
    }

    fn failing(kind: ProviderKind) -> Self {
        Self {
            kind,
            content: String::new(),
            failures: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
            health: ProviderHealth::new(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn health(&self) -> &ProviderHealth {
        &self.health
    }

    fn model_for_tier(&self, tier: ModelTier) -> String {
        format!("scripted-{}", tier.as_str())
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(LlmError::ApiError {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        Ok(LlmResponse::new(
            self.content.clone(),
            self.kind,
            self.model_for_tier(request.model_tier),
            TokenUsage::new(10, 5),
        ))
    }

    async fn stream_generate(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let response = self.generate(request).await?;
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx.send(Ok(response.content)).await;
        });
        Ok(rx)
    }
}

fn manager_of(providers: Vec<Arc<ScriptedProvider>>) -> Arc<ProviderManager> {
    let order = providers.iter().map(|p| p.kind()).collect();
    let mut manager = ProviderManager::new(order);
    for provider in providers {
        manager.register_provider(provider as Arc<dyn LlmProvider>);
    }
    Arc::new(manager)
}

// =============================================================================
// Sync engine: parse-and-import plus modification detection
// =============================================================================

#[tokio::test]
async fn test_parse_import_then_detect_modification() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let file = dir.path().join("python/err/handling.md");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, "## Exceptions\n\n- Catch specific exceptions, never bare except\n").unwrap();

    let graph = GraphClient::in_memory().unwrap();
    let engine = SyncEngine::new(graph.clone(), dir.path());

    // First sync imports exactly one standard
    let stats = engine.sync_all(false).await.unwrap();
    assert_eq!(stats.files_added, 1);
    assert_eq!(stats.standards_added, 1);

    let standards = graph.list_standards(10, 0, true).await.unwrap();
    assert_eq!(standards.len(), 1);
    assert_eq!(standards[0].language, "python");
    assert_eq!(standards[0].category, standardsd::Category::ErrorHandling);
    assert_eq!(standards[0].severity, standardsd::Severity::High);
    assert_eq!(standards[0].name, "Catch specific exceptions, never bare except");

    // Appending a bullet re-imports the file: one delete, two adds
    std::fs::write(
        &file,
        "## Exceptions\n\n- Catch specific exceptions, never bare except\n- Always log the exception with context\n",
    )
    .unwrap();

    let stats = engine.sync_all(false).await.unwrap();
    assert_eq!(stats.files_updated, 1);
    assert_eq!(stats.standards_deleted, 1);
    assert_eq!(stats.standards_added, 2);

    let standards = graph.list_standards(10, 0, true).await.unwrap();
    assert_eq!(standards.len(), 2);
    assert!(
        standards
            .iter()
            .all(|s| s.file_source.as_deref() == Some("python/err/handling.md"))
    );
}

// =============================================================================
// Provider manager: fallback sweep
// =============================================================================

#[tokio::test]
async fn test_provider_fallback_sweep() {
    let a = Arc::new(ScriptedProvider::failing(ProviderKind::Anthropic));
    let b = Arc::new(ScriptedProvider::failing(ProviderKind::OpenAi));
    let c = Arc::new(ScriptedProvider::ok(ProviderKind::Local, "ok"));
    let manager = manager_of(vec![a.clone(), b.clone(), c.clone()]);

    let response = manager.generate(&LlmRequest::new("hello"), None).await.unwrap();
    assert_eq!(response.content, "ok");
    assert_eq!(response.provider, ProviderKind::Local);

    let status = manager.provider_status();
    assert_eq!(status["anthropic"].error_count, 1);
    assert_eq!(status["openai"].error_count, 1);

    // Two more sweeps trip A and B; C stays clean
    manager.generate(&LlmRequest::new("x"), None).await.unwrap();
    manager.generate(&LlmRequest::new("y"), None).await.unwrap();

    let status = manager.provider_status();
    assert!(!status["anthropic"].available);
    assert!(!status["openai"].available);
    assert!(status["local"].available);
    assert_eq!(status["local"].error_count, 0);
}

// =============================================================================
// Batch dispatcher: identical requests served from cache
// =============================================================================

#[tokio::test]
async fn test_batch_identical_requests_single_provider_call() {
    let provider = Arc::new(ScriptedProvider::ok(ProviderKind::Anthropic, "answer"));
    let manager = manager_of(vec![provider.clone()]);
    let cache = Arc::new(ResponseCache::memory(100, Duration::from_secs(60)));

    let dispatcher = BatchDispatcher::new(
        manager,
        cache,
        BatchSettings {
            max_concurrent: 1,
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
        },
        None,
    );

    let requests: Vec<_> = (0..10).map(|_| LlmRequest::new("identical prompt")).collect();
    let job = dispatcher.process_batch("batch-cache", requests, None).await;

    assert_eq!(job.status, BatchStatus::Completed);
    assert!((job.progress - 1.0).abs() < f64::EPSILON);
    assert_eq!(job.completed_count(), 10);
    assert_eq!(provider.calls(), 1, "nine items served from cache");
}

// =============================================================================
// Middleware: rate limit and request ids
// =============================================================================

#[tokio::test]
async fn test_rate_limited_request_returns_429_with_retry_after() {
    let stack = MiddlewareStack::new(
        RequestLogger::new(None),
        RateLimiter::new(2),
        Authenticator::with_secret("integration-secret", HashSet::new()),
    );

    let mut statuses = Vec::new();
    let mut last = None;
    for _ in 0..3 {
        let request = ApiRequest::new("GET", "/api/v1/health").with_client_ip("1.2.3.4");
        let response = stack
            .handle(request, |_| async { ApiResponse::ok(json!({"ok": true})) })
            .await;
        statuses.push(response.status);
        last = Some(response);
    }

    assert_eq!(statuses, vec![200, 200, 429]);
    let denied = last.unwrap();
    let retry_after = denied.body["retry_after"].as_u64().unwrap();
    assert!(retry_after <= 60);
    assert_eq!(denied.headers["X-RateLimit-Remaining"], "0");
    assert!(denied.headers.contains_key("X-Request-ID"), "every response carries a request id");
}

#[tokio::test]
async fn test_every_response_has_request_id_header() {
    let stack = MiddlewareStack::new(
        RequestLogger::new(None),
        RateLimiter::new(100),
        Authenticator::with_secret("integration-secret", HashSet::from(["k".to_string()])),
    );

    // Public, authenticated, and rejected requests all carry the header
    for request in [
        ApiRequest::new("GET", "/api/v1/health"),
        ApiRequest::new("GET", "/api/v1/standards/list").with_header("X-API-Key", "k"),
        ApiRequest::new("GET", "/api/v1/standards/list"),
    ] {
        let response = stack
            .handle(request.with_client_ip("5.6.7.8"), |_| async {
                ApiResponse::ok(json!({}))
            })
            .await;
        assert!(response.headers.contains_key("X-Request-ID"));
    }
}

// =============================================================================
// Workflow: cancellation terminates in cancelled
// =============================================================================

fn orchestrator_with(manager: Arc<ProviderManager>, dir: &std::path::Path) -> Arc<Orchestrator> {
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
    let recommendations = Arc::new(RecommendationsService::new(manager.clone(), prompts, cache.clone()));

    Arc::new(Orchestrator::new(research, recommendations, manager, graph, cache, dir))
}

#[tokio::test]
async fn test_workflow_cancel_terminates_cancelled() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let provider = Arc::new(ScriptedProvider::ok(
        ProviderKind::Anthropic,
        r#"{"title": "T", "category": "testing", "summary": "s", "score": 80}"#,
    ));
    let orchestrator = orchestrator_with(manager_of(vec![provider]), dir.path());

    let id = orchestrator
        .start("research something", vec![], Value::Null, Value::Null)
        .await
        .unwrap();
    orchestrator.cancel(&id).await;

    let result = loop {
        if let Some(result) = orchestrator.result(&id).await {
            break result;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    // Cancel is cooperative: either it landed at a phase boundary or the
    // workflow had already raced to completion
    if result.status == WorkflowStatus::Cancelled {
        assert!(result.results.feedback.is_none());
        assert_ne!(result.phase, WorkflowPhase::Completion);
    } else {
        assert_eq!(result.status, WorkflowStatus::Completed);
    }
}

#[tokio::test]
async fn test_workflow_completes_and_deploys() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let provider = Arc::new(ScriptedProvider::ok(
        ProviderKind::Anthropic,
        r#"{"title": "Testing discipline", "category": "testing", "language": "rust", "summary": "good", "score": 85}"#,
    ));
    let orchestrator = orchestrator_with(manager_of(vec![provider]), dir.path());

    let id = orchestrator
        .start("testing standards for rust", vec![], Value::Null, Value::Null)
        .await
        .unwrap();

    let result = loop {
        if let Some(result) = orchestrator.result(&id).await {
            break result;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(result.status, WorkflowStatus::Completed);
    let deployment = result.results.deployment.expect("deployment ran");
    assert!(deployment.standard_id.is_some());

    // The filesystem sink wrote a markdown file under the language dir
    let file_path = deployment.file_path.expect("filesystem sink succeeded");
    assert!(std::path::Path::new(&file_path).exists());
}
