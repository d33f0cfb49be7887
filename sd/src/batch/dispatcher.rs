//! Batch dispatcher implementation

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::cache::{Namespace, ResponseCache, cache_key};
use crate::llm::{LlmRequest, LlmResponse, ProviderManager};

use super::{
    BatchItem, BatchJob, BatchJobSummary, BatchProgress, BatchSettings, BatchStatistics, BatchStatus,
    ProgressCallback, SlidingWindowBudget,
};

/// Executes batches of LLM requests with bounded concurrency
pub struct BatchDispatcher {
    manager: Arc<ProviderManager>,
    cache: Arc<ResponseCache>,
    defaults: BatchSettings,
    budget: SlidingWindowBudget,
    jobs: Mutex<HashMap<String, Arc<Mutex<BatchJob>>>>,
    callbacks: std::sync::Mutex<Vec<ProgressCallback>>,
}

impl BatchDispatcher {
    pub fn new(
        manager: Arc<ProviderManager>,
        cache: Arc<ResponseCache>,
        defaults: BatchSettings,
        rate_limit_per_minute: Option<u32>,
    ) -> Self {
        Self {
            manager,
            cache,
            defaults,
            budget: SlidingWindowBudget::new(rate_limit_per_minute),
            jobs: Mutex::new(HashMap::new()),
            callbacks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register a progress observer
    pub fn register_progress_callback(&self, callback: ProgressCallback) {
        self.callbacks.lock().expect("callback lock poisoned").push(callback);
    }

    fn notify(&self, job_id: &str, event: &BatchProgress) {
        let callbacks = self.callbacks.lock().expect("callback lock poisoned").clone();
        for callback in callbacks {
            callback(job_id, event);
        }
    }

    /// Run a batch to completion and return the final job state
    pub async fn process_batch(
        &self,
        job_id: &str,
        requests: Vec<LlmRequest>,
        settings: Option<BatchSettings>,
    ) -> BatchJob {
        let settings = settings.unwrap_or_else(|| self.defaults.clone());
        let total = requests.len();

        let job = Arc::new(Mutex::new(BatchJob::new(job_id, requests)));
        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(job_id.to_string(), job.clone());
            job.lock().await.status = BatchStatus::Processing;
        }

        info!(job_id, items = total, "Starting batch job");
        self.notify(
            job_id,
            &BatchProgress {
                phase: "started".to_string(),
                progress: 0.0,
                completed: 0,
                failed: 0,
            },
        );

        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent));
        let futures = (0..total).map(|index| {
            let semaphore = semaphore.clone();
            let job = job.clone();
            let settings = settings.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");

                // Cancellation stops new items; in-flight ones finish
                let (cancelled, request) = {
                    let guard = job.lock().await;
                    (guard.status == BatchStatus::Cancelled, guard.items[index].request.clone())
                };
                if cancelled {
                    let mut guard = job.lock().await;
                    guard.items[index].status = BatchStatus::Cancelled;
                } else {
                    {
                        job.lock().await.items[index].status = BatchStatus::Processing;
                    }
                    let outcome = self.process_item(&request, &settings).await;
                    let mut guard = job.lock().await;
                    let item = &mut guard.items[index];
                    apply_outcome(item, outcome);
                }

                let event = {
                    let mut guard = job.lock().await;
                    guard.progress = guard.calculate_progress();
                    BatchProgress {
                        phase: "processing".to_string(),
                        progress: guard.progress,
                        completed: guard.completed_count(),
                        failed: guard.failed_count(),
                    }
                };
                self.notify(job_id, &event);
            }
        });
        join_all(futures).await;

        let snapshot = {
            let mut guard = job.lock().await;
            if guard.status != BatchStatus::Cancelled {
                guard.status = BatchStatus::Completed;
            }
            guard.completed_at = Some(Utc::now());
            guard.progress = guard.calculate_progress();
            guard.clone()
        };

        info!(
            job_id,
            completed = snapshot.completed_count(),
            failed = snapshot.failed_count(),
            status = ?snapshot.status,
            "Batch job finished"
        );
        self.notify(
            job_id,
            &BatchProgress {
                phase: match snapshot.status {
                    BatchStatus::Cancelled => "cancelled".to_string(),
                    BatchStatus::Failed => "failed".to_string(),
                    _ => "completed".to_string(),
                },
                progress: snapshot.progress,
                completed: snapshot.completed_count(),
                failed: snapshot.failed_count(),
            },
        );

        snapshot
    }

    /// One item: rate limit, cache lookup, provider call, retries
    async fn process_item(&self, request: &LlmRequest, settings: &BatchSettings) -> ItemOutcome {
        let key = cache_key(
            Namespace::LlmResponse,
            &request.prompt,
            request.model_tier.as_str(),
            request.temperature,
            &Default::default(),
        );

        let mut attempt: u32 = 0;
        loop {
            self.budget.acquire().await;

            if let Some(cached) = self.cache.get(&key).await {
                match serde_json::from_value::<LlmResponse>(cached) {
                    Ok(response) => {
                        debug!("Batch item completed from cache");
                        return ItemOutcome::Completed { response, retries: attempt };
                    }
                    Err(e) => {
                        // Stale shape in cache; drop it and call through
                        warn!(error = %e, "Discarding malformed cache entry");
                        self.cache.delete(&key).await;
                    }
                }
            }

            match self.manager.generate(request, None).await {
                Ok(response) => {
                    if let Ok(value) = serde_json::to_value(&response) {
                        self.cache.set(&key, value, None).await;
                    }
                    return ItemOutcome::Completed { response, retries: attempt };
                }
                Err(e) => {
                    let message = format!("Attempt {} failed: {e}", attempt + 1);
                    warn!(%message, "Batch item attempt failed");

                    if attempt < settings.max_retries {
                        // Linear backoff
                        tokio::time::sleep(settings.retry_delay * (attempt + 1)).await;
                        attempt += 1;
                    } else {
                        return ItemOutcome::Failed {
                            error: message,
                            retries: attempt + 1,
                        };
                    }
                }
            }
        }
    }

    /// Snapshot of a job
    pub async fn get_job(&self, job_id: &str) -> Option<BatchJob> {
        let jobs = self.jobs.lock().await;
        match jobs.get(job_id) {
            Some(job) => Some(job.lock().await.clone()),
            None => None,
        }
    }

    /// Compact status of a job
    pub async fn get_status(&self, job_id: &str) -> Option<BatchJobSummary> {
        self.get_job(job_id).await.map(|job| BatchJobSummary::from(&job))
    }

    /// Item-level results of a job
    pub async fn get_results(&self, job_id: &str) -> Option<Vec<BatchItem>> {
        self.get_job(job_id).await.map(|job| job.items)
    }

    /// Cancel a processing job; no new items begin
    pub async fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.lock().await;
        let Some(job) = jobs.get(job_id) else { return false };

        let mut guard = job.lock().await;
        if guard.status == BatchStatus::Processing {
            guard.status = BatchStatus::Cancelled;
            guard.completed_at = Some(Utc::now());
            info!(job_id, "Cancelled batch job");
            true
        } else {
            false
        }
    }

    /// Summaries of every known job
    pub async fn list_jobs(&self) -> Vec<BatchJobSummary> {
        let jobs = self.jobs.lock().await;
        let mut summaries = Vec::with_capacity(jobs.len());
        for job in jobs.values() {
            summaries.push(BatchJobSummary::from(&*job.lock().await));
        }
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    /// Drop old terminal jobs, keeping the most recent `keep_recent`
    pub async fn cleanup_completed(&self, keep_recent: usize) -> usize {
        let mut jobs = self.jobs.lock().await;

        let mut terminal: Vec<(String, chrono::DateTime<Utc>)> = Vec::new();
        for (id, job) in jobs.iter() {
            let guard = job.lock().await;
            if guard.status.is_terminal() {
                terminal.push((id.clone(), guard.completed_at.unwrap_or(guard.started_at)));
            }
        }

        terminal.sort_by(|a, b| b.1.cmp(&a.1));
        let mut removed = 0;
        for (id, _) in terminal.into_iter().skip(keep_recent) {
            jobs.remove(&id);
            removed += 1;
        }
        removed
    }

    /// Aggregate statistics across all known jobs
    pub async fn statistics(&self) -> BatchStatistics {
        let jobs = self.jobs.lock().await;
        let mut stats = BatchStatistics::default();

        for job in jobs.values() {
            let guard = job.lock().await;
            stats.total_jobs += 1;
            match guard.status {
                BatchStatus::Completed => stats.completed_jobs += 1,
                BatchStatus::Failed => stats.failed_jobs += 1,
                BatchStatus::Processing => stats.processing_jobs += 1,
                _ => {}
            }
            stats.total_items += guard.items.len();
            stats.completed_items += guard.completed_count();
            stats.failed_items += guard.failed_count();
        }

        stats.success_rate = if stats.total_items == 0 {
            0.0
        } else {
            stats.completed_items as f64 / stats.total_items as f64
        };
        stats
    }
}

enum ItemOutcome {
    Completed { response: LlmResponse, retries: u32 },
    Failed { error: String, retries: u32 },
}

fn apply_outcome(item: &mut BatchItem, outcome: ItemOutcome) {
    match outcome {
        ItemOutcome::Completed { response, retries } => {
            item.response = Some(response);
            item.retries = retries;
            item.status = BatchStatus::Completed;
        }
        ItemOutcome::Failed { error, retries } => {
            item.error = Some(error);
            item.retries = retries;
            item.status = BatchStatus::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::cache::ResponseCache;
    use crate::llm::provider::mock::{MockOutcome, MockProvider};
    use crate::llm::{LlmProvider, ProviderKind};

    fn dispatcher_with(provider: MockProvider) -> (BatchDispatcher, Arc<MockProvider>) {
        let provider = Arc::new(provider);
        let mut manager = ProviderManager::new(vec![ProviderKind::Anthropic]);
        manager.register_provider(provider.clone() as Arc<dyn LlmProvider>);
        let dispatcher = BatchDispatcher::new(
            Arc::new(manager),
            Arc::new(ResponseCache::memory(100, Duration::from_secs(60))),
            BatchSettings {
                max_concurrent: 5,
                max_retries: 2,
                retry_delay: Duration::from_millis(1),
            },
            None,
        );
        (dispatcher, provider)
    }

    #[tokio::test]
    async fn test_identical_requests_hit_cache_after_first() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "answer");
        let (dispatcher, provider) = dispatcher_with(provider);

        // Force sequential processing so the first item populates the cache
        let settings = BatchSettings {
            max_concurrent: 1,
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
        };
        let requests: Vec<_> = (0..10).map(|_| LlmRequest::new("same prompt")).collect();
        let job = dispatcher.process_batch("job-1", requests, Some(settings)).await;

        assert_eq!(job.status, BatchStatus::Completed);
        assert!((job.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(job.completed_count(), 10);

        // Exactly one provider call; the other nine served from cache
        assert_eq!(provider.call_count(), 1);
        let stats = dispatcher.cache.stats();
        assert_eq!(stats.hits, 9);
    }

    #[tokio::test]
    async fn test_item_counts_sum_to_total() {
        let provider = MockProvider::new(
            ProviderKind::Anthropic,
            vec![
                MockOutcome::Succeed("a".to_string()),
                // Item 2 exhausts its initial attempt plus one retry; two
                // consecutive failures stay under the provider trip threshold
                MockOutcome::Fail("x".to_string()),
                MockOutcome::Fail("x".to_string()),
                MockOutcome::Succeed("c".to_string()),
            ],
        );
        let (dispatcher, _provider) = dispatcher_with(provider);

        let settings = BatchSettings {
            max_concurrent: 1,
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
        };
        let requests = vec![
            LlmRequest::new("one"),
            LlmRequest::new("two"),
            LlmRequest::new("three"),
        ];
        let job = dispatcher.process_batch("job-2", requests, Some(settings)).await;

        assert_eq!(
            job.completed_count() + job.failed_count() + job.cancelled_count(),
            3
        );
        assert!((job.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(job.failed_count(), 1);
        assert_eq!(job.completed_count(), 2);

        let failed = job.items.iter().find(|i| i.status == BatchStatus::Failed).unwrap();
        assert_eq!(failed.retries, 2);
        assert!(failed.error.as_ref().unwrap().contains("Attempt 2"));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let provider = MockProvider::new(
            ProviderKind::Anthropic,
            vec![
                MockOutcome::Fail("transient".to_string()),
                MockOutcome::Succeed("recovered".to_string()),
            ],
        );
        let (dispatcher, _provider) = dispatcher_with(provider);

        let job = dispatcher
            .process_batch("job-3", vec![LlmRequest::new("only")], None)
            .await;

        assert_eq!(job.completed_count(), 1);
        assert_eq!(job.items[0].retries, 1);
        assert_eq!(job.items[0].response.as_ref().unwrap().content, "recovered");
    }

    #[tokio::test]
    async fn test_progress_events_fire_per_item() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "x");
        let (dispatcher, _provider) = dispatcher_with(provider);

        let events = Arc::new(AtomicUsize::new(0));
        let seen = events.clone();
        dispatcher.register_progress_callback(Arc::new(move |_job_id, event| {
            if event.phase == "processing" {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // Distinct prompts so the cache does not collapse provider calls
        let requests: Vec<_> = (0..4).map(|i| LlmRequest::new(format!("p{i}"))).collect();
        dispatcher.process_batch("job-4", requests, None).await;

        assert_eq!(events.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancel_stops_new_items() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "x");
        let (dispatcher, _provider) = dispatcher_with(provider);
        let dispatcher = Arc::new(dispatcher);

        // Seed a processing job directly to exercise the cancel path
        let requests: Vec<_> = (0..3).map(|i| LlmRequest::new(format!("p{i}"))).collect();
        let job = Arc::new(Mutex::new(BatchJob::new("job-5", requests)));
        job.lock().await.status = BatchStatus::Processing;
        dispatcher.jobs.lock().await.insert("job-5".to_string(), job);

        assert!(dispatcher.cancel("job-5").await);
        let status = dispatcher.get_status("job-5").await.unwrap();
        assert_eq!(status.status, BatchStatus::Cancelled);

        // Already-terminal jobs cannot be cancelled again
        assert!(!dispatcher.cancel("job-5").await);
        assert!(!dispatcher.cancel("missing").await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_jobs() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "x");
        let (dispatcher, _provider) = dispatcher_with(provider);

        for i in 0..5 {
            dispatcher
                .process_batch(&format!("job-{i}"), vec![LlmRequest::new(format!("p{i}"))], None)
                .await;
        }

        let removed = dispatcher.cleanup_completed(2).await;
        assert_eq!(removed, 3);
        assert_eq!(dispatcher.list_jobs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_statistics() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "x");
        let (dispatcher, _provider) = dispatcher_with(provider);

        dispatcher
            .process_batch("job-a", vec![LlmRequest::new("p1"), LlmRequest::new("p2")], None)
            .await;

        let stats = dispatcher.statistics().await;
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.total_items, 2);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_content_completes_without_retry() {
        let provider = MockProvider::always_ok(ProviderKind::Anthropic, "");
        let (dispatcher, _provider) = dispatcher_with(provider);

        let job = dispatcher
            .process_batch("job-empty", vec![LlmRequest::new("p")], None)
            .await;

        assert_eq!(job.completed_count(), 1);
        assert_eq!(job.items[0].retries, 0);
        assert_eq!(job.items[0].response.as_ref().unwrap().content, "");
    }
}
