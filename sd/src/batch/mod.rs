//! Bounded-concurrency batch execution of LLM requests
//!
//! A batch job fans its items out over a semaphore, consults the response
//! cache before calling providers, retries transient failures with linear
//! backoff, and reports progress to registered callbacks.

mod dispatcher;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::BatchConfig;
use crate::llm::{LlmRequest, LlmResponse};

pub use dispatcher::BatchDispatcher;

/// Sliding-window width for the process-wide request budget
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Status of a batch job or item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled)
    }
}

/// A single request within a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: String,
    #[serde(skip)]
    pub request: LlmRequest,
    pub status: BatchStatus,
    pub response: Option<LlmResponse>,
    pub error: Option<String>,
    pub retries: u32,
}

/// A batch processing job
#[derive(Debug, Clone, Serialize)]
pub struct BatchJob {
    pub id: String,
    pub items: Vec<BatchItem>,
    pub status: BatchStatus,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn new(id: impl Into<String>, requests: Vec<LlmRequest>) -> Self {
        let id = id.into();
        let items = requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| BatchItem {
                id: format!("{id}_{i}"),
                request,
                status: BatchStatus::Pending,
                response: None,
                error: None,
                retries: 0,
            })
            .collect();
        Self {
            id,
            items,
            status: BatchStatus::Pending,
            progress: 0.0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|i| i.status == BatchStatus::Completed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| i.status == BatchStatus::Failed).count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.items.iter().filter(|i| i.status == BatchStatus::Cancelled).count()
    }

    /// Progress is the share of items in a terminal state; 1.0 for empty jobs
    pub fn calculate_progress(&self) -> f64 {
        if self.items.is_empty() {
            return 1.0;
        }
        let terminal = self.items.iter().filter(|i| i.status.is_terminal()).count();
        terminal as f64 / self.items.len() as f64
    }
}

/// Per-batch execution knobs
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl From<&BatchConfig> for BatchSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Progress event emitted to callbacks
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub phase: String,
    pub progress: f64,
    pub completed: usize,
    pub failed: usize,
}

/// Registered progress observer; invoked with (job id, event)
pub type ProgressCallback = Arc<dyn Fn(&str, &BatchProgress) + Send + Sync>;

/// Aggregate dispatcher statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatistics {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub processing_jobs: usize,
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub success_rate: f64,
}

/// Compact job view for status queries
#[derive(Debug, Clone, Serialize)]
pub struct BatchJobSummary {
    pub id: String,
    pub status: BatchStatus,
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&BatchJob> for BatchJobSummary {
    fn from(job: &BatchJob) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            total_items: job.items.len(),
            completed_items: job.completed_count(),
            failed_items: job.failed_count(),
            progress: job.progress,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Process-wide sliding-window request budget
///
/// Counts request timestamps within the last 60 seconds under one lock.
/// Unconfigured (None) means no limiting.
pub struct SlidingWindowBudget {
    limit: Option<u32>,
    timestamps: tokio::sync::Mutex<VecDeque<Instant>>,
}

impl SlidingWindowBudget {
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            timestamps: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Block until a request slot is available, then consume it
    pub async fn acquire(&self) {
        let Some(limit) = self.limit else { return };

        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();

                while timestamps.front().map(|t| now.duration_since(*t) >= RATE_WINDOW).unwrap_or(false) {
                    timestamps.pop_front();
                }

                if (timestamps.len() as u32) < limit {
                    timestamps.push_back(now);
                    return;
                }

                // Wait until the oldest timestamp leaves the window
                let oldest = *timestamps.front().expect("non-empty at limit");
                RATE_WINDOW.saturating_sub(now.duration_since(oldest))
            };

            debug!(?wait, "Batch rate limit reached, waiting");
            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }
}
