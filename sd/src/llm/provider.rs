//! Provider trait and per-provider health tracking

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{LlmError, LlmRequest, LlmResponse, ModelTier, ProviderKind};

/// Consecutive failures before a provider trips to unavailable
pub const TRIP_THRESHOLD: u32 = 3;

/// Per-provider health counters
///
/// Mutated only by the manager around generate calls. Counters are atomic so
/// status readers tolerate racing updates without tearing; there is no
/// time-based auto-heal, only `reset_errors`.
#[derive(Debug)]
pub struct ProviderHealth {
    available: AtomicBool,
    error_count: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderHealth {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            error_count: AtomicU32::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("health lock poisoned").clone()
    }

    /// Success resets the error streak
    pub fn record_success(&self) {
        self.error_count.store(0, Ordering::Release);
    }

    /// Failure bumps the streak; the provider trips at the threshold
    pub fn record_failure(&self, error: &str) {
        let errors = self.error_count.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_error.lock().expect("health lock poisoned") = Some(error.to_string());
        if errors >= TRIP_THRESHOLD {
            self.available.store(false, Ordering::Release);
            tracing::warn!(errors, error, "Provider tripped to unavailable");
        }
    }

    /// Return to the initial healthy state
    pub fn reset_errors(&self) {
        self.error_count.store(0, Ordering::Release);
        *self.last_error.lock().expect("health lock poisoned") = None;
        self.available.store(true, Ordering::Release);
    }
}

/// A stream of generated text chunks; finite and not restartable
pub type ChunkStream = mpsc::Receiver<Result<String, LlmError>>;

/// One LLM backend
///
/// Implementations are stateless per call apart from the health counters;
/// concurrent calls are permitted and independent.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn health(&self) -> &ProviderHealth;

    /// Resolve the model name for a requested tier
    fn model_for_tier(&self, tier: ModelTier) -> String;

    /// Blocking generation
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Streaming generation
    ///
    /// Returns a channel of text chunks. Transport-level failures before the
    /// request is accepted surface as `Err`; mid-stream failures arrive as
    /// `Err` items on the channel.
    async fn stream_generate(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_initial_state() {
        let health = ProviderHealth::new();
        assert!(health.is_available());
        assert_eq!(health.error_count(), 0);
        assert!(health.last_error().is_none());
    }

    #[test]
    fn test_health_trips_at_threshold() {
        let health = ProviderHealth::new();
        health.record_failure("one");
        health.record_failure("two");
        assert!(health.is_available());

        health.record_failure("three");
        assert!(!health.is_available());
        assert_eq!(health.error_count(), 3);
        assert_eq!(health.last_error().as_deref(), Some("three"));
    }

    #[test]
    fn test_success_resets_error_streak() {
        let health = ProviderHealth::new();
        health.record_failure("one");
        health.record_failure("two");
        health.record_success();
        assert_eq!(health.error_count(), 0);

        // A fresh streak needs the full threshold again
        health.record_failure("one");
        health.record_failure("two");
        assert!(health.is_available());
    }

    #[test]
    fn test_reset_errors_restores_availability() {
        let health = ProviderHealth::new();
        for i in 0..5 {
            health.record_failure(&format!("err {i}"));
        }
        assert!(!health.is_available());

        health.reset_errors();
        assert!(health.is_available());
        assert_eq!(health.error_count(), 0);
        assert!(health.last_error().is_none());
    }
}
