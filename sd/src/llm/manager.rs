//! Provider manager: health-aware fan-out with fallback ordering

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::provider::{ChunkStream, LlmProvider};
use super::{LlmError, LlmRequest, LlmResponse, ProviderKind};

/// Snapshot of one provider's health for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub available: bool,
    pub error_count: u32,
    pub last_error: Option<String>,
}

/// Multiplexes several providers with automatic fallback
///
/// Thread-safe: concurrent `generate` calls from the orchestrator and the
/// batch dispatcher are permitted and independent.
pub struct ProviderManager {
    providers: Vec<Arc<dyn LlmProvider>>,
    preferred_order: Vec<ProviderKind>,
}

impl ProviderManager {
    pub fn new(preferred_order: Vec<ProviderKind>) -> Self {
        Self {
            providers: Vec::new(),
            preferred_order,
        }
    }

    /// Register a provider
    pub fn register_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        info!(provider = %provider.kind(), "Registered LLM provider");
        self.providers.push(provider);
    }

    pub fn set_preferred_order(&mut self, order: Vec<ProviderKind>) {
        self.preferred_order = order;
    }

    fn find(&self, kind: ProviderKind) -> Option<&Arc<dyn LlmProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    /// Attempt order: preferred first (when registered), then the
    /// configured preference list
    fn attempt_order(&self, preferred: Option<ProviderKind>) -> Vec<&Arc<dyn LlmProvider>> {
        let mut kinds: Vec<ProviderKind> = Vec::new();

        if let Some(kind) = preferred
            && self.find(kind).is_some()
        {
            kinds.push(kind);
        }
        for kind in &self.preferred_order {
            if !kinds.contains(kind) && self.find(*kind).is_some() {
                kinds.push(*kind);
            }
        }

        kinds.into_iter().filter_map(|kind| self.find(kind)).collect()
    }

    /// Generate with automatic fallback
    ///
    /// Tries candidates in order, skipping tripped providers; returns the
    /// first success. When the sweep is exhausted the composite error names
    /// every attempt.
    pub async fn generate(
        &self,
        request: &LlmRequest,
        preferred: Option<ProviderKind>,
    ) -> Result<LlmResponse, LlmError> {
        let mut attempts = Vec::new();

        for provider in self.attempt_order(preferred) {
            let kind = provider.kind();
            if !provider.health().is_available() {
                debug!(provider = %kind, "Skipping unavailable provider");
                attempts.push(format!("{kind}: skipped (unavailable)"));
                continue;
            }

            debug!(provider = %kind, "Trying provider");
            match provider.generate(request).await {
                Ok(response) => {
                    provider.health().record_success();
                    return Ok(response);
                }
                Err(e) => {
                    let message = e.to_string();
                    provider.health().record_failure(&message);
                    warn!(provider = %kind, error = %message, "Provider failed");
                    attempts.push(format!("{kind}: {message}"));
                }
            }
        }

        Err(LlmError::AllProvidersFailed { attempts })
    }

    /// Streaming generation with fallback
    ///
    /// Fallback applies until a provider yields its first chunk; after that
    /// the manager is committed and mid-stream errors surface without retry.
    pub async fn stream_generate(
        &self,
        request: &LlmRequest,
        preferred: Option<ProviderKind>,
    ) -> Result<ChunkStream, LlmError> {
        let mut attempts = Vec::new();

        for provider in self.attempt_order(preferred) {
            let kind = provider.kind();
            if !provider.health().is_available() {
                attempts.push(format!("{kind}: skipped (unavailable)"));
                continue;
            }

            let mut upstream = match provider.stream_generate(request).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    let message = e.to_string();
                    provider.health().record_failure(&message);
                    warn!(provider = %kind, error = %message, "Provider stream failed to start");
                    attempts.push(format!("{kind}: {message}"));
                    continue;
                }
            };

            match upstream.recv().await {
                Some(Ok(first_chunk)) => {
                    provider.health().record_success();
                    let (tx, rx) = mpsc::channel(64);
                    tokio::spawn(async move {
                        if tx.send(Ok(first_chunk)).await.is_err() {
                            return;
                        }
                        while let Some(item) = upstream.recv().await {
                            if tx.send(item).await.is_err() {
                                break;
                            }
                        }
                    });
                    return Ok(rx);
                }
                Some(Err(e)) => {
                    let message = e.to_string();
                    provider.health().record_failure(&message);
                    attempts.push(format!("{kind}: {message}"));
                }
                None => {
                    // Finished with no chunks: a successful empty stream
                    provider.health().record_success();
                    let (_tx, rx) = mpsc::channel(1);
                    return Ok(rx);
                }
            }
        }

        Err(LlmError::AllProvidersFailed { attempts })
    }

    /// Providers currently accepting requests
    pub fn available_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|p| p.health().is_available())
            .map(|p| p.kind())
            .collect()
    }

    /// Health snapshot of every registered provider
    pub fn provider_status(&self) -> HashMap<String, ProviderStatus> {
        self.providers
            .iter()
            .map(|provider| {
                let health = provider.health();
                (
                    provider.kind().to_string(),
                    ProviderStatus {
                        available: health.is_available(),
                        error_count: health.error_count(),
                        last_error: health.last_error(),
                    },
                )
            })
            .collect()
    }

    /// Re-arm a tripped provider
    pub fn reset_provider(&self, kind: ProviderKind) -> bool {
        match self.find(kind) {
            Some(provider) => {
                provider.health().reset_errors();
                true
            }
            None => false,
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
