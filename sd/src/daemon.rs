//! Daemon composition root
//!
//! Constructs every long-lived service once, with explicit dependency
//! injection, and wires the scheduled sync loop and signal-driven shutdown.
//! No hidden globals: components receive their collaborators at build time.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::ApiService;
use crate::batch::{BatchDispatcher, BatchSettings};
use crate::cache::{RedisBackend, ResponseCache};
use crate::config::{CacheBackendKind, Config};
use crate::graph::GraphClient;
use crate::llm::{self, LlmError};
use crate::middleware::MiddlewareStack;
use crate::prompts::PromptStore;
use crate::recommendations::RecommendationsService;
use crate::research::ResearchService;
use crate::sync::{ScheduledSync, SyncEngine};
use crate::workflow::Orchestrator;

/// Failures while assembling the daemon
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("graph store initialization failed: {0}")]
    GraphStore(#[from] graphstore::StoreError),

    #[error("LLM layer initialization failed: {0}")]
    Llm(#[from] LlmError),
}

/// The assembled service graph
pub struct Daemon {
    config: Config,
    api: Arc<ApiService>,
    middleware: Arc<MiddlewareStack>,
    scheduler: Arc<ScheduledSync>,
}

impl Daemon {
    /// Build every component from configuration
    pub async fn build(config: Config) -> Result<Self, BuildError> {
        let cache = Arc::new(build_cache(&config).await);
        let graph = GraphClient::open(&config.storage.graph_db_path)?;
        let manager = Arc::new(llm::create_manager(&config.llm)?);
        let prompts = Arc::new(PromptStore::with_builtins());

        let research = Arc::new(ResearchService::new(
            manager.clone(),
            prompts.clone(),
            graph.clone(),
            cache.clone(),
            &config.sync.standards_dir,
        ));
        let recommendations = Arc::new(RecommendationsService::new(
            manager.clone(),
            prompts.clone(),
            cache.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            research.clone(),
            recommendations.clone(),
            manager.clone(),
            graph.clone(),
            cache.clone(),
            &config.sync.standards_dir,
        ));
        let batch = Arc::new(BatchDispatcher::new(
            manager.clone(),
            cache.clone(),
            BatchSettings::from(&config.batch),
            config.batch.rate_limit_per_minute,
        ));
        let sync = Arc::new(SyncEngine::new(graph.clone(), &config.sync.standards_dir));
        let scheduler = Arc::new(ScheduledSync::new(sync.clone()));

        let middleware = Arc::new(MiddlewareStack::from_config(&config.rate_limit, &config.auth));
        let api = Arc::new(ApiService::new(
            graph,
            cache,
            manager,
            recommendations,
            research,
            orchestrator,
            batch,
            sync,
        ));

        info!("Daemon components assembled");
        Ok(Self {
            config,
            api,
            middleware,
            scheduler,
        })
    }

    pub fn api(&self) -> &Arc<ApiService> {
        &self.api
    }

    pub fn middleware(&self) -> &Arc<MiddlewareStack> {
        &self.middleware
    }

    /// Run until interrupted: initial sync, scheduled loop, ctrl-c shutdown
    pub async fn run(&self) -> eyre::Result<()> {
        match self.api.trigger_sync(false).await {
            Ok(stats) => info!(
                files_added = stats.files_added,
                standards_added = stats.standards_added,
                "Initial synchronization complete"
            ),
            Err(e) => warn!(error = %e.detail, "Initial synchronization failed; scheduled loop will retry"),
        }

        self.scheduler.start(Duration::from_secs(self.config.sync.interval_secs));

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        self.scheduler.stop().await;
        info!("Daemon stopped cleanly");
        Ok(())
    }
}

/// Select the cache backend, degrading to no-op when redis is unreachable
async fn build_cache(config: &Config) -> ResponseCache {
    let default_ttl = Duration::from_secs(config.cache.default_ttl_secs);

    match config.cache.backend {
        CacheBackendKind::Memory => ResponseCache::memory(config.cache.max_size, default_ttl),
        CacheBackendKind::Disabled => ResponseCache::disabled(),
        CacheBackendKind::Redis => match std::env::var(&config.cache.redis_url_env) {
            Ok(url) => match RedisBackend::connect(&url).await {
                Ok(backend) => ResponseCache::redis(backend, default_ttl),
                Err(e) => {
                    warn!(error = %e, "Redis unreachable; cache degraded to no-op");
                    ResponseCache::disabled()
                }
            },
            Err(_) => {
                warn!(var = %config.cache.redis_url_env, "Redis URL not set; cache degraded to no-op");
                ResponseCache::disabled()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_cache_memory_default() {
        let config = Config::default();
        let cache = build_cache(&config).await;
        assert_eq!(cache.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_build_cache_disabled() {
        let mut config = Config::default();
        config.cache.backend = CacheBackendKind::Disabled;
        let cache = build_cache(&config).await;
        assert_eq!(cache.backend_name(), "disabled");
    }
}
