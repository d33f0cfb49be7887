//! StandardsDaemon configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// Standards synchronization configuration
    pub sync: SyncConfig,

    /// Batch dispatcher defaults
    pub batch: BatchConfig,

    /// Request authentication
    pub auth: AuthConfig,

    /// Request-plane rate limiting
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .standardsd.yml
        let local_config = PathBuf::from(".standardsd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/standardsd/standardsd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("standardsd").join("standardsd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Fail fast on missing secrets
    ///
    /// At least one enabled provider must have its API key in the
    /// environment; a redis cache backend needs its URL variable set.
    pub fn validate(&self) -> Result<()> {
        let mut usable_providers = 0;
        for settings in [&self.llm.anthropic, &self.llm.openai] {
            if settings.enabled && std::env::var(&settings.api_key_env).is_ok() {
                usable_providers += 1;
            }
        }
        if usable_providers == 0 {
            return Err(eyre!(
                "No usable LLM provider: set {} or {} (or disable the provider)",
                self.llm.anthropic.api_key_env,
                self.llm.openai.api_key_env
            ));
        }

        if self.cache.backend == CacheBackendKind::Redis && std::env::var(&self.cache.redis_url_env).is_err() {
            return Err(eyre!(
                "Cache backend is redis but {} is not set",
                self.cache.redis_url_env
            ));
        }

        Ok(())
    }
}

/// Model names per performance tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierModels {
    pub fast: Option<String>,
    pub balanced: Option<String>,
    pub advanced: Option<String>,
}

/// Settings for a single LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether this provider participates in dispatch
    pub enabled: bool,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Tier-to-model overrides; unset tiers use compiled-in defaults
    pub models: TierModels,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: String::new(),
            base_url: String::new(),
            models: TierModels::default(),
        }
    }
}

/// LLM layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider preference order for fallback
    #[serde(rename = "preferred-order")]
    pub preferred_order: Vec<String>,

    pub anthropic: ProviderSettings,

    pub openai: ProviderSettings,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Default maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            preferred_order: vec!["anthropic".to_string(), "openai".to_string()],
            anthropic: ProviderSettings {
                enabled: true,
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                base_url: "https://api.anthropic.com".to_string(),
                models: TierModels::default(),
            },
            openai: ProviderSettings {
                enabled: true,
                api_key_env: "OPENAI_API_KEY".to_string(),
                base_url: "https://api.openai.com".to_string(),
                models: TierModels::default(),
            },
            timeout_ms: 60_000,
            max_tokens: 4096,
        }
    }
}

/// Cache backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Redis,
    Disabled,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,

    /// Environment variable holding the redis connection URL
    #[serde(rename = "redis-url-env")]
    pub redis_url_env: String,

    /// Maximum entries for the in-memory backend
    #[serde(rename = "max-size")]
    pub max_size: usize,

    /// Default TTL in seconds when no namespace policy applies
    #[serde(rename = "default-ttl-secs")]
    pub default_ttl_secs: u64,

    /// Cache operation timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url_env: "REDIS_URL".to_string(),
            max_size: 1000,
            default_ttl_secs: 3600,
            timeout_ms: 5000,
        }
    }
}

/// Standards synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the standards tree (<root>/<language>/**.md)
    #[serde(rename = "standards-dir")]
    pub standards_dir: PathBuf,

    /// Scheduled sync interval in seconds
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            standards_dir: PathBuf::from("standards"),
            interval_secs: 3600,
        }
    }
}

/// Batch dispatcher defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrency semaphore size
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Retries per item before marking it failed
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds (linear backoff)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Process-wide request budget per minute; None disables limiting
    #[serde(rename = "rate-limit-per-minute")]
    pub rate_limit_per_minute: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_retries: 3,
            retry_delay_ms: 1000,
            rate_limit_per_minute: None,
        }
    }
}

/// Request authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding the JWT signing secret
    #[serde(rename = "jwt-secret-env")]
    pub jwt_secret_env: String,

    /// JWT signing algorithm
    #[serde(rename = "jwt-algorithm")]
    pub jwt_algorithm: String,

    /// Default token lifetime in hours
    #[serde(rename = "jwt-expiry-hours")]
    pub jwt_expiry_hours: i64,

    /// Header carrying API keys
    #[serde(rename = "api-key-header")]
    pub api_key_header: String,

    /// Environment variable holding comma-separated accepted API keys
    #[serde(rename = "api-keys-env")]
    pub api_keys_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: "SD_JWT_SECRET".to_string(),
            jwt_algorithm: "HS256".to_string(),
            jwt_expiry_hours: 24,
            api_key_header: "X-API-Key".to_string(),
            api_keys_env: "SD_API_KEYS".to_string(),
        }
    }
}

/// Request-plane rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding-window budget per client per minute
    #[serde(rename = "requests-per-minute")]
    pub requests_per_minute: u32,

    /// Threshold for slow-request warnings, milliseconds
    #[serde(rename = "slow-threshold-ms")]
    pub slow_threshold_ms: u64,

    /// Per-endpoint budget overrides, path -> requests per minute
    #[serde(rename = "endpoint-limits")]
    pub endpoint_limits: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            slow_threshold_ms: 1000,
            endpoint_limits: HashMap::new(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the graph projection database
    #[serde(rename = "graph-db-path")]
    pub graph_db_path: PathBuf,

    /// Graph store operation timeout in milliseconds
    #[serde(rename = "graph-timeout-ms")]
    pub graph_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            graph_db_path: PathBuf::from(".graphstore/standards.db"),
            graph_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.preferred_order, vec!["anthropic", "openai"]);
        assert_eq!(config.batch.max_concurrent, 5);
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.sync.interval_secs, 3600);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  preferred-order: [openai]
  openai:
    api-key-env: MY_OPENAI_KEY
    base-url: https://api.example.com
  timeout-ms: 30000

cache:
  backend: redis
  max-size: 50

batch:
  max-concurrent: 2
  rate-limit-per-minute: 10

rate-limit:
  requests-per-minute: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.preferred_order, vec!["openai"]);
        assert_eq!(config.llm.openai.api_key_env, "MY_OPENAI_KEY");
        assert_eq!(config.llm.timeout_ms, 30000);
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.batch.max_concurrent, 2);
        assert_eq!(config.batch.rate_limit_per_minute, Some(10));
        assert_eq!(config.rate_limit.requests_per_minute, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
sync:
  interval-secs: 60
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.standards_dir, PathBuf::from("standards"));
        assert_eq!(config.llm.anthropic.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.batch.max_retries, 3);
    }

    #[test]
    fn test_validate_requires_provider_key() {
        let mut config = Config::default();
        config.llm.anthropic.api_key_env = "SD_TEST_MISSING_KEY_A".to_string();
        config.llm.openai.api_key_env = "SD_TEST_MISSING_KEY_B".to_string();

        let result = config.validate();
        assert!(result.is_err());
    }
}
