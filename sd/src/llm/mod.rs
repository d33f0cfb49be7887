//! Provider-abstracted LLM layer
//!
//! Unified request/response types, per-provider health tracking, and a
//! fan-out/fallback manager over the configured providers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

mod anthropic;
mod error;
mod manager;
mod openai;
pub mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use error::LlmError;
pub use manager::{ProviderManager, ProviderStatus};
pub use openai::OpenAiProvider;
pub use provider::{ChunkStream, LlmProvider, ProviderHealth, TRIP_THRESHOLD};
pub use types::{LlmRequest, LlmResponse, ModelTier, ProviderKind, TokenUsage};

use crate::config::LlmConfig;

/// Build the provider manager from configuration
///
/// Providers whose API key is absent are left unregistered with a warning;
/// at least one must initialize.
pub fn create_manager(config: &LlmConfig) -> Result<ProviderManager, LlmError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let preferred_order: Vec<ProviderKind> = config
        .preferred_order
        .iter()
        .filter_map(|name| match name.parse::<ProviderKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!(provider = %name, error = %e, "Ignoring unknown provider in preferred order");
                None
            }
        })
        .collect();

    let mut manager = ProviderManager::new(preferred_order);

    if config.anthropic.enabled {
        match AnthropicProvider::from_config(&config.anthropic, timeout, config.max_tokens) {
            Ok(provider) => manager.register_provider(Arc::new(provider)),
            Err(e) => warn!(error = %e, "Anthropic provider not registered"),
        }
    }
    if config.openai.enabled {
        match OpenAiProvider::from_config(&config.openai, timeout, config.max_tokens) {
            Ok(provider) => manager.register_provider(Arc::new(provider)),
            Err(e) => warn!(error = %e, "OpenAI provider not registered"),
        }
    }

    if manager.provider_count() == 0 {
        return Err(LlmError::InvalidResponse(
            "no LLM provider could be initialized; check API key environment variables".to_string(),
        ));
    }

    info!(providers = manager.provider_count(), "LLM provider manager ready");
    Ok(manager)
}

/// Pull a JSON value out of model output
///
/// Models wrap JSON in fences or prose; try the raw text, then fenced
/// blocks, then the outermost brace span. Returns None when nothing parses.
pub fn extract_json(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // ```json ... ``` or plain ``` ... ```
    if let Some(open) = trimmed.find("```") {
        let after = &trimmed[open + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(close) = after.find("```")
            && let Ok(value) = serde_json::from_str(after[..close].trim())
        {
            return Some(value);
        }
    }

    // Outermost object span
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        serde_json::from_str(trimmed[start..=end].trim()).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let value = extract_json("{\"a\": 1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_fenced() {
        let content = "Here you go:\n```json\n{\"a\": 1}\n```\nanything else";
        let value = extract_json(content).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_embedded() {
        let content = "The result is {\"score\": 85, \"issues\": []} as requested.";
        let value = extract_json(content).unwrap();
        assert_eq!(value["score"], 85);
    }

    #[test]
    fn test_extract_json_none() {
        assert!(extract_json("no json here at all").is_none());
    }
}
