//! LLM request/response types
//!
//! Provider-agnostic shapes shared by the manager, the batch dispatcher, and
//! the workflow orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    /// Self-hosted backend; no bundled implementation
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "local" => Ok(ProviderKind::Local),
            other => Err(format!("unknown provider: '{other}'")),
        }
    }
}

/// Model performance tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast, cheap models for simple tasks
    Fast,
    /// Balance of capability and cost
    #[default]
    Balanced,
    /// Most capable models for complex tasks
    Advanced,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Balanced => "balanced",
            ModelTier::Advanced => "advanced",
        }
    }
}

/// A single generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Vec<String>,
    pub model_tier: ModelTier,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: None,
            stop_sequences: Vec::new(),
            model_tier: ModelTier::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting for cost tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A completed generation
///
/// An empty `content` is a successful response, not an error; providers
/// occasionally return nothing for degenerate prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub provider: ProviderKind,
    pub model: String,
    pub usage: TokenUsage,
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>, provider: ProviderKind, model: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            provider,
            model: model.into(),
            usage,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("hello")
            .with_system_prompt("be brief")
            .with_tier(ModelTier::Fast)
            .with_temperature(0.1)
            .with_max_tokens(64);

        assert_eq!(request.prompt, "hello");
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(request.model_tier, ModelTier::Fast);
        assert_eq!(request.max_tokens, Some(64));
    }

    #[test]
    fn test_default_tier_is_balanced() {
        assert_eq!(LlmRequest::new("x").model_tier, ModelTier::Balanced);
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_response_serde_roundtrip() {
        let response = LlmResponse::new("ok", ProviderKind::Anthropic, "model-x", TokenUsage::new(1, 2));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["provider"], "anthropic");

        let back: LlmResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.content, "ok");
        assert_eq!(back.usage.total_tokens, 3);
    }
}
