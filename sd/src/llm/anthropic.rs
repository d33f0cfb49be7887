//! Anthropic Claude API provider
//!
//! Implements the LlmProvider trait for Anthropic's Messages API with
//! support for both blocking and streaming responses.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::provider::{ChunkStream, LlmProvider, ProviderHealth};
use super::{LlmError, LlmRequest, LlmResponse, ModelTier, ProviderKind, TokenUsage};
use crate::config::ProviderSettings;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_FAST_MODEL: &str = "claude-3-5-haiku-20241022";
const DEFAULT_BALANCED_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_ADVANCED_MODEL: &str = "claude-opus-4-20250514";

/// Fallback max_tokens when the request does not set one
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Claude API provider
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    http: Client,
    models: TierModelSet,
    max_tokens: u32,
    health: ProviderHealth,
}

struct TierModelSet {
    fast: String,
    balanced: String,
    advanced: String,
}

impl AnthropicProvider {
    /// Create a provider from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &ProviderSettings, timeout: Duration, max_tokens: u32) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            http,
            models: TierModelSet {
                fast: config.models.fast.clone().unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
                balanced: config
                    .models
                    .balanced
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BALANCED_MODEL.to_string()),
                advanced: config
                    .models
                    .advanced
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ADVANCED_MODEL.to_string()),
            },
            max_tokens: if max_tokens == 0 { DEFAULT_MAX_TOKENS } else { max_tokens },
            health: ProviderHealth::new(),
        })
    }

    fn build_request_body(&self, request: &LlmRequest, model: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        });

        if let Some(ref system_prompt) = request.system_prompt {
            body["system"] = serde_json::json!(system_prompt);
        }
        if !request.stop_sequences.is_empty() {
            body["stop_sequences"] = serde_json::json!(request.stop_sequences);
        }

        body
    }

    fn request_builder(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    fn parse_response(&self, api_response: MessagesResponse, model: &str) -> LlmResponse {
        let content = api_response
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let mut response = LlmResponse::new(
            content,
            ProviderKind::Anthropic,
            model,
            TokenUsage::new(api_response.usage.input_tokens, api_response.usage.output_tokens),
        );
        if let Some(stop_reason) = api_response.stop_reason {
            response
                .metadata
                .insert("stop_reason".to_string(), serde_json::json!(stop_reason));
        }
        response
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn health(&self) -> &ProviderHealth {
        &self.health
    }

    fn model_for_tier(&self, tier: ModelTier) -> String {
        match tier {
            ModelTier::Fast => self.models.fast.clone(),
            ModelTier::Balanced => self.models.balanced.clone(),
            ModelTier::Advanced => self.models.advanced.clone(),
        }
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for_tier(request.model_tier);
        let body = self.build_request_body(request, &model);

        debug!(%model, "anthropic generate");
        let response = self.request_builder(&body).send().await?;

        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        let api_response: MessagesResponse = response.json().await?;
        Ok(self.parse_response(api_response, &model))
    }

    async fn stream_generate(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let model = self.model_for_tier(request.model_tier);
        let mut body = self.build_request_body(request, &model);
        body["stream"] = serde_json::json!(true);

        let mut es = EventSource::new(self.request_builder(&body)).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => {
                        let data: serde_json::Value = match serde_json::from_str(&msg.data) {
                            Ok(data) => data,
                            Err(e) => {
                                let _ = tx.send(Err(LlmError::Json(e))).await;
                                break;
                            }
                        };
                        match data["type"].as_str() {
                            Some("content_block_delta") => {
                                if let Some(text) = data["delta"]["text"].as_str()
                                    && !text.is_empty()
                                    && tx.send(Ok(text.to_string())).await.is_err()
                                {
                                    break;
                                }
                            }
                            Some("message_stop") => break,
                            Some("error") => {
                                let message = data["error"]["message"].as_str().unwrap_or("stream error").to_string();
                                let _ = tx.send(Err(LlmError::InvalidResponse(message))).await;
                                break;
                            }
                            _ => {}
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::InvalidResponse(e.to_string()))).await;
                        break;
                    }
                }
            }
            es.close();
        });

        Ok(rx)
    }
}
