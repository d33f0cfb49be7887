//! OpenAI API provider
//!
//! Implements the LlmProvider trait for OpenAI's Chat Completions API with
//! support for both blocking and streaming responses.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::provider::{ChunkStream, LlmProvider, ProviderHealth};
use super::{LlmError, LlmRequest, LlmResponse, ModelTier, ProviderKind, TokenUsage};
use crate::config::ProviderSettings;

const DEFAULT_FAST_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BALANCED_MODEL: &str = "gpt-4o";
const DEFAULT_ADVANCED_MODEL: &str = "o1";

/// OpenAI API provider
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    http: Client,
    fast: String,
    balanced: String,
    advanced: String,
    max_tokens: u32,
    health: ProviderHealth,
}

impl OpenAiProvider {
    /// Create a provider from configuration
    pub fn from_config(config: &ProviderSettings, timeout: Duration, max_tokens: u32) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            http,
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
            max_tokens,
            health: ProviderHealth::new(),
        })
    }

    fn build_request_body(&self, request: &LlmRequest, model: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(ref system_prompt) = request.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system_prompt }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
        });

        // Reasoning models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("o3");
        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop_sequences.is_empty() {
            body["stop"] = serde_json::json!(request.stop_sequences);
        }

        body
    }

    fn request_builder(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn health(&self) -> &ProviderHealth {
        &self.health
    }

    fn model_for_tier(&self, tier: ModelTier) -> String {
        match tier {
            ModelTier::Fast => self.fast.clone(),
            ModelTier::Balanced => self.balanced.clone(),
            ModelTier::Advanced => self.advanced.clone(),
        }
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for_tier(request.model_tier);
        let body = self.build_request_body(request, &model);

        debug!(%model, "openai generate");
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

        let api_response: ChatResponse = response.json().await?;
        let choice = api_response
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let usage = api_response
            .usage
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let mut llm_response = LlmResponse::new(
            choice.message.content.clone().unwrap_or_default(),
            ProviderKind::OpenAi,
            &model,
            usage,
        );
        if let Some(ref finish_reason) = choice.finish_reason {
            llm_response
                .metadata
                .insert("finish_reason".to_string(), serde_json::json!(finish_reason));
        }
        Ok(llm_response)
    }

    async fn stream_generate(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let model = self.model_for_tier(request.model_tier);
        let mut body = self.build_request_body(request, &model);
        body["stream"] = serde_json::json!(true);

        let response = self.request_builder(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            'outer: while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Network(e))).await;
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited "data: {json}" lines
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        break 'outer;
                    }

                    let parsed: serde_json::Value = match serde_json::from_str(data) {
                        Ok(parsed) => parsed,
                        Err(_) => continue,
                    };
                    if let Some(text) = parsed["choices"][0]["delta"]["content"].as_str()
                        && !text.is_empty()
                        && tx.send(Ok(text.to_string())).await.is_err()
                    {
                        break 'outer;
                    }
                }
            }
        });

        Ok(rx)
    }
}
