//! Adapter for Anthropic's native Messages API. Converts the canonical
//! OpenAI-shaped request on the way in and the native response back on the
//! way out, via the shared [`converters`] module — the same conversion the
//! `/v1/chat/completions` surface uses, and the one the native `/v1/messages`
//! surface skips entirely because it talks to this adapter's wire format
//! directly.

use super::adapter::{classify_upstream_status, Adapter, AdapterStream, ProviderKind};
use crate::config::AnthropicInstanceConfig;
use crate::converters::{anthropic_response, openai_to_anthropic};
use crate::error::AppError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use std::time::Duration;

pub struct AnthropicAdapter {
    name: String,
    base_url: String,
    api_key: String,
    api_version: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(cfg: &AnthropicInstanceConfig, http: reqwest::Client) -> Self {
        Self {
            name: cfg.name.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            api_version: cfg.api_version.clone(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
            http,
        }
    }

    async fn build_body(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
        stream: bool,
    ) -> Result<crate::models::anthropic::MessagesRequest, AppError> {
        let (mut anthropic_req, warnings) = openai_to_anthropic::convert_request(request).await?;
        anthropic_req.model = upstream_model.to_string();
        anthropic_req.stream = Some(stream);
        if !warnings.is_empty() {
            tracing::debug!(provider = %self.name, warnings = ?warnings.as_slice(), "conversion warnings");
        }
        Ok(anthropic_req)
    }
}

#[async_trait]
impl Adapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn execute(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<ChatCompletionResponse, AppError> {
        let body = self.build_body(request, upstream_model, false).await?;

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout(self.name.clone())
                } else {
                    AppError::UpstreamUnavailable(format!("{}: {e}", self.name))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_upstream_status(status, text));
        }

        let anthropic_resp = resp
            .json::<crate::models::anthropic::MessagesResponse>()
            .await
            .map_err(|e| AppError::ConversionError(format!("malformed upstream response: {e}")))?;

        anthropic_response::convert_response(&anthropic_resp)
    }

    async fn execute_stream(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<AdapterStream, AppError> {
        let body = self.build_body(request, upstream_model, true).await?;

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout(self.name.clone())
                } else {
                    AppError::UpstreamUnavailable(format!("{}: {e}", self.name))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_upstream_status(status, text));
        }

        Ok(AdapterStream::Upstream(resp))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        // Anthropic has no unauthenticated ping endpoint; a minimal
        // one-token completion is the cheapest real liveness probe.
        let probe = crate::models::anthropic::MessagesRequest {
            model: "claude-3-haiku-20240307".to_string(),
            system: None,
            messages: vec![crate::models::anthropic::Message {
                role: "user".to_string(),
                content: crate::models::anthropic::MessageContent::Text("hi".to_string()),
            }],
            max_tokens: 1,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: Some(false),
            tools: None,
            tool_choice: None,
            thinking: None,
            metadata: None,
        };

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .timeout(Duration::from_secs(5))
            .json(&probe)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("{}: {e}", self.name)))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AppError::UpstreamUnavailable(format!("{} health check returned {}", self.name, resp.status())))
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
