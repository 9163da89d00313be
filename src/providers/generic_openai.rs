//! Adapter for any upstream that already speaks the OpenAI chat-completions
//! wire format verbatim (OpenAI itself, Azure-compatible gateways, Ollama's
//! `/v1` shim, vLLM, etc). No request/response translation is needed — only
//! the model name is substituted and the bearer token attached.

use super::adapter::{classify_upstream_status, Adapter, AdapterStream, ProviderKind};
use crate::config::GenericProviderInstanceConfig;
use crate::error::AppError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use std::time::Duration;

pub struct GenericOpenAiAdapter {
    name: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl GenericOpenAiAdapter {
    pub fn new(cfg: &GenericProviderInstanceConfig, http: reqwest::Client) -> Self {
        Self {
            name: cfg.name.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
            http,
        }
    }

    fn with_model(request: &ChatCompletionRequest, upstream_model: &str, stream: Option<bool>) -> ChatCompletionRequest {
        let mut req = request.clone();
        req.model = upstream_model.to_string();
        req.stream = stream;
        req
    }
}

#[async_trait]
impl Adapter for GenericOpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    async fn execute(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<ChatCompletionResponse, AppError> {
        let body = Self::with_model(request, upstream_model, Some(false));

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        resp.json::<ChatCompletionResponse>()
            .await
            .map_err(|e| AppError::ConversionError(format!("malformed upstream response: {e}")))
    }

    async fn execute_stream(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<AdapterStream, AppError> {
        let body = Self::with_model(request, upstream_model, Some(true));

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
        let resp = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
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
