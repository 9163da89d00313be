//! Adapter for Google's Gemini `generateContent`/`streamGenerateContent`
//! API. Unlike Anthropic and the OpenAI-compatible family, Gemini carries
//! the model name and the streaming choice in the URL path rather than the
//! request body, so those are threaded through at call time instead of
//! mutated into a cloned request.

use super::adapter::{classify_upstream_status, Adapter, AdapterStream, ProviderKind};
use crate::config::GenericProviderInstanceConfig;
use crate::converters::{gemini_response, openai_to_gemini};
use crate::error::AppError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use std::time::Duration;

pub struct GeminiAdapter {
    name: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(cfg: &GenericProviderInstanceConfig, http: reqwest::Client) -> Self {
        Self {
            name: cfg.name.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
            http,
        }
    }

    async fn build_body(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<crate::models::gemini::GenerateContentRequest, AppError> {
        let (gemini_req, warnings) = openai_to_gemini::convert_request(request).await?;
        if !warnings.is_empty() {
            tracing::debug!(provider = %self.name, warnings = ?warnings.as_slice(), "conversion warnings");
        }
        Ok(gemini_req)
    }
}

#[async_trait]
impl Adapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn execute(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<ChatCompletionResponse, AppError> {
        let body = self.build_body(request).await?;

        let resp = self
            .http
            .post(format!("{}/v1beta/models/{upstream_model}:generateContent", self.base_url))
            .query(&[("key", &self.api_key)])
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

        let gemini_resp = resp
            .json::<crate::models::gemini::GenerateContentResponse>()
            .await
            .map_err(|e| AppError::ConversionError(format!("malformed upstream response: {e}")))?;

        gemini_response::convert_response(&gemini_resp)
    }

    async fn execute_stream(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<AdapterStream, AppError> {
        let body = self.build_body(request).await?;

        let resp = self
            .http
            .post(format!("{}/v1beta/models/{upstream_model}:streamGenerateContent", self.base_url))
            .query(&[("key", &self.api_key), ("alt", &"sse".to_string())])
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
            .get(format!("{}/v1beta/models", self.base_url))
            .query(&[("key", &self.api_key)])
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
