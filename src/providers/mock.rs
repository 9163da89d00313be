//! In-process adapter with no real upstream. Used in integration tests to
//! drive the router/retry/circuit-breaker machinery deterministically, and
//! as a safe default candidate in example configs.

use super::adapter::{Adapter, AdapterStream, ProviderKind};
use crate::error::AppError;
use crate::models::openai::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatMessage, ChunkChoice, Delta,
    MessageContent, Usage,
};
use async_trait::async_trait;
use std::time::Duration;

pub struct MockAdapter {
    name: String,
    /// When set, every call fails with this error — lets tests drive a
    /// candidate into the circuit breaker's open state on demand.
    fail_with: Option<String>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fail_with: None }
    }

    pub fn always_failing(name: impl Into<String>) -> Self {
        Self { name: name.into(), fail_with: Some("mock adapter configured to fail".to_string()) }
    }

    fn reply_text(request: &crate::models::openai::ChatCompletionRequest) -> String {
        let last_user_text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.extract_text())
            .unwrap_or_default();

        if last_user_text.trim().eq_ignore_ascii_case("ping") {
            "pong".to_string()
        } else {
            format!("echo: {last_user_text}")
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    async fn execute(
        &self,
        request: &crate::models::openai::ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<ChatCompletionResponse, AppError> {
        if let Some(reason) = &self.fail_with {
            return Err(AppError::UpstreamUnavailable(reason.clone()));
        }

        let text = Self::reply_text(request);
        let prompt_tokens: u64 = request.messages.iter().map(|m| m.content.extract_text().len() as u64 / 4).sum();
        let completion_tokens = text.len() as u64 / 4;

        Ok(ChatCompletionResponse {
            id: format!("mock-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: upstream_model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage { role: "assistant".to_string(), content: MessageContent::Text(text), tool_calls: None, name: None },
                finish_reason: Some("stop".to_string()),
                logprobs: None,
            }],
            usage: Some(Usage { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }),
        })
    }

    async fn execute_stream(
        &self,
        request: &crate::models::openai::ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<AdapterStream, AppError> {
        if let Some(reason) = &self.fail_with {
            return Err(AppError::UpstreamUnavailable(reason.clone()));
        }

        let text = Self::reply_text(request);
        let request_id = format!("mock-{}", uuid::Uuid::new_v4());
        let mut chunks = Vec::new();

        chunks.push(ChatCompletionChunk {
            id: request_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: upstream_model.to_string(),
            choices: vec![ChunkChoice { index: 0, delta: Delta { role: Some("assistant".to_string()), content: None, tool_calls: None }, finish_reason: None }],
            usage: None,
        });

        for word in text.split_inclusive(' ') {
            chunks.push(ChatCompletionChunk {
                id: request_id.clone(),
                object: "chat.completion.chunk".to_string(),
                created: chrono::Utc::now().timestamp() as u64,
                model: upstream_model.to_string(),
                choices: vec![ChunkChoice { index: 0, delta: Delta { role: None, content: Some(word.to_string()), tool_calls: None }, finish_reason: None }],
                usage: None,
            });
        }

        let completion_tokens = text.len() as u64 / 4;
        chunks.push(ChatCompletionChunk {
            id: request_id,
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: upstream_model.to_string(),
            choices: vec![ChunkChoice { index: 0, delta: Delta { role: None, content: None, tool_calls: None }, finish_reason: Some("stop".to_string()) }],
            usage: Some(Usage { prompt_tokens: 0, completion_tokens, total_tokens: completion_tokens }),
        });

        Ok(AdapterStream::Canonical(chunks))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.fail_with.is_some() {
            return Err(AppError::UpstreamUnavailable("mock adapter configured to fail".to_string()));
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}
