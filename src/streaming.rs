//! Upstream SSE bodies -> client-facing SSE, one function per
//! (upstream wire format, client wire format) pair actually exercised by the
//! handlers. Every builder returns a [`StreamUsage`] handle alongside the
//! `Sse` response so the caller can record token counts once the stream
//! finishes, without blocking the response on that bookkeeping.

use crate::{
    converters,
    models::{
        anthropic::StreamEvent,
        gemini::GenerateContentResponse,
        openai::{ChatCompletionChunk, Usage},
    },
};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Thread-safe accessor for the usage totals observed partway through a
/// streamed response. Set once, at most, by the stream's producer task;
/// read by whatever background job persists the usage record after the
/// client has been served. `wait_for_completion` lets that job block on the
/// stream reaching its terminal event instead of polling.
#[derive(Clone, Default)]
pub struct StreamUsage(Arc<Mutex<Option<Usage>>>, Arc<Notify>);

impl StreamUsage {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)), Arc::new(Notify::new()))
    }

    fn record(&self, usage: Usage) {
        *self.0.lock().unwrap() = Some(usage);
    }

    /// The usage observed so far, if the upstream has sent one yet.
    pub fn get(&self) -> Option<Usage> {
        *self.0.lock().unwrap()
    }

    fn notify_done(&self) {
        self.1.notify_waiters();
    }

    /// Waits for the stream to reach its terminal event, then returns
    /// whatever usage was observed. Times out after 10 minutes so a stream
    /// that never sends a terminal marker can't leak the waiting task.
    pub async fn wait_for_completion(&self) -> Option<Usage> {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(600), self.1.notified()).await;
        self.get()
    }
}

/// Forward an OpenAI-compatible upstream's SSE body to an OpenAI-shaped
/// client unchanged, skimming `usage` off the final chunk along the way.
pub fn create_openai_sse_stream(
    response: reqwest::Response,
) -> (Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamUsage) {
    let usage = StreamUsage::new();
    let usage_clone = usage.clone();

    let stream = response.bytes_stream().map(move |chunk_result| match chunk_result {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            for line in text.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    if data == "[DONE]" {
                        usage_clone.notify_done();
                        return Ok(Event::default().data("[DONE]"));
                    }
                    if let Some((prompt, completion)) = extract_usage_from_chunk(data) {
                        usage_clone.record(Usage {
                            prompt_tokens: prompt,
                            completion_tokens: completion,
                            total_tokens: prompt + completion,
                        });
                    }
                    return Ok(Event::default().data(data.to_string()));
                }
            }
            Ok(Event::default().data(""))
        }
        Err(e) => {
            tracing::error!("stream error: {}", e);
            Ok(Event::default().data(""))
        }
    });

    (Sse::new(stream).keep_alive(KeepAlive::default()), usage)
}

/// Parse usage information from a single `chat.completion.chunk` JSON body.
pub fn extract_usage_from_chunk(chunk_json: &str) -> Option<(u64, u64)> {
    let chunk = serde_json::from_str::<ChatCompletionChunk>(chunk_json).ok()?;
    let usage = chunk.usage?;
    Some((usage.prompt_tokens, usage.completion_tokens))
}

/// Anthropic upstream SSE -> OpenAI-shaped client chunks.
pub fn create_anthropic_sse_stream(
    response: reqwest::Response,
) -> (Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamUsage) {
    let request_id = uuid::Uuid::new_v4().to_string();
    let usage = StreamUsage::new();
    let usage_clone = usage.clone();

    let stream = response.bytes_stream().flat_map(move |chunk_result| {
        let request_id = request_id.clone();
        let usage = usage_clone.clone();

        futures::stream::iter(match chunk_result {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let mut events = Vec::new();

                for line in text.lines() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(anthropic_event) = serde_json::from_str::<StreamEvent>(data) {
                            if let Some(openai_chunk) =
                                converters::anthropic_response::convert_stream_event(&anthropic_event, &request_id)
                            {
                                if let Some(u) = &openai_chunk.usage {
                                    usage.record(*u);
                                }
                                if let Ok(json) = serde_json::to_string(&openai_chunk) {
                                    events.push(Ok(Event::default().data(json)));
                                }
                            }
                            if anthropic_event.event_type == "message_stop" {
                                events.push(Ok(Event::default().data("[DONE]")));
                                usage.notify_done();
                            }
                        }
                    }
                }
                events
            }
            Err(e) => {
                tracing::error!("anthropic stream error: {}", e);
                vec![Ok(Event::default().data(""))]
            }
        })
    });

    (Sse::new(stream).keep_alive(KeepAlive::default()), usage)
}

/// Gemini upstream SSE -> OpenAI-shaped client chunks.
pub fn create_gemini_sse_stream(
    response: reqwest::Response,
) -> (Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamUsage) {
    let request_id = uuid::Uuid::new_v4().to_string();
    let is_first_chunk = Arc::new(Mutex::new(true));
    let accumulated_text = Arc::new(Mutex::new(String::new()));
    let usage = StreamUsage::new();
    let usage_clone = usage.clone();

    let stream = response.bytes_stream().flat_map(move |chunk_result| {
        let request_id = request_id.clone();
        let is_first_chunk = is_first_chunk.clone();
        let accumulated_text = accumulated_text.clone();
        let usage = usage_clone.clone();

        futures::stream::iter(match chunk_result {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let mut events = Vec::new();

                for line in text.lines() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(gemini_chunk) = serde_json::from_str::<GenerateContentResponse>(data) {
                            let mut is_first = is_first_chunk.lock().unwrap();
                            let mut accumulated = accumulated_text.lock().unwrap();
                            match converters::gemini_streaming::convert_streaming_chunk(&gemini_chunk, &request_id, &mut is_first, &mut accumulated) {
                                Ok(Some(openai_chunk)) => {
                                    if let Some(u) = &openai_chunk.usage {
                                        usage.record(*u);
                                    }
                                    if let Ok(json) = serde_json::to_string(&openai_chunk) {
                                        events.push(Ok(Event::default().data(json)));
                                    }
                                    if openai_chunk.choices[0].finish_reason.is_some() {
                                        events.push(Ok(Event::default().data("[DONE]")));
                                        usage.notify_done();
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => tracing::error!("failed to convert gemini chunk: {}", e),
                            }
                        } else {
                            tracing::warn!("failed to parse gemini chunk: {}", data);
                        }
                    }
                }
                events
            }
            Err(e) => {
                tracing::error!("gemini stream error: {}", e);
                vec![Ok(Event::default().data(""))]
            }
        })
    });

    (Sse::new(stream).keep_alive(KeepAlive::default()), usage)
}

/// Forward a native Anthropic upstream's SSE events to an Anthropic-native
/// client unchanged, preserving the `event:` line the `/v1/messages` surface
/// expects.
pub fn create_native_anthropic_sse_stream(
    response: reqwest::Response,
) -> (Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamUsage) {
    let buffer = Arc::new(Mutex::new(String::new()));
    let usage = StreamUsage::new();
    let usage_clone = usage.clone();

    let stream = response.bytes_stream().flat_map(move |chunk_result| {
        let buffer = buffer.clone();
        let usage = usage_clone.clone();

        futures::stream::iter(match chunk_result {
            Ok(bytes) => {
                let chunk_text = String::from_utf8_lossy(&bytes).to_string();
                let mut events = Vec::new();

                let mut buf = buffer.lock().unwrap();
                buf.push_str(&chunk_text);

                while let Some(event_end) = buf.find("\n\n") {
                    let event_text = buf[..event_end].to_string();
                    *buf = buf[event_end + 2..].to_string();

                    let mut current_event_type: Option<String> = None;
                    let mut current_data_lines: Vec<String> = Vec::new();

                    for line in event_text.lines() {
                        if let Some(event_name) = line.strip_prefix("event: ") {
                            current_event_type = Some(event_name.trim().to_string());
                        } else if let Some(data) = line.strip_prefix("data: ") {
                            current_data_lines.push(data.to_string());
                        }
                    }

                    if !current_data_lines.is_empty() {
                        let data = current_data_lines.join("\n");
                        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&data) {
                            if let Some(u) = parsed.get("usage").or_else(|| parsed.get("message").and_then(|m| m.get("usage"))) {
                                if let (Some(input), Some(output)) = (
                                    u.get("input_tokens").and_then(|v| v.as_u64()),
                                    u.get("output_tokens").and_then(|v| v.as_u64()),
                                ) {
                                    usage.record(Usage {
                                        prompt_tokens: input,
                                        completion_tokens: output,
                                        total_tokens: input + output,
                                    });
                                }
                            }
                        }

                        let is_stop = current_event_type.as_deref() == Some("message_stop");
                        let mut event = Event::default().data(data);
                        if let Some(event_type) = current_event_type {
                            event = event.event(event_type);
                        }
                        events.push(Ok(event));
                        if is_stop {
                            usage.notify_done();
                        }
                    }
                }

                drop(buf);
                events
            }
            Err(e) => {
                tracing::error!("native anthropic stream error: {}", e);
                usage.notify_done();
                vec![]
            }
        })
    });

    (Sse::new(stream).keep_alive(KeepAlive::default()), usage)
}

/// Forward a native Gemini upstream's SSE body to a Gemini-native client
/// unchanged (no shape conversion — only re-framed as SSE `data:` lines).
pub fn create_native_gemini_sse_stream(
    response: reqwest::Response,
) -> (Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamUsage) {
    let usage = StreamUsage::new();
    let usage_clone = usage.clone();

    let stream = response.bytes_stream().flat_map(move |chunk_result| {
        let usage = usage_clone.clone();

        futures::stream::iter(match chunk_result {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let mut events = Vec::new();

                for line in text.lines() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(gemini_chunk) = serde_json::from_str::<GenerateContentResponse>(data) {
                            if let Some(u) = &gemini_chunk.usage_metadata {
                                usage.record(Usage {
                                    prompt_tokens: u.prompt_token_count,
                                    completion_tokens: u.candidates_token_count,
                                    total_tokens: u.total_token_count,
                                });
                            }
                            if gemini_chunk.candidates.iter().any(|c| c.finish_reason.is_some()) {
                                usage.notify_done();
                            }
                        }
                        events.push(Ok(Event::default().data(data.to_string())));
                    }
                }
                events
            }
            Err(e) => {
                tracing::error!("native gemini stream error: {}", e);
                usage.notify_done();
                vec![]
            }
        })
    });

    (Sse::new(stream).keep_alive(KeepAlive::default()), usage)
}

/// Replay already-canonical OpenAI chunks (built in-process by the mock
/// adapter, which has no real upstream SSE body to frame) as client-facing
/// SSE events.
pub fn create_canonical_sse_stream(
    chunks: Vec<ChatCompletionChunk>,
) -> (Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamUsage) {
    let usage = StreamUsage::new();
    let usage_clone = usage.clone();

    let events: Vec<Result<Event, Infallible>> = chunks
        .into_iter()
        .flat_map(|chunk| {
            if let Some(u) = &chunk.usage {
                usage_clone.record(*u);
            }
            let is_final = chunk.choices.iter().any(|c| c.finish_reason.is_some());
            let json = serde_json::to_string(&chunk).unwrap_or_default();
            let mut out = vec![Ok(Event::default().data(json))];
            if is_final {
                usage_clone.notify_done();
                out.push(Ok(Event::default().data("[DONE]")));
            }
            out
        })
        .collect();

    (Sse::new(futures::stream::iter(events)).keep_alive(KeepAlive::default()), usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::{ChatCompletionChunk, ChunkChoice, Delta, Usage as OpenAiUsage};

    #[test]
    fn test_extract_usage_from_chunk() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-123".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1677652288,
            model: "gpt-4".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { role: None, content: None, tool_calls: None },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(OpenAiUsage { prompt_tokens: 10, completion_tokens: 20, total_tokens: 30 }),
        };

        let json = serde_json::to_string(&chunk).unwrap();
        let (input, output) = extract_usage_from_chunk(&json).unwrap();
        assert_eq!(input, 10);
        assert_eq!(output, 20);
    }

    #[test]
    fn test_extract_usage_from_chunk_without_usage() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-123".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1677652288,
            model: "gpt-4".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { role: Some("assistant".to_string()), content: Some("Hello".to_string()), tool_calls: None },
                finish_reason: None,
            }],
            usage: None,
        };

        let json = serde_json::to_string(&chunk).unwrap();
        assert!(extract_usage_from_chunk(&json).is_none());
    }

    #[test]
    fn test_stream_usage_starts_empty() {
        let usage = StreamUsage::new();
        assert!(usage.get().is_none());
    }

    #[test]
    fn test_stream_usage_records_and_reads() {
        let usage = StreamUsage::new();
        usage.record(OpenAiUsage { prompt_tokens: 1, completion_tokens: 2, total_tokens: 3 });
        assert_eq!(usage.get().unwrap().total_tokens, 3);
    }
}
