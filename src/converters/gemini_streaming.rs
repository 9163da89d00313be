//! Incremental conversion of Gemini `streamGenerateContent` chunks into
//! OpenAI `chat.completion.chunk` frames.
//!
//! Gemini's `:streamGenerateContent` resends the full candidate text
//! accumulated so far in every chunk, not just the new increment. We track
//! what has already been emitted and emit only `newContent - accumulated`
//! as `delta.content`, per the OpenAI streaming contract; `is_first` tracks
//! whether the `assistant` role header has already been emitted.

use crate::{
    error::AppError,
    models::{
        gemini::GenerateContentResponse,
        openai::{ChatCompletionChunk, ChunkChoice, Delta, Usage},
    },
};

pub fn convert_streaming_chunk(
    chunk: &GenerateContentResponse,
    request_id: &str,
    is_first: &mut bool,
    accumulated: &mut String,
) -> Result<Option<ChatCompletionChunk>, AppError> {
    let Some(candidate) = chunk.candidates.first() else {
        return Ok(None);
    };

    let full_text: String = candidate
        .content
        .parts
        .iter()
        .filter_map(|part| match part {
            crate::models::gemini::Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    let text = full_text.strip_prefix(accumulated.as_str()).unwrap_or(&full_text).to_string();
    if !full_text.is_empty() {
        *accumulated = full_text;
    }

    let finish_reason = candidate.finish_reason.as_ref().map(|reason| match reason.as_str() {
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        "SAFETY" | "RECITATION" => "content_filter".to_string(),
        "OTHER" | "" => "stop".to_string(),
        other => other.to_lowercase(),
    });

    if text.is_empty() && finish_reason.is_none() {
        return Ok(None);
    }

    let role = if *is_first {
        *is_first = false;
        Some("assistant".to_string())
    } else {
        None
    };

    let usage = chunk.usage_metadata.as_ref().map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(Some(ChatCompletionChunk {
        id: request_id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: chrono::Utc::now().timestamp() as u64,
        model: chunk.model_version.clone().unwrap_or_default(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role,
                content: if text.is_empty() { None } else { Some(text) },
                tool_calls: None,
            },
            finish_reason,
        }],
        usage,
    }))
}
