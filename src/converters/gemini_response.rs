use crate::{
    error::AppError,
    models::{
        gemini::{GenerateContentResponse, Part},
        openai::{
            ChatChoice, ChatCompletionResponse, ChatMessage, FunctionCall, MessageContent,
            ToolCall, Usage,
        },
    },
};

/// Convert Gemini GenerateContentResponse to OpenAI ChatCompletionResponse
pub fn convert_response(
    gemini_resp: &GenerateContentResponse,
) -> Result<ChatCompletionResponse, AppError> {
    // Get first candidate
    let candidate = gemini_resp
        .candidates
        .first()
        .ok_or_else(|| {
            tracing::error!(
                "Gemini returned empty candidates. Response: {:?}",
                gemini_resp
            );
            AppError::ConversionError("No candidates in Gemini response".to_string())
        })?;

    // Extract text and tool calls from parts
    let content = extract_text_from_parts(&candidate.content.parts);
    let tool_calls = extract_tool_calls_from_parts(&candidate.content.parts);

    // Map finish reason
    let finish_reason = candidate.finish_reason.as_ref().map(|reason| {
        // Gemini uses STOP, SAFETY, etc. Map to OpenAI equivalents
        match reason.as_str() {
            "STOP" => "stop".to_string(),
            "MAX_TOKENS" => "length".to_string(),
            "SAFETY" => "content_filter".to_string(),
            other => other.to_lowercase(),
        }
    });

    // Convert usage metadata
    let usage = gemini_resp.usage_metadata.as_ref().map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp() as u64,
        model: gemini_resp
            .model_version
            .clone()
            .unwrap_or_else(|| "gemini".to_string()),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: MessageContent::Text(content),
                name: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            },
            finish_reason,
            logprobs: None, // Gemini doesn't provide log probabilities
        }],
        usage,
    })
}

/// Extract text from Gemini Parts (handling the Part enum)
fn extract_text_from_parts(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|part| {
            if let Part::Text { text } = part {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Extract tool calls from Gemini Parts
fn extract_tool_calls_from_parts(parts: &[Part]) -> Vec<ToolCall> {
    parts
        .iter()
        .filter_map(|part| {
            if let Part::FunctionCall { function_call } = part {
                Some(ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4()),
                    tool_type: "function".to_string(),
                    function: FunctionCall {
                        name: function_call.name.clone(),
                        arguments: serde_json::to_string(&function_call.args)
                            .unwrap_or_else(|_| "{}".to_string()),
                    },
                })
            } else {
                None
            }
        })
        .collect()
}
