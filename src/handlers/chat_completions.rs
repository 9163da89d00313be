//! `/v1/chat/completions` — the gateway's canonical OpenAI-shaped surface.
//! Every request is already in the wire format `Gateway::dispatch` expects,
//! so this handler's only job is picking the right stream-framing function
//! for whichever adapter the router and failover loop settled on.

use crate::auth::Principal;
use crate::error::AppError;
use crate::gateway::RequestContext;
use crate::handlers::AppState;
use crate::middleware::RequestContext as HttpRequestContext;
use crate::models::openai::ChatCompletionRequest;
use crate::providers::adapter::{AdapterStream, ProviderKind};
use crate::streaming;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::time::Instant;

pub async fn handle_chat_completions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(http_ctx): Extension<HttpRequestContext>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    let config = state.config.load_full();
    let gateway = state.gateway.load_full();
    let ctx = RequestContext { request_id: http_ctx.request_id.clone(), tenant: principal.key_name.clone() };

    if request.stream.unwrap_or(false) {
        let started = Instant::now();
        let (adapter, stream) = gateway.dispatch_stream(&config, &ctx, &request).await?;

        let (sse, usage) = match (adapter.kind(), stream) {
            (ProviderKind::OpenAiCompatible, AdapterStream::Upstream(resp)) => streaming::create_openai_sse_stream(resp),
            (ProviderKind::Anthropic, AdapterStream::Upstream(resp)) => streaming::create_anthropic_sse_stream(resp),
            (ProviderKind::Gemini, AdapterStream::Upstream(resp)) => streaming::create_gemini_sse_stream(resp),
            (_, AdapterStream::Canonical(chunks)) => streaming::create_canonical_sse_stream(chunks),
            (ProviderKind::Mock, AdapterStream::Upstream(_)) => {
                return Err(AppError::Internal("mock adapter produced an upstream stream".to_string()));
            }
        };

        let provider = adapter.name().to_string();
        let model = request.model.clone();
        let gateway_for_usage = gateway.clone();
        tokio::spawn(async move {
            let observed = usage.wait_for_completion().await.unwrap_or_default();
            gateway_for_usage.record_stream_usage(&ctx, &model, &provider, observed, started.elapsed().as_millis() as u64, true);
        });

        Ok(sse.into_response())
    } else {
        let response = gateway.dispatch(&config, &ctx, &request).await?;
        Ok(Json(response).into_response())
    }
}
