//! Top-level orchestrator: resolves candidates, runs the failover loop,
//! and turns the resulting [`AttemptEvent`](crate::retry::AttemptEvent)
//! sequence into trace events and a usage record. Everything below
//! `/v1/chat/completions` and its sibling surfaces goes through here; the
//! handlers themselves only translate wire formats at the edges.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::Config;
use crate::error::AppError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse, Usage};
use crate::observability::trace_store::{TraceEvent, TraceStore};
use crate::observability::usage_sink::{UsageRecord, UsageSink};
use crate::providers::adapter::{Adapter, AdapterStream};
use crate::registry::AdapterRegistry;
use crate::retry::{execute_stream_with_failover, execute_with_failover, AttemptEvent};
use crate::router;
use std::sync::Arc;
use std::time::Instant;

pub struct Gateway {
    registry: Arc<AdapterRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    traces: Arc<TraceStore>,
    usage: Arc<UsageSink>,
}

/// Per-request identifiers threaded through routing, retries, and the
/// trace/usage records so every row produced by one call can be joined
/// back together.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub tenant: String,
}

impl Gateway {
    pub fn new(registry: Arc<AdapterRegistry>, breakers: Arc<CircuitBreakerRegistry>, traces: Arc<TraceStore>, usage: Arc<UsageSink>) -> Self {
        Self { registry, breakers, traces, usage }
    }

    pub async fn dispatch(
        &self,
        config: &Config,
        ctx: &RequestContext,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AppError> {
        let started = Instant::now();
        self.traces.record(TraceEvent::routing_start(&ctx.request_id, &request.model));

        let candidates = router::resolve(config, &self.registry, &self.breakers, &request.model)?;

        let outcome = execute_with_failover(&self.registry, &self.breakers, &candidates, request).await;
        self.emit_attempt_events(&ctx.request_id, &outcome.events);
        let elapsed = started.elapsed();
        self.traces.record(TraceEvent::request_end(&ctx.request_id, outcome.result.is_ok(), elapsed));

        let usage = outcome.result.as_ref().ok().map(|r| r.usage.clone());
        self.record_usage(ctx, &request.model, &outcome.events, usage, elapsed.as_millis() as u64, outcome.result.is_ok());

        outcome.result
    }

    /// Same routing and failover semantics as [`Gateway::dispatch`], but
    /// returns the adapter alongside the still-unconsumed stream so the
    /// handler can pick the matching wire-format converter from
    /// `streaming.rs` based on the adapter's [`ProviderKind`]. Token usage
    /// for a streamed response is not known until the stream has been fully
    /// consumed, so no [`UsageRecord`] is emitted here — the handler records
    /// one itself once it has accumulated the final usage from the stream.
    pub async fn dispatch_stream(
        &self,
        config: &Config,
        ctx: &RequestContext,
        request: &ChatCompletionRequest,
    ) -> Result<(Arc<dyn Adapter>, AdapterStream), AppError> {
        let started = Instant::now();
        self.traces.record(TraceEvent::routing_start(&ctx.request_id, &request.model));

        let candidates = router::resolve(config, &self.registry, &self.breakers, &request.model)?;

        let outcome = execute_stream_with_failover(&self.registry, &self.breakers, &candidates, request).await;
        self.emit_attempt_events(&ctx.request_id, &outcome.events);
        self.traces.record(TraceEvent::request_end(&ctx.request_id, outcome.result.is_ok(), started.elapsed()));

        outcome.result
    }

    /// Record a [`UsageRecord`] for a stream once the handler has
    /// accumulated final token counts from the upstream's trailing chunk.
    pub fn record_stream_usage(&self, ctx: &RequestContext, model: &str, provider: &str, usage: Usage, latency_ms: u64, success: bool) {
        self.usage.record(UsageRecord {
            request_id: ctx.request_id.clone(),
            tenant: ctx.tenant.clone(),
            provider: provider.to_string(),
            model: model.to_string(),
            usage,
            latency_ms,
            attempts: 1,
            success,
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_attempt_events(&self, request_id: &str, events: &[AttemptEvent]) {
        for event in events {
            self.traces.record(TraceEvent::from_attempt(request_id, event));
        }
    }

    fn record_usage(&self, ctx: &RequestContext, model: &str, events: &[AttemptEvent], usage: Option<Usage>, latency_ms: u64, success: bool) {
        let attempts = events.iter().filter(|e| matches!(e, AttemptEvent::Started { .. })).count() as u32;
        let provider = events
            .iter()
            .rev()
            .find_map(|e| match e {
                AttemptEvent::Succeeded { provider, .. } => Some(provider.clone()),
                AttemptEvent::Failed { provider, .. } => Some(provider.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "none".to_string());

        self.usage.record(UsageRecord {
            request_id: ctx.request_id.clone(),
            tenant: ctx.tenant.clone(),
            provider,
            model: model.to_string(),
            usage: usage.unwrap_or_default(),
            latency_ms,
            attempts,
            success,
            timestamp: chrono::Utc::now(),
        });
    }
}
