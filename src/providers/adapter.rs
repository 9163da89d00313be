//! The one seam every upstream integration sits behind. A [`Candidate`]
//! names a provider instance plus the upstream model to request; the
//! router resolves a model name to an ordered list of candidates and the
//! retry loop calls [`Adapter::execute`]/[`Adapter::execute_stream`] on each
//! in turn until one succeeds or the budget is exhausted.
//!
//! Every adapter speaks the gateway's canonical, OpenAI-shaped request and
//! response types. `/v1/chat/completions` hands candidates its request
//! directly; the two other native surfaces (`/v1/messages`, `/v1beta/models`)
//! only ever route to same-protocol candidates and convert at the edge, so
//! they never need an adapter to round-trip a foreign wire format back to
//! their own shape.

use crate::error::AppError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use std::time::Duration;

/// A streaming response from an adapter, not yet translated into any
/// particular client-facing wire format.
pub enum AdapterStream {
    /// The raw HTTP response from a real upstream, still in that upstream's
    /// native SSE encoding. The caller picks the right converter in
    /// `streaming.rs` based on which [`ProviderKind`] produced it.
    Upstream(reqwest::Response),
    /// Already-canonical OpenAI chunks, built in-process (used by the mock
    /// adapter, which has no real upstream wire format to preserve).
    Canonical(Vec<crate::models::openai::ChatCompletionChunk>),
}

/// Which wire family a provider instance natively speaks. Determines which
/// `streaming.rs` converter applies to its `AdapterStream::Upstream` bodies,
/// and which native-format client surfaces may route to it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAiCompatible,
    Anthropic,
    Gemini,
    Mock,
}

/// One upstream provider instance, addressable by name from the routing
/// table and from the circuit breaker registry.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable identity used as the circuit breaker key and in trace events.
    /// Distinct from the provider type — two `openai_compatible` instances
    /// (e.g. two regions) have different names but the same `kind()`.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Non-streaming dispatch. `upstream_model` overrides `request.model`
    /// with the candidate's configured upstream model name.
    async fn execute(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<ChatCompletionResponse, AppError>;

    async fn execute_stream(
        &self,
        request: &ChatCompletionRequest,
        upstream_model: &str,
    ) -> Result<AdapterStream, AppError>;

    /// Lightweight liveness probe used by the background health checker.
    /// Independent of the circuit breaker: a provider can be reachable
    /// (`health_check` passes) while its breaker is still open from a recent
    /// burst of request failures, and vice versa right after startup.
    async fn health_check(&self) -> Result<(), AppError>;

    /// Per-attempt timeout; `retry.rs` races this against `execute`.
    fn timeout(&self) -> Duration;
}

/// Map an upstream HTTP status to the taxonomy the retry loop and circuit
/// breaker understand. Shared by every concrete adapter so "what counts as
/// retryable" stays consistent across providers.
pub fn classify_upstream_status(status: reqwest::StatusCode, body: String) -> AppError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AppError::Upstream5xx { status, message: body }
    } else {
        AppError::Upstream4xx { status, message: body }
    }
}
