//! Walks a candidate list, trying each in turn until one succeeds or the
//! list is exhausted. Circuit breaker state is read and written here, and
//! not anywhere else in the request path, so there is exactly one place
//! that decides what counts as a provider success or failure.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error::AppError;
use crate::providers::adapter::{Adapter, AdapterStream};
use crate::registry::AdapterRegistry;
use crate::router::Candidate;
use std::sync::Arc;

/// One trace-worthy event per attempt, emitted as the loop progresses so
/// the caller can feed them straight into the trace store without
/// buffering the whole sequence first.
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    Skipped { provider: String, reason: &'static str },
    Started { provider: String, upstream_model: String },
    Succeeded { provider: String, latency_ms: u64 },
    Failed { provider: String, error_kind: &'static str, retryable: bool },
}

pub struct RetryOutcome<T> {
    pub result: Result<T, AppError>,
    pub events: Vec<AttemptEvent>,
}

/// Run the non-streaming path across `candidates`, recording each outcome
/// against the shared breaker registry as it goes.
pub async fn execute_with_failover(
    registry: &AdapterRegistry,
    breakers: &CircuitBreakerRegistry,
    candidates: &[Candidate],
    request: &crate::models::openai::ChatCompletionRequest,
) -> RetryOutcome<crate::models::openai::ChatCompletionResponse> {
    let mut events = Vec::new();
    let mut last_err = AppError::NoRoute(request.model.clone());

    for candidate in candidates {
        let Some(adapter) = registry.get(&candidate.provider) else {
            events.push(AttemptEvent::Skipped { provider: candidate.provider.clone(), reason: "adapter_not_registered" });
            continue;
        };

        if !breakers.allow(&candidate.provider) {
            events.push(AttemptEvent::Skipped { provider: candidate.provider.clone(), reason: "circuit_open" });
            continue;
        }

        events.push(AttemptEvent::Started { provider: candidate.provider.clone(), upstream_model: candidate.upstream_model.clone() });
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(adapter.timeout(), adapter.execute(request, &candidate.upstream_model)).await;

        match outcome {
            Ok(Ok(response)) => {
                breakers.record_success(&candidate.provider);
                events.push(AttemptEvent::Succeeded { provider: candidate.provider.clone(), latency_ms: started.elapsed().as_millis() as u64 });
                return RetryOutcome { result: Ok(response), events };
            }
            Ok(Err(err)) => {
                breakers.record_failure(&candidate.provider);
                events.push(AttemptEvent::Failed { provider: candidate.provider.clone(), error_kind: err.kind(), retryable: err.retryable() });
                let retryable = err.retryable();
                last_err = err;
                if !retryable {
                    return RetryOutcome { result: Err(last_err), events };
                }
            }
            Err(_) => {
                breakers.record_failure(&candidate.provider);
                let err = AppError::UpstreamTimeout(candidate.provider.clone());
                events.push(AttemptEvent::Failed { provider: candidate.provider.clone(), error_kind: err.kind(), retryable: true });
                last_err = err;
            }
        }
    }

    let keys: Vec<String> = candidates.iter().map(|c| c.provider.clone()).collect();
    if !keys.is_empty() && matches!(last_err, AppError::NoRoute(_)) {
        // Every candidate was skipped (unregistered or breaker-open); none
        // ever attempted, so the caller's error should reflect unavailability
        // rather than a missing route.
        let retry_after_secs = breakers.earliest_remaining_timeout(&keys).as_secs();
        last_err = AppError::AllUpstreamsUnavailable { retry_after_secs };
    } else if matches!(last_err, AppError::UpstreamTimeout(_) | AppError::UpstreamUnavailable(_) | AppError::Upstream5xx { .. }) {
        let retry_after_secs = breakers.earliest_remaining_timeout(&keys).as_secs();
        last_err = AppError::AllUpstreamsUnavailable { retry_after_secs };
    }

    RetryOutcome { result: Err(last_err), events }
}

/// Streaming variant. Because the response body has not yet been consumed
/// when this returns, "success" here means the upstream accepted the
/// request and began responding with a 2xx — downstream consumption
/// failures are not retried, matching the no-retry-after-bytes-reach-the-
/// client rule applied to the non-streaming path's persistence layer.
pub async fn execute_stream_with_failover(
    registry: &AdapterRegistry,
    breakers: &CircuitBreakerRegistry,
    candidates: &[Candidate],
    request: &crate::models::openai::ChatCompletionRequest,
) -> RetryOutcome<(Arc<dyn Adapter>, AdapterStream)> {
    let mut events = Vec::new();
    let mut last_err = AppError::NoRoute(request.model.clone());

    for candidate in candidates {
        let Some(adapter) = registry.get(&candidate.provider) else {
            events.push(AttemptEvent::Skipped { provider: candidate.provider.clone(), reason: "adapter_not_registered" });
            continue;
        };

        if !breakers.allow(&candidate.provider) {
            events.push(AttemptEvent::Skipped { provider: candidate.provider.clone(), reason: "circuit_open" });
            continue;
        }

        events.push(AttemptEvent::Started { provider: candidate.provider.clone(), upstream_model: candidate.upstream_model.clone() });
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(adapter.timeout(), adapter.execute_stream(request, &candidate.upstream_model)).await;

        match outcome {
            Ok(Ok(stream)) => {
                breakers.record_success(&candidate.provider);
                events.push(AttemptEvent::Succeeded { provider: candidate.provider.clone(), latency_ms: started.elapsed().as_millis() as u64 });
                return RetryOutcome { result: Ok((adapter, stream)), events };
            }
            Ok(Err(err)) => {
                breakers.record_failure(&candidate.provider);
                events.push(AttemptEvent::Failed { provider: candidate.provider.clone(), error_kind: err.kind(), retryable: err.retryable() });
                let retryable = err.retryable();
                last_err = err;
                if !retryable {
                    return RetryOutcome { result: Err(last_err), events };
                }
            }
            Err(_) => {
                breakers.record_failure(&candidate.provider);
                let err = AppError::UpstreamTimeout(candidate.provider.clone());
                events.push(AttemptEvent::Failed { provider: candidate.provider.clone(), error_kind: err.kind(), retryable: true });
                last_err = err;
            }
        }
    }

    let keys: Vec<String> = candidates.iter().map(|c| c.provider.clone()).collect();
    if !keys.is_empty() {
        let retry_after_secs = breakers.earliest_remaining_timeout(&keys).as_secs();
        last_err = AppError::AllUpstreamsUnavailable { retry_after_secs };
    }

    RetryOutcome { result: Err(last_err), events }
}
