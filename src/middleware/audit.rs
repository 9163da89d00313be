//! One structured log line per completed request, after the authenticator
//! has run so the principal (if any) is available to attach.

use crate::auth::Principal;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

pub async fn audit_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let principal = response
        .extensions()
        .get::<Principal>()
        .map(|p| p.key_name.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        principal = %principal,
        latency_ms = started.elapsed().as_millis() as u64,
        "request audit"
    );

    response
}
