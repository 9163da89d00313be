//! Assigns the identifiers every downstream layer and trace/usage record
//! joins on: a request ID, a trace ID, and the wall-clock start time.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub trace_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl RequestContext {
    fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
        }
    }
}

pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let ctx = RequestContext::new();
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = axum::http::HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
