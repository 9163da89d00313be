use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The gateway's single error type.
///
/// Every layer below the HTTP surface returns `Result<_, AppError>`; the HTTP
/// layer is the one place that maps a kind to a status code (see
/// `IntoResponse` below) — inner layers never construct an HTTP response
/// themselves.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Fatal at startup: malformed or inconsistent configuration.
    #[error("configuration error: {0}")]
    ConfigInvalid(String),

    /// No credential presented at all.
    #[error("missing credentials")]
    AuthMissing,

    /// Credential presented but not recognized, or its hash doesn't match any
    /// known key.
    #[error("invalid credentials")]
    AuthInvalid,

    /// Credential recognized but past its validity window.
    #[error("credentials expired")]
    AuthExpired,

    /// Credential valid but the principal is not permitted to perform this
    /// operation.
    #[error("access denied: {0}")]
    AuthzDenied(String),

    /// Token-bucket exhausted for this principal. `retry_after` is seconds.
    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    /// Malformed request: bad JSON, missing required field, invalid model
    /// name, etc.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Referenced entity (task, model card, model) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal state transition or a unique-constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Inbound model has no routing-table entry.
    #[error("no route for model '{0}'")]
    NoRoute(String),

    /// Upstream did not respond within the per-attempt timeout. Retryable.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Upstream connection could not be established. Retryable.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream returned a 5xx or 429. Retryable.
    #[error("upstream 5xx: {status} {message}")]
    Upstream5xx { status: StatusCode, message: String },

    /// Upstream returned a non-retryable 4xx (400/401/403 at the provider).
    /// Not retryable — surfaced as 502 with the provider's message passed
    /// through when it is safe to do so.
    #[error("upstream 4xx: {status} {message}")]
    Upstream4xx { status: StatusCode, message: String },

    /// Every candidate's circuit was open and none were due for a probe.
    #[error("all upstreams unavailable, retry after {retry_after_secs}s")]
    AllUpstreamsUnavailable { retry_after_secs: u64 },

    /// Client disconnected mid-request; best-effort bookkeeping only.
    #[error("request cancelled")]
    Cancelled,

    /// The durable store could not be reached. Fatal on critical paths
    /// (auth), logged-and-continue on non-critical ones (usage, trace).
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// A wire-format conversion between provider formats failed.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Catch-all for invariant violations that should never be reachable
    /// from client input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable kind, used both in the JSON error envelope and by the
    /// failover loop's retryability check.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ConfigInvalid(_) => "config_invalid",
            AppError::AuthMissing => "auth_missing",
            AppError::AuthInvalid => "auth_invalid",
            AppError::AuthExpired => "auth_expired",
            AppError::AuthzDenied(_) => "authz_denied",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::NoRoute(_) => "no_route",
            AppError::UpstreamTimeout(_) => "upstream_timeout",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Upstream5xx { .. } => "upstream_5xx",
            AppError::Upstream4xx { .. } => "upstream_4xx",
            AppError::AllUpstreamsUnavailable { .. } => "all_upstreams_unavailable",
            AppError::Cancelled => "cancelled",
            AppError::PersistenceUnavailable(_) => "persistence_unavailable",
            AppError::ConversionError(_) => "conversion_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the failover loop should advance to the next candidate rather
    /// than returning this error to the caller.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamTimeout(_) | AppError::UpstreamUnavailable(_) | AppError::Upstream5xx { .. }
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AuthMissing | AppError::AuthInvalid | AppError::AuthExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AuthzDenied(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::NoRoute(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamTimeout(_)
            | AppError::UpstreamUnavailable(_)
            | AppError::Upstream5xx { .. } => StatusCode::BAD_GATEWAY,
            AppError::Upstream4xx { .. } => StatusCode::BAD_GATEWAY,
            AppError::AllUpstreamsUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cancelled => StatusCode::from_u16(499).unwrap(),
            AppError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConversionError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            AppError::AllUpstreamsUnavailable { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after();
        let message = self.to_string();
        let kind = self.kind();

        if !matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::warn!(error_kind = kind, status = status.as_u16(), "request failed: {}", message);
        } else {
            tracing::error!(error_kind = kind, "request failed: {}", message);
        }

        let body = Json(json!({
            "error": {
                "code": kind,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::UpstreamTimeout(err.to_string())
        } else if err.is_connect() {
            AppError::UpstreamUnavailable(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::PersistenceUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
