//! The fixed middleware stack applied, outermost to innermost, to every
//! authenticated route: request-context, security headers, rate limiting,
//! and audit logging. TLS/mTLS termination happens below `server.rs`'s
//! listener setup rather than as a `tower::Layer`; CORS uses
//! `tower_http::cors::CorsLayer` directly.

pub mod audit;
pub mod brute_force;
pub mod rate_limit;
pub mod request_context;
pub mod security_headers;

pub use audit::audit_middleware;
pub use brute_force::{BruteForceGuard, brute_force_middleware};
pub use rate_limit::{RateLimiter, rate_limit_middleware};
pub use request_context::{RequestContext, request_context_middleware};
pub use security_headers::security_headers_middleware;
