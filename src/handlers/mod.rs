//! Thin wire-translation layer. Every handler here does three things and no
//! more: parse/validate the inbound body for its own protocol, call
//! `Gateway::dispatch`/`dispatch_stream`, and translate the canonical
//! response (or a still-unconsumed stream) back into its protocol's shape.
//! All routing, retry, and bookkeeping decisions live in `gateway.rs`.

pub mod chat_completions;
pub mod gemini_native;
pub mod health;
pub mod messages;
pub mod models;

use crate::a2a::A2aEngine;
use crate::auth::Authenticator;
use crate::gateway::Gateway;
use crate::middleware::{BruteForceGuard, RateLimiter};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared state handed to every axum handler and middleware layer.
///
/// `config` and `gateway` sit behind an `ArcSwap` so `SIGHUP` can hot-swap a
/// freshly built adapter registry and breaker set without restarting the
/// listener: `signals::reload` constructs a brand new `Gateway` (fresh
/// `AdapterRegistry`/`CircuitBreakerRegistry`, same long-lived trace/usage
/// sinks) and swaps both atomically. `authenticator`/`rate_limiter` are not
/// swapped — when `auth::SqliteKeyRepository` backs the authenticator, key
/// changes are picked up live from the database on every lookup; the
/// in-memory `rate_limiter` override table is rebuilt only on restart, which
/// is an accepted limitation for the rare case of changing a key's RPM
/// override without changing the key itself.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<crate::config::Config>>,
    pub gateway: Arc<ArcSwap<Gateway>>,
    pub authenticator: Arc<Authenticator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub brute_force: Arc<BruteForceGuard>,
    pub a2a: Arc<A2aEngine>,
    pub db: sqlx::SqlitePool,
}
