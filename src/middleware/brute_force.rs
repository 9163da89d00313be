//! Throttles repeated failures against the bearer-token auth endpoints
//! (`/v1/auth/*`) specifically — separate from the general rate limiter,
//! since these routes have no API-key principal to bucket on yet.

use crate::error::AppError;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_FAILURES: u32 = 10;
const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    failures: u32,
    started_at: Instant,
}

pub struct BruteForceGuard {
    windows: DashMap<String, Window>,
}

impl BruteForceGuard {
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    fn check(&self, key: &str) -> Result<(), AppError> {
        if let Some(window) = self.windows.get(key) {
            if window.started_at.elapsed() < WINDOW && window.failures >= MAX_FAILURES {
                let retry_after = (WINDOW - window.started_at.elapsed()).as_secs().max(1);
                return Err(AppError::RateLimited { retry_after_secs: retry_after });
            }
        }
        Ok(())
    }

    fn record_failure(&self, key: &str) {
        let mut window = self.windows.entry(key.to_string()).or_insert_with(|| Window { failures: 0, started_at: Instant::now() });
        if window.started_at.elapsed() >= WINDOW {
            window.failures = 0;
            window.started_at = Instant::now();
        }
        window.failures += 1;
    }
}

impl Default for BruteForceGuard {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn brute_force_middleware(
    State(guard): State<Arc<BruteForceGuard>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = addr.ip().to_string();
    guard.check(&key)?;

    let response = next.run(request).await;
    if response.status().is_client_error() {
        guard.record_failure(&key);
    }
    Ok(response)
}
