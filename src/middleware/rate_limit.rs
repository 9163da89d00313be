//! Token bucket per API-key principal. Runs ahead of the authenticator in
//! the chain (so an attacker cannot burn authentication cost before being
//! throttled), bucketed by the raw credential rather than a verified
//! [`crate::auth::Principal`] — a per-key rate limit override still applies
//! because the override table is keyed by the same hash the authenticator
//! will later verify.

use crate::auth::hash_key;
use crate::error::AppError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rpm: u32) -> Self {
        let capacity = rpm.max(1) as f64;
        Self { tokens: capacity, capacity, refill_per_sec: capacity / 60.0, last_refill: Instant::now() }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn retry_after_secs(&self) -> u64 {
        if self.refill_per_sec <= 0.0 {
            return 60;
        }
        ((1.0 - self.tokens) / self.refill_per_sec).ceil().max(1.0) as u64
    }
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    default_rpm: u32,
    /// `sha256(secret) -> rpm`, built from `ApiKeyConfig.rate_limit_rpm`
    /// overrides so an unauthenticated bucket lookup can still honor a
    /// per-key limit without waiting on the authenticator.
    overrides: HashMap<String, u32>,
}

impl RateLimiter {
    pub fn new(default_rpm: u32, overrides: HashMap<String, u32>) -> Self {
        Self { buckets: DashMap::new(), default_rpm, overrides }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        let overrides = config
            .api_keys
            .iter()
            .filter_map(|k| k.rate_limit_rpm.map(|rpm| (hash_key(&k.secret), rpm)))
            .collect();
        Self::new(config.rate_limit.default_rpm, overrides)
    }

    pub fn check(&self, bucket_key: &str) -> Result<(), AppError> {
        let rpm = self.overrides.get(bucket_key).copied().unwrap_or(self.default_rpm);
        let mut bucket = self.buckets.entry(bucket_key.to_string()).or_insert_with(|| Bucket::new(rpm));

        if bucket.try_take() {
            Ok(())
        } else {
            Err(AppError::RateLimited { retry_after_secs: bucket.retry_after_secs() })
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bucket_key = crate::auth::extract_credential(request.headers(), request.uri().query())
        .map(|raw| hash_key(&raw))
        .unwrap_or_else(|| "anonymous".to_string());

    limiter.check(&bucket_key)?;
    Ok(next.run(request).await)
}
