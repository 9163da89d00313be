//! API-key authentication: extracts a credential from one of the request's
//! several accepted forms, hashes it, and resolves it to a [`Principal`]
//! through a cache-aside lookup over the durable key repository.

pub mod cache;
pub mod key_repository;

pub use cache::KeyCache;
pub use key_repository::{KeyRepository, SqliteKeyRepository, StaticKeyRepository};

use crate::error::AppError;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Identity attached to a request's lifetime once authentication succeeds.
/// `key_name` doubles as the principal's tenant identifier and the rate
/// limiter's bucket key — this gateway's `ApiKeyConfig` carries no separate
/// workspace/role fields, so both default from the key's own name.
#[derive(Debug, Clone)]
pub struct Principal {
    pub key_name: String,
    pub key_hash: String,
    pub workspace_id: String,
    pub role: String,
    pub rate_limit_rpm: Option<u32>,
    pub valid: bool,
}

pub struct Authenticator {
    repository: Arc<dyn KeyRepository>,
    cache: KeyCache,
}

impl Authenticator {
    pub fn new(repository: Arc<dyn KeyRepository>) -> Self {
        Self { repository, cache: KeyCache::new() }
    }

    /// Resolve a raw credential to a [`Principal`]. Cache hit returns
    /// immediately; miss falls through to the durable repository and
    /// populates the cache with a 5-minute TTL. A cache that fails to read
    /// or write degrades to a direct repository lookup rather than failing
    /// the request.
    pub async fn authenticate(&self, raw_key: &str) -> Result<Principal, AppError> {
        let hash = hash_key(raw_key);

        if let Some(principal) = self.cache.get(&hash) {
            if !principal.valid {
                return Err(AppError::AuthInvalid);
            }
            return Ok(principal);
        }

        let principal = self
            .repository
            .find_by_hash(&hash)
            .await?
            .ok_or(AppError::AuthInvalid)?;

        if !principal.valid {
            return Err(AppError::AuthInvalid);
        }

        self.cache.put(hash, principal.clone());
        Ok(principal)
    }
}

pub fn hash_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Try each accepted credential form in turn: `Authorization: Bearer`,
/// `x-api-key`, `x-goog-api-key`, then `?key=` (Gemini compatibility only).
pub fn extract_credential(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    if let Some(value) = headers.get("x-api-key") {
        if let Ok(text) = value.to_str() {
            return Some(text.to_string());
        }
    }
    if let Some(value) = headers.get("x-goog-api-key") {
        if let Ok(text) = value.to_str() {
            return Some(text.to_string());
        }
    }
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("key=") {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Attaches a [`Principal`] to the request's extensions on success. Mounted
/// on every route except `/health`, `/.well-known/agent.json`, and
/// `/v1/auth/*`, which precede this layer in the middleware chain.
pub async fn auth_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = extract_credential(request.headers(), request.uri().query())
        .ok_or(AppError::AuthMissing)?;

    let principal = authenticator.authenticate(&credential).await?;
    request.extensions_mut().insert(principal.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    Ok(response)
}
