//! Durable lookup of API keys by hash. Candidate rows are compared with a
//! constant-time equality check rather than relying on the store's own
//! indexed equality, since the whole point of hashing the credential is
//! defeated by a timing side channel on the comparison that follows.

use super::Principal;
use crate::error::AppError;
use async_trait::async_trait;
use subtle::ConstantTimeEq;

#[async_trait]
pub trait KeyRepository: Send + Sync {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Principal>, AppError>;
}

fn hashes_match(candidate_hash: &str, wanted_hash: &str) -> bool {
    let (Ok(candidate), Ok(wanted)) = (hex::decode(candidate_hash), hex::decode(wanted_hash)) else {
        return false;
    };
    candidate.ct_eq(&wanted).into()
}

/// Repository seeded once at startup from `Config.api_keys`. This is the
/// gateway's bootstrapping source of truth: operators provision keys via
/// config/env today, with `SqliteKeyRepository` available for deployments
/// that provision through the admin surface instead.
pub struct StaticKeyRepository {
    principals: Vec<Principal>,
}

impl StaticKeyRepository {
    pub fn new(principals: Vec<Principal>) -> Self {
        Self { principals }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        let principals = config
            .api_keys
            .iter()
            .map(|k| Principal {
                key_name: k.name.clone(),
                key_hash: super::hash_key(&k.secret),
                workspace_id: k.name.clone(),
                role: "member".to_string(),
                rate_limit_rpm: k.rate_limit_rpm,
                valid: k.enabled,
            })
            .collect();
        Self { principals }
    }
}

#[async_trait]
impl KeyRepository for StaticKeyRepository {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        Ok(self.principals.iter().find(|p| hashes_match(&p.key_hash, hash)).cloned())
    }
}

/// Durable-store-backed repository, for deployments that provision keys
/// through `api_keys` rows rather than static config.
pub struct SqliteKeyRepository {
    pool: sqlx::SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    name: String,
    secret_hash: String,
    workspace_id: String,
    role: String,
    rate_limit_rpm: Option<i64>,
    enabled: bool,
}

impl SqliteKeyRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRepository for SqliteKeyRepository {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as("SELECT name, secret_hash, workspace_id, role, rate_limit_rpm, enabled FROM api_keys WHERE enabled = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .find(|r| hashes_match(&r.secret_hash, hash))
            .map(|r| Principal {
                key_name: r.name,
                key_hash: r.secret_hash,
                workspace_id: r.workspace_id,
                role: r.role,
                rate_limit_rpm: r.rate_limit_rpm.map(|v| v as u32),
                valid: r.enabled,
            }))
    }
}
