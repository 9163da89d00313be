//! Cache-aside repository for A2A model cards. Same two-interface shape as
//! `auth::cache`/`auth::key_repository`: a durable row store plus an
//! ephemeral `DashMap` cache the repository composes and never lets callers
//! see errors from — a cache miss or cache-write failure always falls back
//! to hitting the durable store directly.

use crate::error::AppError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use uuid::Uuid;

const TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCardStatus {
    Active,
    Deprecated,
}

impl ModelCardStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ModelCardStatus::Active => "active",
            ModelCardStatus::Deprecated => "deprecated",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ModelCardStatus::Active),
            "deprecated" => Some(ModelCardStatus::Deprecated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub workspace_id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub card: Value,
    pub version: i64,
    pub status: ModelCardStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(sqlx::FromRow)]
struct ModelCardRow {
    id: String,
    workspace_id: String,
    slug: String,
    name: String,
    description: Option<String>,
    card: String,
    version: i64,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ModelCardRow> for ModelCard {
    type Error = AppError;

    fn try_from(row: ModelCardRow) -> Result<Self, Self::Error> {
        let status = ModelCardStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unrecognized model card status '{}'", row.status)))?;
        Ok(ModelCard {
            id: row.id,
            workspace_id: row.workspace_id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            card: serde_json::from_str(&row.card)?,
            version: row.version,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct CacheEntry {
    card: ModelCard,
    expires_at: Instant,
}

pub struct ModelCardRepository {
    pool: sqlx::SqlitePool,
    by_id: DashMap<String, CacheEntry>,
}

impl ModelCardRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool, by_id: DashMap::new() }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<ModelCard>, AppError> {
        if let Some(entry) = self.by_id.get(id) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.card.clone()));
            }
        }

        let row: Option<ModelCardRow> = sqlx::query_as(
            "SELECT id, workspace_id, slug, name, description, card, version, status, created_at, updated_at FROM a2a_model_cards WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let card = ModelCard::try_from(row)?;
        self.prime(card.clone());
        Ok(Some(card))
    }

    pub async fn create(&self, workspace_id: &str, slug: &str, name: &str, description: Option<String>, card: Value) -> Result<ModelCard, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let encoded = serde_json::to_string(&card)?;

        sqlx::query(
            "INSERT INTO a2a_model_cards (id, workspace_id, slug, name, description, card, version, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 'active', ?7, ?7)",
        )
        .bind(&id)
        .bind(workspace_id)
        .bind(slug)
        .bind(name)
        .bind(&description)
        .bind(&encoded)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("model card slug '{}' already exists in workspace '{}'", slug, workspace_id))
            }
            other => AppError::from(other),
        })?;

        let created = self.get_by_id(&id).await?.ok_or_else(|| AppError::Internal("model card vanished immediately after insert".to_string()))?;
        self.prime(created.clone());
        Ok(created)
    }

    /// Writes durable first, then invalidates the id-key cache entry so the
    /// next read repopulates with the bumped version.
    pub async fn update(&self, id: &str, name: Option<String>, description: Option<String>, card: Option<Value>) -> Result<ModelCard, AppError> {
        let existing = self.get_by_id(id).await?.ok_or_else(|| AppError::NotFound(format!("model card {}", id)))?;
        let name = name.unwrap_or(existing.name);
        let description = description.or(existing.description);
        let card_value = card.unwrap_or(existing.card);
        let encoded = serde_json::to_string(&card_value)?;
        let now = chrono::Utc::now();
        let next_version = existing.version + 1;

        sqlx::query("UPDATE a2a_model_cards SET name = ?1, description = ?2, card = ?3, version = ?4, updated_at = ?5 WHERE id = ?6")
            .bind(&name)
            .bind(&description)
            .bind(&encoded)
            .bind(next_version)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.by_id.remove(id);
        self.get_by_id(id).await?.ok_or_else(|| AppError::NotFound(format!("model card {}", id)))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM a2a_model_cards WHERE id = ?1").bind(id).execute(&self.pool).await?;
        self.by_id.remove(id);
        Ok(())
    }

    fn prime(&self, card: ModelCard) {
        let id = card.id.clone();
        self.by_id.insert(id, CacheEntry { card, expires_at: Instant::now() + TTL });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_repo() -> ModelCardRepository {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE a2a_model_cards (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                card TEXT NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(workspace_id, slug)
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        ModelCardRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_then_get_is_read_your_writes() {
        let repo = memory_repo().await;
        let created = repo.create("ws1", "planner", "Planner", None, serde_json::json!({"a": 1})).await.unwrap();
        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.slug, "planner");
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_update_increments_version() {
        let repo = memory_repo().await;
        let created = repo.create("ws1", "planner", "Planner", None, serde_json::json!({})).await.unwrap();
        let updated = repo.update(&created.id, Some("Planner v2".to_string()), None, None).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.name, "Planner v2");
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_cache() {
        let repo = memory_repo().await;
        let created = repo.create("ws1", "planner", "Planner", None, serde_json::json!({})).await.unwrap();
        repo.delete(&created.id).await.unwrap();
        assert!(repo.get_by_id(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_in_same_workspace_conflicts() {
        let repo = memory_repo().await;
        repo.create("ws1", "planner", "Planner", None, serde_json::json!({})).await.unwrap();
        let err = repo.create("ws1", "planner", "Planner Again", None, serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
