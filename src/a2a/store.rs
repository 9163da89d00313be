//! Durable task store. Every transition is a compare-and-set against the
//! current status, mirroring the constant-time-lookup-then-compare shape
//! `auth::key_repository::SqliteKeyRepository` uses for a different
//! invariant: here correctness rests on the database, not the caller,
//! deciding whether a transition actually took effect.

use super::task::{Artifact, Task, TaskMessage, TaskStatus};
use crate::error::AppError;
use serde_json::Value;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    session_id: String,
    status: String,
    message_role: String,
    message_content: String,
    artifacts: String,
    metadata: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    parent_id: Option<String>,
    workspace_id: Option<String>,
    assigned_agent_id: Option<String>,
    error: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unrecognized task status '{}'", row.status)))?;
        let artifacts: Vec<Artifact> = serde_json::from_str(&row.artifacts)?;
        let metadata: Value = serde_json::from_str(&row.metadata)?;
        Ok(Task {
            id: row.id,
            session_id: row.session_id,
            status,
            message: TaskMessage { role: row.message_role, content: row.message_content },
            artifacts,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            parent_id: row.parent_id,
            workspace_id: row.workspace_id,
            assigned_agent_id: row.assigned_agent_id,
            error: row.error,
        })
    }
}

pub struct TaskStore {
    pool: sqlx::SqlitePool,
}

impl TaskStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session_id: &str, message: TaskMessage, workspace_id: Option<String>, parent_id: Option<String>) -> Result<Task, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO a2a_tasks (id, session_id, status, message_role, message_content, artifacts, metadata, created_at, updated_at, expires_at, parent_id, workspace_id, assigned_agent_id, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, '[]', '{}', ?6, ?6, NULL, ?7, ?8, NULL, NULL)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(TaskStatus::Submitted.as_str())
        .bind(&message.role)
        .bind(&message.content)
        .bind(now)
        .bind(&parent_id)
        .bind(&workspace_id)
        .execute(&self.pool)
        .await?;

        self.get(&id).await?.ok_or_else(|| AppError::Internal("task vanished immediately after insert".to_string()))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>, AppError> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, session_id, status, message_role, message_content, artifacts, metadata, created_at, updated_at, expires_at, parent_id, workspace_id, assigned_agent_id, error \
             FROM a2a_tasks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    /// Compare-and-set `status` from `expected` to `next`. Returns
    /// `Conflict` if the row's current status no longer matches `expected`
    /// (either a concurrent transition won, or the task never existed),
    /// matching the `409` the engine maps illegal transitions to.
    pub async fn transition(&self, id: &str, expected: TaskStatus, next: TaskStatus, error: Option<String>) -> Result<Task, AppError> {
        let now = chrono::Utc::now();
        let result = sqlx::query("UPDATE a2a_tasks SET status = ?1, updated_at = ?2, error = ?3 WHERE id = ?4 AND status = ?5")
            .bind(next.as_str())
            .bind(now)
            .bind(&error)
            .bind(id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!("task {} is not in status {}", id, expected.as_str())));
        }

        self.get(id).await?.ok_or_else(|| AppError::NotFound(format!("task {}", id)))
    }

    pub async fn append_artifact(&self, id: &str, artifact: &Artifact) -> Result<Task, AppError> {
        let task = self.get(id).await?.ok_or_else(|| AppError::NotFound(format!("task {}", id)))?;
        let mut artifacts = task.artifacts;
        artifacts.push(artifact.clone());
        let encoded = serde_json::to_string(&artifacts)?;
        let now = chrono::Utc::now();

        sqlx::query("UPDATE a2a_tasks SET artifacts = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&encoded)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.get(id).await?.ok_or_else(|| AppError::NotFound(format!("task {}", id)))
    }
}
