//! Task state machine and the shapes exchanged over the A2A surface.
//!
//! The machine itself is intentionally dumb: `TaskStatus::can_transition_to`
//! is the single place that knows which edges are legal, and both the store
//! (compare-and-set against the durable row) and the engine (pre-flight
//! check before even issuing a write) consult it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Submitted => "submitted",
            TaskStatus::Working => "working",
            TaskStatus::InputRequired => "input_required",
            TaskStatus::Completed => "completed",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(TaskStatus::Submitted),
            "working" => Some(TaskStatus::Working),
            "input_required" => Some(TaskStatus::InputRequired),
            "completed" => Some(TaskStatus::Completed),
            "canceled" => Some(TaskStatus::Canceled),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Canceled | TaskStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge in the machine:
    /// ```text
    /// submitted      -> working, canceled
    /// working        -> completed, failed, input_required, canceled
    /// input_required -> working, canceled
    /// completed, canceled, failed -> (terminal)
    /// ```
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Submitted, Working)
                | (Submitted, Canceled)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, InputRequired)
                | (Working, Canceled)
                | (InputRequired, Working)
                | (InputRequired, Canceled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub content: Value,
}

/// Durable row, minus bookkeeping columns not surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub status: TaskStatus,
    pub message: TaskMessage,
    pub artifacts: Vec<Artifact>,
    pub metadata: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub parent_id: Option<String>,
    pub workspace_id: Option<String>,
    pub assigned_agent_id: Option<String>,
    pub error: Option<String>,
}

/// One SSE frame emitted to a `sendSubscribe` subscriber. `message` carries
/// incremental assistant text as the gateway streams a response through the
/// task; `artifact` carries tool or other structured output appended to the
/// task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Status,
    Message,
    Artifact,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    #[serde(rename = "type")]
    pub kind: TaskEventKind,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TaskEvent {
    pub fn status(task_id: &str, status: TaskStatus) -> Self {
        Self { kind: TaskEventKind::Status, task_id: task_id.to_string(), status: Some(status), artifact: None, message: None, timestamp: chrono::Utc::now() }
    }

    pub fn message(task_id: &str, text: impl Into<String>) -> Self {
        Self { kind: TaskEventKind::Message, task_id: task_id.to_string(), status: None, artifact: None, message: Some(text.into()), timestamp: chrono::Utc::now() }
    }

    pub fn artifact(task_id: &str, artifact: Artifact) -> Self {
        Self { kind: TaskEventKind::Artifact, task_id: task_id.to_string(), status: None, artifact: Some(artifact), message: None, timestamp: chrono::Utc::now() }
    }

    pub fn completed(task_id: &str) -> Self {
        Self { kind: TaskEventKind::Completed, task_id: task_id.to_string(), status: Some(TaskStatus::Completed), artifact: None, message: None, timestamp: chrono::Utc::now() }
    }

    pub fn failed(task_id: &str, message: impl Into<String>) -> Self {
        Self { kind: TaskEventKind::Failed, task_id: task_id.to_string(), status: Some(TaskStatus::Failed), artifact: None, message: Some(message.into()), timestamp: chrono::Utc::now() }
    }

    /// `event: <type>\ndata: <json>\n\n` framing, distinct from the
    /// bare-`data:` framing LLM streams use.
    pub fn into_sse_event(&self) -> axum::response::sse::Event {
        let kind = match self.kind {
            TaskEventKind::Status => "status",
            TaskEventKind::Message => "message",
            TaskEventKind::Artifact => "artifact",
            TaskEventKind::Completed => "completed",
            TaskEventKind::Failed => "failed",
        };
        let json = serde_json::to_string(self).unwrap_or_default();
        axum::response::sse::Event::default().event(kind).data(json)
    }
}
