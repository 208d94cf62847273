//! Entity and input types for the message store.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// One coordinating process. Created once at orchestrator start, never
/// mutated; only the retention sweep deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSession {
    pub id: String,
    pub project_dir: String,
    pub created_at: i64,
}

/// One worker process spawned by an orchestrator for a branch. Looked up
/// by `worktree_path`, since the detectors only know the workspace path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnedWorker {
    pub id: i64,
    pub orchestrator_id: String,
    pub branch: String,
    pub worktree_path: String,
    pub status: WorkerStatus,
    pub pr_url: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// One worker → orchestrator notification. `content` is the JSON-encoded
/// [`MessageContent`] exactly as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub orchestrator_id: String,
    pub worker_id: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: i64,
}

/// Unread/total counts for an orchestrator's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub orchestrator_id: String,
    pub unread_count: i64,
    pub total_messages: i64,
    pub created_at: i64,
}

/// Structured message payload: a summary plus type-specific fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Message categories accepted by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskComplete,
    TaskFailed,
    Question,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskComplete => "task_complete",
            MessageType::TaskFailed => "task_failed",
            MessageType::Question => "question",
        }
    }

    /// Parse from the wire/storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task_complete" => Some(MessageType::TaskComplete),
            "task_failed" => Some(MessageType::TaskFailed),
            "question" => Some(MessageType::Question),
            _ => None,
        }
    }
}

/// Read state of a message. Flips unread → read exactly once, in bulk,
/// when the orchestrator polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Unread,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unread => "unread",
            MessageStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unread" => Some(MessageStatus::Unread),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

/// Lifecycle state of a spawned worker. Leaves `Active` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Completed,
    Ended,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Completed => "completed",
            WorkerStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WorkerStatus::Active),
            "completed" => Some(WorkerStatus::Completed),
            "ended" => Some(WorkerStatus::Ended),
            _ => None,
        }
    }
}

macro_rules! sql_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s).ok_or(FromSqlError::InvalidType)
            }
        }
    };
}

sql_enum!(MessageType);
sql_enum!(MessageStatus);
sql_enum!(WorkerStatus);

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating entities)
// ─────────────────────────────────────────────────────────────────────────────

/// Input for sending a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub orchestrator_id: String,
    pub worker_id: Option<String>,
    pub message_type: MessageType,
    pub content: MessageContent,
}

/// Input for recording a spawned worker
#[derive(Debug, Clone)]
pub struct NewWorker {
    pub orchestrator_id: String,
    pub branch: String,
    pub worktree_path: String,
}
