//! MCP server implementation.
//!
//! Tools mirror the relay operation surface: create-session, send-message,
//! poll-messages, get-status, wait-for-messages, and the send-completion
//! convenience call for workers.

use std::path::PathBuf;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars::{self, JsonSchema},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use wtr_core::db::{Database, MessageContent, MessageType, NewMessage};
use wtr_core::wait::{self, WaitOutcome};
use wtr_core::{config, workspace};

/// Worktree Relay MCP server.
#[derive(Clone)]
pub struct RelayServer {
    db_path: PathBuf,
    tool_router: ToolRouter<Self>,
}

fn error_json(message: &str) -> String {
    json!({ "success": false, "error": message }).to_string()
}

/// Parameters for create_session
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionParams {
    /// Project directory the orchestrator runs in (defaults to cwd)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
}

/// Parameters for send_message
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SendMessageParams {
    /// Target orchestrator session id
    pub orchestrator_id: String,
    /// Message type: task_complete, task_failed, or question
    pub message_type: String,
    /// Structured payload with at least a summary field
    pub content: serde_json::Value,
    /// Identifier of the sending worker, if tracked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

/// Parameters for poll_messages
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PollMessagesParams {
    /// Orchestrator session id to poll
    pub orchestrator_id: String,
}

/// Parameters for get_status
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetStatusParams {
    /// Orchestrator session id
    pub orchestrator_id: String,
}

/// Parameters for wait_for_messages
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WaitForMessagesParams {
    /// Orchestrator session id to wait on
    pub orchestrator_id: String,
    /// Timeout in seconds (default 300, capped at 600)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

/// Parameters for send_completion
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SendCompletionParams {
    /// One-line description of what was accomplished
    pub summary: String,
    /// Longer free-form details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// URL of the created pull request, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

#[tool_router]
impl RelayServer {
    pub fn new() -> Self {
        Self::with_store_path(config::db_path())
    }

    /// Build a server against an explicit store path.
    pub fn with_store_path(db_path: PathBuf) -> Self {
        Self {
            db_path,
            tool_router: Self::tool_router(),
        }
    }

    fn open_store(&self) -> Result<Database, String> {
        let db = Database::open_path(&self.db_path).map_err(|e| e.to_string())?;
        db.migrate().map_err(|e| e.to_string())?;
        Ok(db)
    }

    /// Create a new orchestrator session
    #[tool(
        description = "Create a new orchestrator session. Returns the id workers use to route messages back."
    )]
    fn create_session(&self, Parameters(params): Parameters<CreateSessionParams>) -> String {
        let project_dir = params
            .project_dir
            .or_else(|| {
                std::env::current_dir()
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| ".".to_string());

        let db = match self.open_store() {
            Ok(db) => db,
            Err(e) => return error_json(&e),
        };

        // Opportunistic retention sweep; failures must not block creation.
        match db.cleanup_old_messages(config::retention_days()) {
            Ok(0) => {}
            Ok(n) => debug!("retention sweep removed {n} message(s)"),
            Err(e) => warn!("retention sweep failed (ignored): {e}"),
        }

        match db.create_orchestrator_session(&project_dir) {
            Ok(session) => {
                info!("created orchestrator session {}", session.id);
                json!({
                    "success": true,
                    "orchestrator_id": session.id,
                    "project_dir": session.project_dir,
                    "created_at": session.created_at,
                    "message": "Orchestrator session created. Use this id when spawning worker sessions.",
                })
                .to_string()
            }
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Send a message from a worker to an orchestrator
    #[tool(description = "Send a message from a worker to an orchestrator.")]
    fn send_message(&self, Parameters(params): Parameters<SendMessageParams>) -> String {
        if params.orchestrator_id.is_empty() {
            return error_json("orchestrator_id is required");
        }
        let Some(message_type) = MessageType::parse(&params.message_type) else {
            return error_json("message_type must be one of: task_complete, task_failed, question");
        };
        let content: MessageContent = match serde_json::from_value(params.content) {
            Ok(content) => content,
            Err(_) => return error_json("content must be an object with at least a summary field"),
        };

        let db = match self.open_store() {
            Ok(db) => db,
            Err(e) => return error_json(&e),
        };

        match db.send_message(&NewMessage {
            orchestrator_id: params.orchestrator_id,
            worker_id: params.worker_id,
            message_type,
            content,
        }) {
            Ok(message) => json!({
                "success": true,
                "message_id": message.id,
                "orchestrator_id": message.orchestrator_id,
                "message_type": message.message_type,
                "status": message.status,
                "created_at": message.created_at,
            })
            .to_string(),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Poll unread messages and mark them read
    #[tool(description = "Poll unread messages for an orchestrator and mark them read.")]
    fn poll_messages(&self, Parameters(params): Parameters<PollMessagesParams>) -> String {
        if params.orchestrator_id.is_empty() {
            return error_json("orchestrator_id is required");
        }

        let db = match self.open_store() {
            Ok(db) => db,
            Err(e) => return error_json(&e),
        };

        match db.get_orchestrator_session(&params.orchestrator_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return error_json(&format!(
                    "Orchestrator session not found: {}",
                    params.orchestrator_id
                ));
            }
            Err(e) => return error_json(&e.to_string()),
        }

        let raw = match db.poll_messages(&params.orchestrator_id) {
            Ok(raw) => raw,
            Err(e) => return error_json(&e.to_string()),
        };

        let messages: Vec<_> = raw
            .iter()
            .map(|msg| {
                json!({
                    "id": msg.id,
                    "worker_id": msg.worker_id,
                    "message_type": msg.message_type,
                    "content": serde_json::from_str::<serde_json::Value>(&msg.content)
                        .unwrap_or(serde_json::Value::Null),
                    "created_at": msg.created_at,
                })
            })
            .collect();

        debug!(
            "poll_messages: delivering {} message(s) to {}",
            messages.len(),
            params.orchestrator_id
        );

        json!({
            "success": true,
            "orchestrator_id": params.orchestrator_id,
            "message_count": messages.len(),
            "messages": messages,
        })
        .to_string()
    }

    /// Get an orchestrator's status
    #[tool(description = "Get an orchestrator session's unread and total message counts.")]
    fn get_status(&self, Parameters(params): Parameters<GetStatusParams>) -> String {
        if params.orchestrator_id.is_empty() {
            return error_json("orchestrator_id is required");
        }

        let db = match self.open_store() {
            Ok(db) => db,
            Err(e) => return error_json(&e),
        };

        match db.orchestrator_status(&params.orchestrator_id) {
            Ok(Some(status)) => json!({
                "success": true,
                "orchestrator_id": status.orchestrator_id,
                "unread_count": status.unread_count,
                "total_messages": status.total_messages,
                "created_at": status.created_at,
            })
            .to_string(),
            Ok(None) => error_json(&format!(
                "Orchestrator session not found: {}",
                params.orchestrator_id
            )),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Block until messages arrive or the timeout elapses
    #[tool(
        description = "Block until messages arrive for an orchestrator, or the timeout elapses. Uses a change watch on the store with a polling fallback."
    )]
    async fn wait_for_messages(
        &self,
        Parameters(params): Parameters<WaitForMessagesParams>,
    ) -> String {
        if params.orchestrator_id.is_empty() {
            return json!({ "status": "error", "error": "orchestrator_id is required" })
                .to_string();
        }

        match wait::wait_for_messages_at(
            &self.db_path,
            &params.orchestrator_id,
            params.timeout_seconds,
        )
        .await
        {
            Ok(WaitOutcome::Messages(messages)) => json!({
                "status": "messages",
                "orchestrator_id": params.orchestrator_id,
                "message_count": messages.len(),
                "messages": messages,
            })
            .to_string(),
            Ok(WaitOutcome::TimedOut) => json!({
                "status": "timeout",
                "orchestrator_id": params.orchestrator_id,
                "message": "No messages received within timeout period",
            })
            .to_string(),
            Err(e) => json!({ "status": "error", "error": e.to_string() }).to_string(),
        }
    }

    /// Convenience completion notice for workers
    #[tool(
        description = "Send a completion notice without knowing the orchestrator id: it is resolved from the calling workspace's marker file, and the branch from git."
    )]
    fn send_completion(&self, Parameters(params): Parameters<SendCompletionParams>) -> String {
        if params.summary.is_empty() {
            return error_json("summary is required");
        }

        let cwd = match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => return error_json(&e.to_string()),
        };
        let Some(orchestrator_id) = workspace::read_orchestrator_id(&cwd) else {
            return error_json(
                "Not running as a worker session. No orchestrator marker found in this workspace.",
            );
        };
        let branch = workspace::current_branch(&cwd).unwrap_or_else(|| "unknown".to_string());

        let db = match self.open_store() {
            Ok(db) => db,
            Err(e) => return error_json(&e),
        };

        match db.send_message(&NewMessage {
            orchestrator_id: orchestrator_id.clone(),
            worker_id: None,
            message_type: MessageType::TaskComplete,
            content: MessageContent {
                summary: params.summary,
                details: params.details,
                pr_url: params.pr_url,
                branch: Some(branch),
                ..Default::default()
            },
        }) {
            Ok(message) => json!({
                "success": true,
                "message_id": message.id,
                "orchestrator_id": orchestrator_id,
            })
            .to_string(),
            Err(e) => error_json(&e.to_string()),
        }
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for RelayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Worktree Relay MCP server - create orchestrator sessions, relay worker messages, and block-wait for completions."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn value(text: &str) -> serde_json::Value {
        serde_json::from_str(text).expect("tool output is JSON")
    }

    #[test]
    fn test_tool_flow_create_send_poll_status() {
        let temp = tempdir().expect("create temp dir");
        let server = RelayServer::with_store_path(temp.path().join("messages.db"));

        let created = value(&server.create_session(Parameters(CreateSessionParams {
            project_dir: Some("/proj".to_string()),
        })));
        assert_eq!(created["success"], true);
        let orchestrator_id = created["orchestrator_id"]
            .as_str()
            .expect("orchestrator id")
            .to_string();
        assert!(orchestrator_id.starts_with("orch_"));

        let sent = value(&server.send_message(Parameters(SendMessageParams {
            orchestrator_id: orchestrator_id.clone(),
            message_type: "task_complete".to_string(),
            content: json!({ "summary": "PR created", "pr_url": "https://x/pull/1" }),
            worker_id: Some("worker_1".to_string()),
        })));
        assert_eq!(sent["success"], true);
        assert_eq!(sent["message_type"], "task_complete");

        let status = value(&server.get_status(Parameters(GetStatusParams {
            orchestrator_id: orchestrator_id.clone(),
        })));
        assert_eq!(status["unread_count"], 1);
        assert_eq!(status["total_messages"], 1);

        let polled = value(&server.poll_messages(Parameters(PollMessagesParams {
            orchestrator_id: orchestrator_id.clone(),
        })));
        assert_eq!(polled["success"], true);
        assert_eq!(polled["message_count"], 1);
        assert_eq!(polled["messages"][0]["content"]["summary"], "PR created");
        assert_eq!(polled["messages"][0]["worker_id"], "worker_1");

        // Read-state is sticky.
        let again = value(&server.poll_messages(Parameters(PollMessagesParams {
            orchestrator_id: orchestrator_id.clone(),
        })));
        assert_eq!(again["message_count"], 0);
    }

    #[test]
    fn test_send_message_validation() {
        let temp = tempdir().expect("create temp dir");
        let server = RelayServer::with_store_path(temp.path().join("messages.db"));

        let bad_type = value(&server.send_message(Parameters(SendMessageParams {
            orchestrator_id: "orch_abc12345".to_string(),
            message_type: "celebration".to_string(),
            content: json!({ "summary": "hi" }),
            worker_id: None,
        })));
        assert_eq!(bad_type["success"], false);
        assert!(bad_type["error"]
            .as_str()
            .expect("error text")
            .contains("message_type"));

        let bad_content = value(&server.send_message(Parameters(SendMessageParams {
            orchestrator_id: "orch_abc12345".to_string(),
            message_type: "question".to_string(),
            content: json!({ "details": "no summary" }),
            worker_id: None,
        })));
        assert_eq!(bad_content["success"], false);

        let unknown = value(&server.send_message(Parameters(SendMessageParams {
            orchestrator_id: "orch_missing0".to_string(),
            message_type: "question".to_string(),
            content: json!({ "summary": "anyone there?" }),
            worker_id: None,
        })));
        assert_eq!(unknown["success"], false);
        assert!(unknown["error"]
            .as_str()
            .expect("error text")
            .contains("not found"));
    }

    #[tokio::test]
    async fn test_wait_tool_reports_timeout() {
        let temp = tempdir().expect("create temp dir");
        let server = RelayServer::with_store_path(temp.path().join("messages.db"));

        let created = value(&server.create_session(Parameters(CreateSessionParams {
            project_dir: Some("/proj".to_string()),
        })));
        let orchestrator_id = created["orchestrator_id"]
            .as_str()
            .expect("orchestrator id")
            .to_string();

        let result = value(
            &server
                .wait_for_messages(Parameters(WaitForMessagesParams {
                    orchestrator_id,
                    timeout_seconds: Some(1),
                }))
                .await,
        );
        assert_eq!(result["status"], "timeout");
    }
}
