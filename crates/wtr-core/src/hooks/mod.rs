//! Hook-triggered completion detectors.
//!
//! Both detectors run inside a host tool-execution hook and must never
//! fail it: every error path logs and degrades to a no-op, so a
//! coordination bug can never block the worker's underlying action.

mod pr_completion;
mod session_end;

pub use pr_completion::detect_pr_completion;
pub use session_end::detect_session_end;

use std::path::PathBuf;

use serde::Deserialize;

/// Tool-execution payload delivered by the hook boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: ToolInput,
    #[serde(default)]
    pub tool_response: ToolResponse,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolResponse {
    #[serde(default)]
    pub stdout: String,
    pub exit_code: Option<i32>,
}

/// Session-termination payload delivered by the hook boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionEndPayload {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
}

/// Workspace directory for a payload, falling back to the process cwd.
fn payload_cwd(cwd: &str) -> PathBuf {
    if cwd.is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        PathBuf::from(cwd)
    }
}
