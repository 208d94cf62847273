//! Post-tool-use detector: a successful `gh pr create` completes the worker.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use super::{payload_cwd, HookPayload};
use crate::db::{Database, MessageContent, MessageType, NewMessage, WorkerStatus};
use crate::error::Result;
use crate::workspace;

/// Command marker that identifies a PR-creation invocation.
const PR_CREATE_MARKER: &str = "gh pr create";

fn pr_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"https://github\.com/[^/\s]+/[^/\s]+/pull/\d+").expect("valid pattern")
    })
}

/// Extract the first PR URL from captured stdout.
fn extract_pr_url(stdout: &str) -> Option<&str> {
    pr_url_pattern().find(stdout).map(|m| m.as_str())
}

/// Handle one tool-execution payload against the store at `db_path`.
///
/// Returns whether a notification was sent. All failures are logged and
/// swallowed; this must never propagate into the hook it runs inside.
pub fn detect_pr_completion(db_path: &Path, payload: &HookPayload) -> bool {
    match run(db_path, payload) {
        Ok(sent) => sent,
        Err(err) => {
            warn!("pr-completion detector error (ignored): {err}");
            false
        }
    }
}

fn run(db_path: &Path, payload: &HookPayload) -> Result<bool> {
    // Only shell executions of the PR-creation command that succeeded and
    // actually printed a PR URL are of interest.
    if payload.tool_name != "Bash" {
        return Ok(false);
    }
    if !payload.tool_input.command.contains(PR_CREATE_MARKER) {
        return Ok(false);
    }
    if payload.tool_response.exit_code != Some(0) {
        return Ok(false);
    }
    let Some(pr_url) = extract_pr_url(&payload.tool_response.stdout) else {
        return Ok(false);
    };

    let cwd = payload_cwd(&payload.cwd);
    // No marker means this session was not spawned by an orchestrator.
    let Some(orchestrator_id) = workspace::read_orchestrator_id(&cwd) else {
        return Ok(false);
    };

    let branch = workspace::current_branch(&cwd).unwrap_or_else(|| "unknown".to_string());
    let worktree_path = cwd.to_string_lossy().into_owned();

    let db = Database::open_path(db_path)?;
    db.migrate()?;
    db.update_spawned_worker_status(&worktree_path, WorkerStatus::Completed, Some(pr_url))?;
    db.send_message(&NewMessage {
        orchestrator_id: orchestrator_id.clone(),
        worker_id: None,
        message_type: MessageType::TaskComplete,
        content: MessageContent {
            summary: format!("PR created: {pr_url}"),
            pr_url: Some(pr_url.to_string()),
            branch: Some(branch),
            ..Default::default()
        },
    })?;

    info!("notified orchestrator {orchestrator_id} about PR {pr_url}");
    Ok(true)
}
