//! Session-end detector: a worker session ending without a PR still
//! notifies its orchestrator.

use std::path::Path;

use tracing::{info, warn};

use super::{payload_cwd, SessionEndPayload};
use crate::db::{Database, MessageContent, MessageType, NewMessage, WorkerStatus};
use crate::error::Result;
use crate::workspace;

/// Handle one session-termination payload against the store at `db_path`.
///
/// Returns whether a notification was sent. All failures are logged and
/// swallowed; this must never propagate into the hook it runs inside.
pub fn detect_session_end(db_path: &Path, payload: &SessionEndPayload) -> bool {
    match run(db_path, payload) {
        Ok(sent) => sent,
        Err(err) => {
            warn!("session-end detector error (ignored): {err}");
            false
        }
    }
}

fn run(db_path: &Path, payload: &SessionEndPayload) -> Result<bool> {
    let cwd = payload_cwd(&payload.cwd);
    // No marker means this session was not spawned by an orchestrator.
    let Some(orchestrator_id) = workspace::read_orchestrator_id(&cwd) else {
        return Ok(false);
    };

    let worktree_path = cwd.to_string_lossy().into_owned();

    let db = Database::open_path(db_path)?;
    db.migrate()?;

    // If the PR detector already fired, the orchestrator has its answer;
    // don't send a duplicate.
    match db.get_spawned_worker_by_path(&worktree_path)? {
        None => return Ok(false),
        Some(worker) if worker.status == WorkerStatus::Completed => return Ok(false),
        Some(_) => {}
    }

    let branch = workspace::current_branch(&cwd).unwrap_or_else(|| "unknown".to_string());

    db.update_spawned_worker_status(&worktree_path, WorkerStatus::Ended, None)?;
    db.send_message(&NewMessage {
        orchestrator_id: orchestrator_id.clone(),
        worker_id: None,
        message_type: MessageType::TaskComplete,
        content: MessageContent {
            summary: format!("Worker session ended (branch: {branch})"),
            details: Some(
                "Session ended without creating a PR. The task may still be in progress or was cancelled."
                    .to_string(),
            ),
            branch: Some(branch),
            ..Default::default()
        },
    })?;

    info!("notified orchestrator {orchestrator_id} about session end");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewWorker;
    use tempfile::tempdir;

    struct Fixture {
        db_path: std::path::PathBuf,
        worktree_path: String,
        orchestrator_id: String,
        _store: tempfile::TempDir,
        _worktree: tempfile::TempDir,
    }

    fn setup() -> Fixture {
        let store = tempdir().expect("create store dir");
        let db_path = store.path().join("messages.db");
        let worktree = tempdir().expect("create worktree dir");
        let worktree_path = worktree.path().to_string_lossy().into_owned();

        let db = Database::open_path(&db_path).expect("open store");
        db.migrate().expect("migrate");
        let session = db.create_orchestrator_session("/proj").expect("session");
        db.create_spawned_worker(&NewWorker {
            orchestrator_id: session.id.clone(),
            branch: "feat/x".to_string(),
            worktree_path: worktree_path.clone(),
        })
        .expect("spawn");
        workspace::write_orchestrator_id(worktree.path(), &session.id).expect("marker");

        Fixture {
            db_path,
            worktree_path,
            orchestrator_id: session.id,
            _store: store,
            _worktree: worktree,
        }
    }

    fn payload(cwd: &str) -> SessionEndPayload {
        SessionEndPayload {
            session_id: "sess-1".to_string(),
            cwd: cwd.to_string(),
        }
    }

    #[test]
    fn test_active_worker_transitions_to_ended_and_notifies() {
        let fx = setup();

        assert!(detect_session_end(&fx.db_path, &payload(&fx.worktree_path)));

        let db = Database::open_path(&fx.db_path).expect("reopen store");
        let worker = db
            .get_spawned_worker_by_path(&fx.worktree_path)
            .expect("lookup")
            .expect("exists");
        assert_eq!(worker.status, WorkerStatus::Ended);

        let polled = db.poll_messages(&fx.orchestrator_id).expect("poll");
        assert_eq!(polled.len(), 1);
        let content: MessageContent =
            serde_json::from_str(&polled[0].content).expect("parse content");
        assert!(content.summary.contains("session ended"));
        assert!(content.details.is_some());
    }

    #[test]
    fn test_completed_worker_suppresses_duplicate() {
        let fx = setup();

        let db = Database::open_path(&fx.db_path).expect("open store");
        db.update_spawned_worker_status(
            &fx.worktree_path,
            WorkerStatus::Completed,
            Some("https://github.com/o/r/pull/7"),
        )
        .expect("complete");
        drop(db);

        assert!(!detect_session_end(&fx.db_path, &payload(&fx.worktree_path)));

        let db = Database::open_path(&fx.db_path).expect("reopen store");
        assert!(db.poll_messages(&fx.orchestrator_id).expect("poll").is_empty());
        let worker = db
            .get_spawned_worker_by_path(&fx.worktree_path)
            .expect("lookup")
            .expect("exists");
        assert_eq!(worker.status, WorkerStatus::Completed);
    }

    #[test]
    fn test_untracked_worker_is_silent_noop() {
        let store = tempdir().expect("create store dir");
        let db_path = store.path().join("messages.db");
        let worktree = tempdir().expect("create worktree dir");

        let db = Database::open_path(&db_path).expect("open store");
        db.migrate().expect("migrate");
        let session = db.create_orchestrator_session("/proj").expect("session");
        workspace::write_orchestrator_id(worktree.path(), &session.id).expect("marker");
        drop(db);

        // Marker present but no worker record: nothing to report.
        assert!(!detect_session_end(
            &db_path,
            &payload(&worktree.path().to_string_lossy())
        ));
    }

    #[test]
    fn test_missing_marker_is_silent_noop() {
        let store = tempdir().expect("create store dir");
        let db_path = store.path().join("messages.db");
        let worktree = tempdir().expect("create worktree dir");

        assert!(!detect_session_end(
            &db_path,
            &payload(&worktree.path().to_string_lossy())
        ));
        assert!(!db_path.exists());
    }
}
