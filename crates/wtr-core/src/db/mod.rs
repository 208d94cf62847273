//! Direct SQLite access for the message relay.
//!
//! Store location priority:
//! 1. WTR_DATABASE_PATH env var
//! 2. ~/.local/share/wtr/messages.db
//!
//! Every component opens a short-lived connection per operation; nothing
//! holds a connection across a blocking wait, so a multi-second wait never
//! holds a write lock.

pub mod migrations;
pub mod types;

pub use types::*;

use crate::config;
use crate::error::{Error, Result};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Alphabet for short id tokens (`orch_xxxxxxxx`, `msg_xxxxxxxx`).
const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 8;

/// Generate a short prefixed id token.
fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_LEN)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect();
    format!("{prefix}_{suffix}")
}

/// Whether the store file exists at its configured location.
pub fn store_exists() -> bool {
    config::db_path().exists()
}

/// Store connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the store at its configured location, creating parent dirs.
    pub fn open() -> Result<Self> {
        Self::open_path(&config::db_path())
    }

    /// Open the store at a specific path.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply pending schema migrations.
    pub fn migrate(&self) -> Result<migrations::MigrateSummary> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        migrations::run(&mut conn)
    }

    /// Report pending schema migrations without applying them.
    pub fn migrate_check(&self) -> Result<migrations::MigrateSummary> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        migrations::check(&mut conn)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Orchestrator Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new orchestrator session.
    pub fn create_orchestrator_session(&self, project_dir: &str) -> Result<OrchestratorSession> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = generate_id("orch");
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO orchestrator_sessions (id, project_dir, created_at)
             VALUES (?1, ?2, ?3)",
            params![id, project_dir, now],
        )?;

        Ok(OrchestratorSession {
            id,
            project_dir: project_dir.to_string(),
            created_at: now,
        })
    }

    /// Get an orchestrator session by id.
    pub fn get_orchestrator_session(&self, id: &str) -> Result<Option<OrchestratorSession>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, project_dir, created_at FROM orchestrator_sessions WHERE id = ?1",
        )?;

        Ok(stmt
            .query_row(params![id], Self::map_session)
            .optional()?)
    }

    fn map_session(row: &rusqlite::Row) -> rusqlite::Result<OrchestratorSession> {
        Ok(OrchestratorSession {
            id: row.get(0)?,
            project_dir: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Message Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a message addressed to an orchestrator.
    ///
    /// The orchestrator is looked up first so callers get a precise
    /// "not found" instead of a foreign-key violation.
    pub fn send_message(&self, input: &NewMessage) -> Result<Message> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let known: Option<String> = conn
            .query_row(
                "SELECT id FROM orchestrator_sessions WHERE id = ?1",
                params![input.orchestrator_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(Error::OrchestratorNotFound(input.orchestrator_id.clone()));
        }

        let id = generate_id("msg");
        let now = chrono::Utc::now().timestamp_millis();
        let content = serde_json::to_string(&input.content)?;

        conn.execute(
            "INSERT INTO messages (id, orchestrator_id, worker_id, message_type, content, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'unread', ?6)",
            params![
                id,
                input.orchestrator_id,
                input.worker_id,
                input.message_type,
                content,
                now
            ],
        )?;

        Ok(Message {
            id,
            orchestrator_id: input.orchestrator_id.clone(),
            worker_id: input.worker_id.clone(),
            message_type: input.message_type,
            content,
            status: MessageStatus::Unread,
            created_at: now,
        })
    }

    /// Atomically read all unread messages for an orchestrator in creation
    /// order and mark them read.
    ///
    /// Read-then-mark runs in a single transaction, so two pollers can never
    /// both receive the same message. A second immediate call returns empty.
    pub fn poll_messages(&self, orchestrator_id: &str) -> Result<Vec<Message>> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;

        let messages = {
            let mut stmt = tx.prepare(
                "SELECT id, orchestrator_id, worker_id, message_type, content, status, created_at
                 FROM messages
                 WHERE orchestrator_id = ?1 AND status = 'unread'
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            stmt.query_map(params![orchestrator_id], Self::map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        if !messages.is_empty() {
            let placeholders = vec!["?"; messages.len()].join(",");
            let sql = format!("UPDATE messages SET status = 'read' WHERE id IN ({placeholders})");
            let ids = messages.iter().map(|m| m.id.as_str());
            tx.execute(&sql, rusqlite::params_from_iter(ids))?;
        }

        tx.commit()?;
        Ok(messages)
    }

    /// Unread/total message counts for an orchestrator.
    pub fn orchestrator_status(&self, orchestrator_id: &str) -> Result<Option<OrchestratorStatus>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let session = conn
            .query_row(
                "SELECT id, project_dir, created_at FROM orchestrator_sessions WHERE id = ?1",
                params![orchestrator_id],
                Self::map_session,
            )
            .optional()?;
        let Some(session) = session else {
            return Ok(None);
        };

        let unread_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE orchestrator_id = ?1 AND status = 'unread'",
            params![orchestrator_id],
            |row| row.get(0),
        )?;
        let total_messages: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE orchestrator_id = ?1",
            params![orchestrator_id],
            |row| row.get(0),
        )?;

        Ok(Some(OrchestratorStatus {
            orchestrator_id: orchestrator_id.to_string(),
            unread_count,
            total_messages,
            created_at: session.created_at,
        }))
    }

    fn map_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get(0)?,
            orchestrator_id: row.get(1)?,
            worker_id: row.get(2)?,
            message_type: row.get(3)?,
            content: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retention Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete messages older than the retention window, then orchestrator
    /// sessions older than the cutoff with no remaining messages.
    ///
    /// Returns the number of messages deleted. Safe to call redundantly and
    /// concurrently with sends.
    pub fn cleanup_old_messages(&self, retention_days: i64) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let cutoff = chrono::Utc::now().timestamp_millis() - retention_days * 24 * 60 * 60 * 1000;

        let deleted = conn.execute(
            "DELETE FROM messages WHERE created_at < ?1",
            params![cutoff],
        )?;

        conn.execute(
            "DELETE FROM orchestrator_sessions
             WHERE created_at < ?1
               AND id NOT IN (SELECT DISTINCT orchestrator_id FROM messages)",
            params![cutoff],
        )?;

        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Spawned Worker Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a worker spawned for a branch (status starts active).
    pub fn create_spawned_worker(&self, input: &NewWorker) -> Result<SpawnedWorker> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO spawned_workers (orchestrator_id, branch, worktree_path, status, created_at)
             VALUES (?1, ?2, ?3, 'active', ?4)",
            params![input.orchestrator_id, input.branch, input.worktree_path, now],
        )?;

        Ok(SpawnedWorker {
            id: conn.last_insert_rowid(),
            orchestrator_id: input.orchestrator_id.clone(),
            branch: input.branch.clone(),
            worktree_path: input.worktree_path.clone(),
            status: WorkerStatus::Active,
            pr_url: None,
            created_at: now,
            completed_at: None,
        })
    }

    /// Look up a worker by its workspace path (most recent record wins).
    pub fn get_spawned_worker_by_path(&self, worktree_path: &str) -> Result<Option<SpawnedWorker>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, orchestrator_id, branch, worktree_path, status, pr_url, created_at, completed_at
             FROM spawned_workers
             WHERE worktree_path = ?1
             ORDER BY id DESC
             LIMIT 1",
        )?;

        Ok(stmt
            .query_row(params![worktree_path], Self::map_worker)
            .optional()?)
    }

    /// Transition a worker out of `active`.
    ///
    /// Only the row matching `worktree_path AND status = 'active'` is
    /// touched; the return value tells callers whether anything changed, so
    /// "transitioned" and "already transitioned / never existed" are both
    /// non-errors. The conditional update is what keeps the two independent
    /// detectors from double-transitioning the same worker.
    pub fn update_spawned_worker_status(
        &self,
        worktree_path: &str,
        status: WorkerStatus,
        pr_url: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = chrono::Utc::now().timestamp_millis();
        let completed_at =
            matches!(status, WorkerStatus::Completed | WorkerStatus::Ended).then_some(now);

        let changed = conn.execute(
            "UPDATE spawned_workers
             SET status = ?1,
                 pr_url = COALESCE(?2, pr_url),
                 completed_at = COALESCE(?3, completed_at)
             WHERE worktree_path = ?4 AND status = 'active'",
            params![status, pr_url, completed_at, worktree_path],
        )?;

        Ok(changed > 0)
    }

    fn map_worker(row: &rusqlite::Row) -> rusqlite::Result<SpawnedWorker> {
        Ok(SpawnedWorker {
            id: row.get(0)?,
            orchestrator_id: row.get(1)?,
            branch: row.get(2)?,
            worktree_path: row.get(3)?,
            status: row.get(4)?,
            pr_url: row.get(5)?,
            created_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_test_db() -> (Database, tempfile::TempDir) {
        let temp = tempdir().expect("create temp dir");
        let db = Database::open_path(&temp.path().join("messages.db")).expect("open store");
        db.migrate().expect("migrate");
        (db, temp)
    }

    fn content(summary: &str) -> MessageContent {
        MessageContent {
            summary: summary.to_string(),
            ..Default::default()
        }
    }

    fn new_message(orchestrator_id: &str, summary: &str) -> NewMessage {
        NewMessage {
            orchestrator_id: orchestrator_id.to_string(),
            worker_id: None,
            message_type: MessageType::TaskComplete,
            content: content(summary),
        }
    }

    #[test]
    fn test_create_and_get_session() {
        let (db, _temp) = open_test_db();

        let session = db
            .create_orchestrator_session("/proj")
            .expect("create session");
        assert!(session.id.starts_with("orch_"));
        assert_eq!(session.project_dir, "/proj");

        let fetched = db
            .get_orchestrator_session(&session.id)
            .expect("get session")
            .expect("session exists");
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.created_at, session.created_at);

        assert!(db
            .get_orchestrator_session("orch_missing")
            .expect("get missing")
            .is_none());
    }

    #[test]
    fn test_send_requires_known_orchestrator() {
        let (db, _temp) = open_test_db();

        let result = db.send_message(&new_message("orch_missing", "hello"));
        match result {
            Err(Error::OrchestratorNotFound(id)) => assert_eq!(id, "orch_missing"),
            other => panic!("expected OrchestratorNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_poll_returns_unread_in_order_then_empty() {
        let (db, _temp) = open_test_db();
        let session = db.create_orchestrator_session("/proj").expect("session");

        for summary in ["first", "second", "third"] {
            db.send_message(&new_message(&session.id, summary))
                .expect("send");
        }

        let polled = db.poll_messages(&session.id).expect("poll");
        let summaries: Vec<String> = polled
            .iter()
            .map(|m| {
                serde_json::from_str::<MessageContent>(&m.content)
                    .expect("parse content")
                    .summary
            })
            .collect();
        assert_eq!(summaries, ["first", "second", "third"]);
        assert!(polled.iter().all(|m| m.status == MessageStatus::Unread));

        // Read-state is sticky: an immediate second poll is empty.
        assert!(db.poll_messages(&session.id).expect("second poll").is_empty());
    }

    #[test]
    fn test_poll_is_scoped_to_one_orchestrator() {
        let (db, _temp) = open_test_db();
        let a = db.create_orchestrator_session("/a").expect("session a");
        let b = db.create_orchestrator_session("/b").expect("session b");

        db.send_message(&new_message(&a.id, "for a")).expect("send");
        db.send_message(&new_message(&b.id, "for b")).expect("send");

        let polled = db.poll_messages(&a.id).expect("poll a");
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].orchestrator_id, a.id);

        // b's message is untouched
        let status = db
            .orchestrator_status(&b.id)
            .expect("status")
            .expect("exists");
        assert_eq!(status.unread_count, 1);
    }

    #[test]
    fn test_status_counts() {
        let (db, _temp) = open_test_db();
        let session = db.create_orchestrator_session("/proj").expect("session");

        db.send_message(&new_message(&session.id, "one")).expect("send");
        db.send_message(&new_message(&session.id, "two")).expect("send");

        let status = db
            .orchestrator_status(&session.id)
            .expect("status")
            .expect("exists");
        assert_eq!(status.unread_count, 2);
        assert_eq!(status.total_messages, 2);

        db.poll_messages(&session.id).expect("poll");

        let status = db
            .orchestrator_status(&session.id)
            .expect("status")
            .expect("exists");
        assert_eq!(status.unread_count, 0);
        assert_eq!(status.total_messages, 2);

        assert!(db
            .orchestrator_status("orch_missing")
            .expect("status missing")
            .is_none());
    }

    #[test]
    fn test_worker_transition_is_idempotent() {
        let (db, _temp) = open_test_db();
        let session = db.create_orchestrator_session("/proj").expect("session");

        db.create_spawned_worker(&NewWorker {
            orchestrator_id: session.id.clone(),
            branch: "feat/x".to_string(),
            worktree_path: "/tmp/wt/feat-x".to_string(),
        })
        .expect("spawn");

        let first = db
            .update_spawned_worker_status(
                "/tmp/wt/feat-x",
                WorkerStatus::Completed,
                Some("https://github.com/o/r/pull/1"),
            )
            .expect("transition");
        assert!(first);

        // A late session-end signal must be a no-op.
        let second = db
            .update_spawned_worker_status("/tmp/wt/feat-x", WorkerStatus::Ended, None)
            .expect("late transition");
        assert!(!second);

        let worker = db
            .get_spawned_worker_by_path("/tmp/wt/feat-x")
            .expect("lookup")
            .expect("exists");
        assert_eq!(worker.status, WorkerStatus::Completed);
        assert_eq!(worker.pr_url.as_deref(), Some("https://github.com/o/r/pull/1"));
        assert!(worker.completed_at.is_some());
    }

    #[test]
    fn test_transition_unknown_path_is_noop() {
        let (db, _temp) = open_test_db();
        let changed = db
            .update_spawned_worker_status("/nowhere", WorkerStatus::Ended, None)
            .expect("transition");
        assert!(!changed);
    }

    #[test]
    fn test_cleanup_deletes_old_messages_and_orphaned_sessions() {
        let (db, _temp) = open_test_db();
        let old = db.create_orchestrator_session("/old").expect("session");
        let fresh = db.create_orchestrator_session("/fresh").expect("session");

        let old_msg = db.send_message(&new_message(&old.id, "stale")).expect("send");
        db.send_message(&new_message(&fresh.id, "recent")).expect("send");

        // Backdate the old session and its message past the retention window.
        let ten_days_ago = chrono::Utc::now().timestamp_millis() - 10 * 24 * 60 * 60 * 1000;
        {
            let conn = db.conn.lock().expect("lock");
            conn.execute(
                "UPDATE messages SET created_at = ?1 WHERE id = ?2",
                params![ten_days_ago, old_msg.id],
            )
            .expect("backdate message");
            conn.execute(
                "UPDATE orchestrator_sessions SET created_at = ?1 WHERE id = ?2",
                params![ten_days_ago, old.id],
            )
            .expect("backdate session");
        }

        let deleted = db.cleanup_old_messages(7).expect("cleanup");
        assert_eq!(deleted, 1);

        // The emptied old session is swept; the fresh one survives.
        assert!(db
            .get_orchestrator_session(&old.id)
            .expect("get old")
            .is_none());
        let status = db
            .orchestrator_status(&fresh.id)
            .expect("status")
            .expect("exists");
        assert_eq!(status.total_messages, 1);
    }

    #[test]
    fn test_cleanup_keeps_old_session_with_recent_messages() {
        let (db, _temp) = open_test_db();
        let session = db.create_orchestrator_session("/proj").expect("session");
        db.send_message(&new_message(&session.id, "recent")).expect("send");

        let ten_days_ago = chrono::Utc::now().timestamp_millis() - 10 * 24 * 60 * 60 * 1000;
        {
            let conn = db.conn.lock().expect("lock");
            conn.execute(
                "UPDATE orchestrator_sessions SET created_at = ?1 WHERE id = ?2",
                params![ten_days_ago, session.id],
            )
            .expect("backdate session");
        }

        let deleted = db.cleanup_old_messages(7).expect("cleanup");
        assert_eq!(deleted, 0);
        assert!(db
            .get_orchestrator_session(&session.id)
            .expect("get")
            .is_some());
    }

    #[test]
    fn test_generated_ids_are_prefixed_tokens() {
        let id = generate_id("msg");
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), "msg_".len() + ID_LEN);
        assert!(id["msg_".len()..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
