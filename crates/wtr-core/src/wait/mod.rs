//! Blocking wait for relay messages.
//!
//! A wait call moves through: store pre-wait → fast-path poll → armed
//! (change watch + debounce + fallback poll + deadline) → resolved. All
//! watcher and timer state is owned by the call's own stack, so concurrent
//! waits share nothing but the store itself.
//!
//! The change watch is an indirect signal (the file changed, not which
//! rows); the fallback poll is the correctness backstop for platforms
//! where change notification is unreliable or silently fails, and stays
//! armed even though it looks redundant next to the watch.

use std::path::Path;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, warn};

use crate::config;
use crate::db::{Database, Message, MessageContent, MessageType};
use crate::error::{Error, Result};

/// Substituted when the caller passes no timeout or a non-positive one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
/// Hard cap on any requested timeout.
pub const MAX_TIMEOUT_SECS: u64 = 600;
/// Quiet period after a change event before re-polling.
const DEBOUNCE: Duration = Duration::from_millis(100);
/// Notification-independent re-poll interval.
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Store-existence poll interval during the pre-wait.
const STORE_CHECK_INTERVAL: Duration = Duration::from_secs(1);
/// Ceiling on waiting for the store file to appear.
const STORE_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalize a caller-requested timeout: the default for missing or
/// non-positive values, clamped to the maximum. Never fails.
pub fn normalize_timeout(timeout_seconds: Option<i64>) -> Duration {
    let secs = match timeout_seconds {
        Some(s) if s > 0 => (s as u64).min(MAX_TIMEOUT_SECS),
        _ => DEFAULT_TIMEOUT_SECS,
    };
    Duration::from_secs(secs)
}

/// A message as delivered to a waiting orchestrator, content parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolledMessage {
    pub id: String,
    pub message_type: MessageType,
    pub worker_id: Option<String>,
    pub content: MessageContent,
    pub created_at: i64,
}

/// Terminal state of a wait call. A timeout is a normal outcome, not an
/// error.
#[derive(Debug)]
pub enum WaitOutcome {
    Messages(Vec<PolledMessage>),
    TimedOut,
}

/// Wait until messages arrive for `orchestrator_id` or the (normalized)
/// timeout elapses, against the store at its configured location.
pub async fn wait_for_messages(
    orchestrator_id: &str,
    timeout_seconds: Option<i64>,
) -> Result<WaitOutcome> {
    wait_for_messages_at(&config::db_path(), orchestrator_id, timeout_seconds).await
}

/// Same as [`wait_for_messages`], against an explicit store path.
pub async fn wait_for_messages_at(
    db_path: &Path,
    orchestrator_id: &str,
    timeout_seconds: Option<i64>,
) -> Result<WaitOutcome> {
    if orchestrator_id.is_empty() {
        return Err(Error::Validation("orchestrator_id is required".to_string()));
    }

    let timeout = normalize_timeout(timeout_seconds);
    let started = Instant::now();

    // The store may not exist yet if no session has been created; the
    // pre-wait consumes part of the time budget.
    wait_for_store(db_path).await?;

    // Migrations run once up front; the re-polls below use plain
    // short-lived connections.
    let db = Database::open_path(db_path)?;
    db.migrate()?;
    if db.get_orchestrator_session(orchestrator_id)?.is_none() {
        return Err(Error::OrchestratorNotFound(orchestrator_id.to_string()));
    }

    // Fast path: messages already queued resolve without any wait machinery.
    let queued = db.poll_messages(orchestrator_id)?;
    if !queued.is_empty() {
        return Ok(WaitOutcome::Messages(parse_messages(queued)?));
    }
    drop(db);

    debug!("no queued messages for {orchestrator_id}, arming watch");
    let mut watch = ChangeWatch::arm(db_path);

    let deadline = sleep(timeout.saturating_sub(started.elapsed()));
    tokio::pin!(deadline);

    // The first fallback tick fires one full interval out, not immediately.
    let mut fallback = interval_at(Instant::now() + FALLBACK_POLL_INTERVAL, FALLBACK_POLL_INTERVAL);

    let debounce = sleep(Duration::ZERO);
    tokio::pin!(debounce);
    let mut debounce_armed = false;

    // Single resolution: the first ready arm returns, and returning drops
    // the watcher and timers, so no trigger can fire twice or outlive the
    // call.
    loop {
        tokio::select! {
            () = &mut deadline => {
                debug!("wait for {orchestrator_id} timed out");
                return Ok(WaitOutcome::TimedOut);
            }
            Some(()) = watch.rx.recv() => {
                // Coalesce bursts from a single logical write.
                debounce.as_mut().reset(Instant::now() + DEBOUNCE);
                debounce_armed = true;
            }
            () = &mut debounce, if debounce_armed => {
                debounce_armed = false;
                if let Some(messages) = poll_now(db_path, orchestrator_id)? {
                    return Ok(WaitOutcome::Messages(messages));
                }
            }
            _ = fallback.tick() => {
                if let Some(messages) = poll_now(db_path, orchestrator_id)? {
                    return Ok(WaitOutcome::Messages(messages));
                }
            }
        }
    }
}

/// Change-watch state for one armed wait call.
///
/// Dropping it closes the watch. Arming can fail on filesystems without
/// change notification; the wait then degrades to fallback polling only.
struct ChangeWatch {
    rx: mpsc::Receiver<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl ChangeWatch {
    fn arm(db_path: &Path) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if event.is_ok() {
                // A full channel already has a wakeup queued; dropping the
                // extra event is fine since any single one re-polls.
                let _ = tx.try_send(());
            }
        })
        .and_then(|mut watcher| {
            watcher.watch(db_path, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });

        let watcher = match watcher {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                warn!("change watch unavailable, falling back to polling: {err}");
                None
            }
        };

        Self {
            rx,
            _watcher: watcher,
        }
    }
}

/// Pre-wait for the store file to exist, up to a bounded ceiling.
async fn wait_for_store(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        return Ok(());
    }

    let started = Instant::now();
    while started.elapsed() < STORE_WAIT_TIMEOUT {
        sleep(STORE_CHECK_INTERVAL).await;
        if db_path.exists() {
            return Ok(());
        }
    }
    Err(Error::StoreUnavailable)
}

/// One re-poll over a fresh short-lived connection, so a multi-second wait
/// never holds a store lock.
fn poll_now(db_path: &Path, orchestrator_id: &str) -> Result<Option<Vec<PolledMessage>>> {
    let db = Database::open_path(db_path)?;
    let raw = db.poll_messages(orchestrator_id)?;
    if raw.is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_messages(raw)?))
}

fn parse_messages(raw: Vec<Message>) -> Result<Vec<PolledMessage>> {
    raw.into_iter()
        .map(|msg| {
            let content: MessageContent = serde_json::from_str(&msg.content)?;
            Ok(PolledMessage {
                id: msg.id,
                message_type: msg.message_type,
                worker_id: msg.worker_id,
                content,
                created_at: msg.created_at,
            })
        })
        .collect()
}
