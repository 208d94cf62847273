//! `wtr wait` - block until relay messages arrive, print a JSON result.
//!
//! Exit codes: 0 for both `messages` and `timeout` outcomes, 1 for errors
//! and argument-validation failures.

use anyhow::Result;
use serde_json::json;
use wtr_core::wait::{wait_for_messages, WaitOutcome};

use super::{fail, print_result};

pub async fn execute(orchestrator_id: Option<String>, timeout: Option<i64>) -> Result<()> {
    let Some(orchestrator_id) = orchestrator_id.filter(|id| !id.is_empty()) else {
        fail(json!({
            "status": "error",
            "error": "--orchestrator-id is required",
        }))
    };

    let wait = wait_for_messages(&orchestrator_id, timeout);
    let outcome = tokio::select! {
        outcome = wait => outcome,
        () = shutdown_signal() => {
            // Dropping the wait future tears down its watcher and timers.
            return Ok(());
        }
    };

    match outcome {
        Ok(WaitOutcome::Messages(messages)) => {
            print_result(&json!({
                "status": "messages",
                "messages": messages,
            }));
            Ok(())
        }
        Ok(WaitOutcome::TimedOut) => {
            print_result(&json!({ "status": "timeout" }));
            Ok(())
        }
        Err(err) => fail(json!({
            "status": "error",
            "error": err.to_string(),
        })),
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
