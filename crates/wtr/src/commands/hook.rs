//! `wtr hook` - detector entry points invoked by the host's hooks.
//!
//! The payload arrives on stdin. A detector must never fail the hook it
//! runs inside: malformed input and internal errors are logged and the
//! exit code is always 0.

use std::io::Read;

use anyhow::Result;
use tracing::{debug, warn};
use wtr_core::config;
use wtr_core::hooks::{detect_pr_completion, detect_session_end, HookPayload, SessionEndPayload};

use crate::cli::{HookAction, HookCommand};

pub fn execute(cmd: HookCommand) -> Result<()> {
    let mut input = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut input) {
        warn!("failed to read hook payload: {err}");
        return Ok(());
    }
    if input.trim().is_empty() {
        return Ok(());
    }

    let db_path = config::db_path();
    match cmd.action {
        HookAction::PrCompletion => match serde_json::from_str::<HookPayload>(&input) {
            Ok(payload) => {
                detect_pr_completion(&db_path, &payload);
            }
            Err(err) => debug!("ignoring malformed hook payload: {err}"),
        },
        HookAction::SessionEnd => match serde_json::from_str::<SessionEndPayload>(&input) {
            Ok(payload) => {
                detect_session_end(&db_path, &payload);
            }
            Err(err) => debug!("ignoring malformed hook payload: {err}"),
        },
    }

    Ok(())
}
