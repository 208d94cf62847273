//! `wtr status` - print an orchestrator's message counts as JSON.

use anyhow::Result;
use serde_json::json;
use wtr_core::Database;

use super::{fail, print_result};

pub fn execute(orchestrator_id: Option<String>) -> Result<()> {
    let Some(orchestrator_id) = orchestrator_id.filter(|id| !id.is_empty()) else {
        fail(json!({
            "status": "error",
            "error": "--orchestrator-id is required",
        }))
    };

    let status = Database::open().and_then(|db| {
        db.migrate()?;
        db.orchestrator_status(&orchestrator_id)
    });

    match status {
        Ok(Some(status)) => {
            print_result(&json!({
                "success": true,
                "orchestrator_id": status.orchestrator_id,
                "unread_count": status.unread_count,
                "total_messages": status.total_messages,
                "created_at": status.created_at,
            }));
            Ok(())
        }
        Ok(None) => fail(json!({
            "status": "error",
            "error": format!("Orchestrator session not found: {orchestrator_id}"),
        })),
        Err(err) => fail(json!({
            "status": "error",
            "error": err.to_string(),
        })),
    }
}
