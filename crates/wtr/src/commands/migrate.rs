//! `wtr migrate` - apply or check store schema migrations.

use anyhow::Result;
use serde_json::json;
use wtr_core::Database;

use super::{fail, print_result};

pub fn execute(check: bool) -> Result<()> {
    let summary = Database::open().and_then(|db| {
        if check {
            db.migrate_check()
        } else {
            db.migrate()
        }
    });

    match summary {
        Ok(summary) => {
            print_result(&json!({
                "success": true,
                "from_version": summary.from_version,
                "version": summary.to_version,
                "applied": summary.applied,
                "pending": summary.pending,
            }));
            Ok(())
        }
        Err(err) => fail(json!({
            "status": "error",
            "error": err.to_string(),
        })),
    }
}
