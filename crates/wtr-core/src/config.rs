//! Store location and retention configuration.
//!
//! Store file resolution priority:
//! 1. WTR_DATABASE_PATH env var
//! 2. ~/.local/share/wtr/messages.db

use std::path::PathBuf;

/// Default retention window for messages, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Directory holding the message store.
pub fn data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".local/share/wtr")
}

/// Path to the SQLite message store.
pub fn db_path() -> PathBuf {
    if let Ok(path) = std::env::var("WTR_DATABASE_PATH") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    data_dir().join("messages.db")
}

/// Message retention in days (WTR_RETENTION_DAYS, default 7).
pub fn retention_days() -> i64 {
    std::env::var("WTR_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}
