//! Forward-only schema migrations keyed on `PRAGMA user_version`.
//!
//! Every entry point runs [`run`] before using the store; a current store
//! is a cheap no-op. Each step applies inside its own transaction and bumps
//! the version marker, so a failed step leaves the previous version intact.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

/// Ordered migration steps: (target version, embedded SQL).
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("sql/001_init.sql"))];

/// Latest schema version this build knows about.
pub const LATEST_VERSION: i64 = 1;

/// Summary of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrateSummary {
    /// Steps applied in this run.
    pub applied: usize,
    /// Versions that were (or would be) applied.
    pub pending: Vec<i64>,
    /// Store version before the run.
    pub from_version: i64,
    /// Store version after the run.
    pub to_version: i64,
}

fn schema_version(conn: &Connection) -> Result<i64> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Apply all migrations newer than the store's current version.
pub fn run(conn: &mut Connection) -> Result<MigrateSummary> {
    migrate(conn, false)
}

/// Report pending migrations without applying them.
pub fn check(conn: &mut Connection) -> Result<MigrateSummary> {
    migrate(conn, true)
}

fn migrate(conn: &mut Connection, check_only: bool) -> Result<MigrateSummary> {
    let from_version = schema_version(conn)?;
    let mut summary = MigrateSummary {
        from_version,
        to_version: from_version,
        ..Default::default()
    };

    for &(version, sql) in MIGRATIONS {
        if version <= from_version {
            continue;
        }
        summary.pending.push(version);
        if check_only {
            continue;
        }

        debug!("applying migration {version}");
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;

        summary.applied += 1;
        summary.to_version = version;
    }

    if summary.applied > 0 {
        info!(
            "applied {} migration(s), store at version {}",
            summary.applied, summary.to_version
        );
    }

    Ok(summary)
}
