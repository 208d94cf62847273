//! Worker workspace helpers: the orchestrator marker file and branch lookup.
//!
//! Each spawned worker's workspace carries a marker at
//! `.wtr/orchestrator-id`, written once at spawn time and read by the
//! completion detectors. A missing marker means "not a spawned worker".

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::Result;

/// Relative path of the marker file inside a worker workspace.
pub const MARKER_PATH: &str = ".wtr/orchestrator-id";

/// Read the owning orchestrator's id from a workspace, if present.
pub fn read_orchestrator_id(workspace: &Path) -> Option<String> {
    let contents = fs::read_to_string(workspace.join(MARKER_PATH)).ok()?;
    let id = contents.trim().to_string();
    (!id.is_empty()).then_some(id)
}

/// Write the marker file, creating its directory. Done once at spawn time.
pub fn write_orchestrator_id(workspace: &Path, orchestrator_id: &str) -> Result<()> {
    let path = workspace.join(MARKER_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, orchestrator_id)?;
    Ok(())
}

/// Current git branch of a workspace, if it is a repository with a
/// non-detached HEAD.
pub fn current_branch(workspace: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["-C", &workspace.to_string_lossy(), "branch", "--show-current"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!branch.is_empty()).then_some(branch)
}
