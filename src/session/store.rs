//! Crash-tolerant persistence for the state document.
//!
//! Load falls back from the primary file to its `.bak` copy and finally to an
//! empty state; a primary that fails to parse is archived as
//! `<path>.corrupt.<timestamp>` first. Save copies the primary to `.bak`,
//! stages the new document in `<path>.tmp` and renames it into place, so a
//! concurrent reader sees either the old or the new document in full.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use super::State;
use crate::error::{CorralError, Result};

/// Owns the location of one state file and its siblings.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, recovering from a missing or corrupt primary file.
    pub fn load(&self) -> Result<State> {
        let mut state = load_state(&self.path)?;
        if state.enforce_layout_invariant() {
            warn!(path = %self.path.display(), "sidebar and viewport panes collided, viewport discarded");
        }
        Ok(state)
    }

    /// Atomically replace the state file.
    pub fn save(&self, state: &State) -> Result<()> {
        save_state(&self.path, state)
    }
}

/// Sibling path with `suffix` appended to the full file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, ".bak")
}

fn temp_path(path: &Path) -> PathBuf {
    sibling(path, ".tmp")
}

/// Read the state file at `path`.
pub fn load_state(path: &Path) -> Result<State> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(load_from_backup(path)),
        Err(e) => {
            return Err(CorralError::io(
                format!("Failed to read state file {}", path.display()),
                e,
            ))
        }
    };

    match serde_json::from_str::<State>(&content) {
        Ok(state) => Ok(state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file is corrupt, falling back to backup");
            archive_corrupt(path);
            Ok(load_from_backup(path))
        }
    }
}

/// Load the `.bak` copy, or an empty state if it is missing or unreadable.
fn load_from_backup(path: &Path) -> State {
    let bak = backup_path(path);
    let Ok(content) = fs::read_to_string(&bak) else {
        debug!(path = %bak.display(), "no backup state, starting empty");
        return State::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %bak.display(), error = %e, "backup state is corrupt, starting empty");
        State::default()
    })
}

/// Rename a corrupt state file aside for postmortem. Best-effort.
fn archive_corrupt(path: &Path) {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let archived = sibling(path, &format!(".corrupt.{}", stamp));
    if let Err(e) = fs::rename(path, &archived) {
        warn!(path = %path.display(), error = %e, "failed to archive corrupt state file");
    } else {
        warn!(archived = %archived.display(), "archived corrupt state file");
    }
}

/// Write `state` to `path` via backup copy, temp file and rename.
pub fn save_state(path: &Path, state: &State) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            CorralError::io(
                format!("Failed to create state directory {}", parent.display()),
                e,
            )
        })?;
    }

    // Copy rather than rename so the primary is never briefly absent
    if path.exists() {
        if let Err(e) = fs::copy(path, backup_path(path)) {
            debug!(error = %e, "state backup failed");
        }
    }

    let content =
        serde_json::to_string_pretty(state).map_err(|e| CorralError::json("Failed to serialize state", e))?;

    let tmp = temp_path(path);
    fs::write(&tmp, content)
        .map_err(|e| CorralError::io(format!("Failed to write {}", tmp.display()), e))?;
    fs::rename(&tmp, path).map_err(|e| {
        CorralError::io(
            format!("Failed to move {} into place", tmp.display()),
            e,
        )
    })?;

    Ok(())
}
