//! Dialogs and the drop-file handoff.
//!
//! A dialog runs as a separate `corral dialog ...` process inside a tmux
//! popup. It reports back by writing a small JSON document (the drop-file)
//! into the profile directory; the panel polls for it, consumes it, and
//! deletes it. A missing file after the deadline counts as a cancel.

use std::fs;
use std::io::{BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CorralError, Result};
use crate::git::validate_branch_name;

/// What the user asked for in a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogMode {
    /// Start an assistant session in a new project directory.
    NewProject,
    /// Start another assistant session in an existing project.
    AddSession,
    /// Create a worktree and start an assistant session in it.
    Worktree,
    /// Open a plain shell.
    Terminal,
    Canceled,
}

/// Contents of the drop-file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogResult {
    #[serde(default)]
    pub dir: String,
    pub mode: DialogMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl DialogResult {
    pub fn canceled() -> Self {
        Self {
            dir: String::new(),
            mode: DialogMode::Canceled,
            branch: None,
        }
    }
}

/// Write `result` to `path` via a temp file and rename.
pub fn write_result(path: &Path, result: &DialogResult) -> Result<()> {
    let data =
        serde_json::to_string(result).map_err(|e| CorralError::json("Failed to serialize dialog result", e))?;
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).map_err(|e| CorralError::io(format!("Failed to write {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .map_err(|e| CorralError::io(format!("Failed to move {} into place", tmp.display()), e))
}

/// Write a canceled result unless the dialog already reported something.
pub fn write_canceled_if_absent(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    write_result(path, &DialogResult::canceled())
}

/// Read and delete the drop-file. Returns None if there is none yet.
pub fn take_result(path: &Path) -> Result<Option<DialogResult>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CorralError::io(format!("Failed to read {}", path.display()), e)),
    };
    if let Err(e) = fs::remove_file(path) {
        debug!(error = %e, "failed to remove dialog result");
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| CorralError::json("Failed to parse dialog result", e))
}

/// Remove a stale drop-file before opening a new dialog.
pub fn clear_result(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            debug!(error = %e, "failed to clear stale dialog result");
        }
    }
}

/// Outcome of one poll of a pending dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropPoll {
    Pending,
    Ready(DialogResult),
    /// The deadline passed with no result.
    Expired,
}

/// A dialog the panel is waiting on.
#[derive(Debug, Clone)]
pub struct DropFileWatch {
    path: PathBuf,
    deadline: Instant,
}

impl DropFileWatch {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn poll(&self) -> DropPoll {
        match take_result(&self.path) {
            Ok(Some(result)) => DropPoll::Ready(result),
            Ok(None) if Instant::now() >= self.deadline => DropPoll::Expired,
            Ok(None) => DropPoll::Pending,
            Err(e) => {
                warn!(error = %e, "unreadable dialog result, treating as canceled");
                DropPoll::Ready(DialogResult::canceled())
            }
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(input: &str) -> String {
    let Some(rest) = input.strip_prefix('~') else {
        return input.to_string();
    };
    if !(rest.is_empty() || rest.starts_with('/')) {
        return input.to_string();
    }
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => input.to_string(),
    }
}

fn read_answer(input: &mut impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| CorralError::io("Failed to read dialog input", e))?;
    if read == 0 {
        return Ok(None);
    }
    let answer = line.trim().to_string();
    Ok((!answer.is_empty()).then_some(answer))
}

fn prompt(output: &mut impl Write, text: &str) -> Result<()> {
    write!(output, "{}", text).map_err(|e| CorralError::io("Failed to write prompt", e))?;
    output.flush().map_err(|e| CorralError::io("Failed to write prompt", e))
}

/// Ask for a directory. An empty answer or end of input cancels.
///
/// `initial_dir` is used when the answer is `.`.
pub fn ask_directory(
    mode: DialogMode,
    initial_dir: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<DialogResult> {
    loop {
        let hint = if initial_dir.is_empty() {
            String::new()
        } else {
            format!(" [. = {}]", initial_dir)
        };
        prompt(output, &format!("Directory{}: ", hint))?;
        let Some(answer) = read_answer(input)? else {
            return Ok(DialogResult::canceled());
        };
        let dir = if answer == "." && !initial_dir.is_empty() {
            initial_dir.to_string()
        } else {
            expand_home(&answer)
        };
        if Path::new(&dir).is_dir() {
            return Ok(DialogResult {
                dir,
                mode,
                branch: None,
            });
        }
        prompt(output, &format!("Not a directory: {}\n", dir))?;
    }
}

/// Ask for a branch name for a new worktree of `repo_root`.
pub fn ask_branch(repo_root: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<DialogResult> {
    loop {
        prompt(output, "Branch: ")?;
        let Some(branch) = read_answer(input)? else {
            return Ok(DialogResult::canceled());
        };
        match validate_branch_name(&branch) {
            Ok(()) => {
                return Ok(DialogResult {
                    dir: repo_root.to_string(),
                    mode: DialogMode::Worktree,
                    branch: Some(branch),
                })
            }
            Err(e) => prompt(output, &format!("{}\n", e))?,
        }
    }
}
