//! Git worktree operations.
//!
//! Worktree sessions live under `<repo>/.worktrees/<branch>`, with slashes in
//! the branch name replaced by hyphens. The directory naming doubles as the
//! marker reconciliation uses to recognise worktree-backed sessions.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{CorralError, Result};

/// Directory under the repository root that holds managed worktrees.
pub const WORKTREES_DIR: &str = ".worktrees";

/// Creates and removes the worktrees behind worktree sessions.
pub trait WorktreeOps {
    /// Materialize a worktree for `branch`, creating the branch if absent.
    ///
    /// Returns the worktree directory.
    fn create(&self, repo_root: &Path, branch: &str) -> Result<PathBuf>;

    /// Force-remove the worktree at `dir` and prune stale entries.
    fn remove(&self, repo_root: &Path, dir: &Path) -> Result<()>;
}

/// [`WorktreeOps`] backed by `git worktree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitWorktrees;

impl WorktreeOps for GitWorktrees {
    fn create(&self, repo_root: &Path, branch: &str) -> Result<PathBuf> {
        validate_branch_name(branch).map_err(CorralError::Worktree)?;

        let dir = worktree_dir(repo_root, branch);
        let dir_arg = dir.to_string_lossy().into_owned();

        // Try a new branch first; fall back to checking out an existing one
        if let Err(new_branch_err) = run_git(repo_root, &["worktree", "add", "-b", branch, &dir_arg]) {
            debug!(branch, error = %new_branch_err, "worktree add -b failed, retrying with existing branch");
            run_git(repo_root, &["worktree", "add", &dir_arg, branch])?;
        }

        Ok(dir)
    }

    fn remove(&self, repo_root: &Path, dir: &Path) -> Result<()> {
        let dir_arg = dir.to_string_lossy().into_owned();
        run_git(repo_root, &["worktree", "remove", "--force", &dir_arg])?;
        if let Err(e) = run_git(repo_root, &["worktree", "prune"]) {
            debug!(error = %e, "worktree prune failed");
        }
        Ok(())
    }
}

fn run_git(repo_root: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(args)
        .output()
        .map_err(|e| CorralError::Worktree(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CorralError::Worktree(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(())
}

/// Compute the worktree path for `branch` under `repo_root`.
pub fn worktree_dir(repo_root: &Path, branch: &str) -> PathBuf {
    repo_root.join(WORKTREES_DIR).join(branch.replace('/', "-"))
}

/// Whether `dir` sits inside a managed worktree directory.
pub fn is_worktree_dir(dir: &str) -> bool {
    dir.contains(&marker())
}

/// Extract the repository root from a managed worktree path.
pub fn repo_root_from_worktree_dir(dir: &str) -> Option<PathBuf> {
    dir.find(&marker()).map(|idx| PathBuf::from(&dir[..idx]))
}

fn marker() -> String {
    format!("/{}/", WORKTREES_DIR)
}

/// Substrings `git check-ref-format` refuses anywhere in a branch name.
const FORBIDDEN: &[&str] = &["..", "//", "@{", " ", "~", "^", ":", "\\", "?", "*", "["];

/// Check `name` against the ref-format rules a new worktree branch must meet.
///
/// The error names the first rule broken, for display in the branch dialog.
pub fn validate_branch_name(name: &str) -> std::result::Result<(), String> {
    let broken = if name.is_empty() {
        Some("is empty".to_string())
    } else if name == "@" {
        Some("cannot be '@'".to_string())
    } else if let Some(c) = name.chars().next().filter(|c| matches!(c, '-' | '.')) {
        Some(format!("cannot start with '{}'", c))
    } else if let Some(suffix) = [".lock", ".", "/"].into_iter().find(|s| name.ends_with(*s)) {
        Some(format!("cannot end with '{}'", suffix))
    } else if let Some(bad) = FORBIDDEN.iter().find(|s| name.contains(**s)) {
        Some(format!("cannot contain '{}'", bad))
    } else if name.chars().any(char::is_control) {
        Some("cannot contain control characters".to_string())
    } else {
        None
    };
    match broken {
        Some(rule) => Err(format!("Branch name {}", rule)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_dir_flattens_branch_slashes() {
        assert_eq!(
            worktree_dir(Path::new("/work/app"), "feature/login"),
            PathBuf::from("/work/app/.worktrees/feature-login")
        );
    }

    #[test]
    fn worktree_dir_detection_and_repo_root() {
        let dir = "/work/app/.worktrees/feature-login";
        assert!(is_worktree_dir(dir));
        assert_eq!(
            repo_root_from_worktree_dir(dir),
            Some(PathBuf::from("/work/app"))
        );

        assert!(!is_worktree_dir("/work/app/src"));
        assert_eq!(repo_root_from_worktree_dir("/work/app/src"), None);
    }

    #[test]
    fn branch_names_follow_ref_format() {
        assert!(validate_branch_name("feature/add-login").is_ok());
        assert!(validate_branch_name("fix_123").is_ok());
        assert_eq!(validate_branch_name(""), Err("Branch name is empty".to_string()));
        assert_eq!(validate_branch_name("wip.lock"), Err("Branch name cannot end with '.lock'".to_string()));
        assert_eq!(validate_branch_name("a b"), Err("Branch name cannot contain ' '".to_string()));
        for bad in ["-x", ".x", "x/", "a..b", "a@{b", "@", "a\tb"] {
            assert!(validate_branch_name(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn create_rejects_invalid_branch_before_touching_git() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitWorktrees.create(dir.path(), "bad..name").unwrap_err();
        assert!(matches!(err, CorralError::Worktree(_)));
        assert!(!dir.path().join(WORKTREES_DIR).exists());
    }
}
