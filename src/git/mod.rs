//! Git integration for corral.
//!
//! This module answers repository questions about a session's working
//! directory (root, project name, branch) and manages the worktrees that back
//! worktree sessions.

mod worktree;

use std::path::Path;
use std::process::Command;

pub use worktree::{
    is_worktree_dir, repo_root_from_worktree_dir, validate_branch_name, worktree_dir,
    GitWorktrees, WorktreeOps, WORKTREES_DIR,
};

/// Repository lookups used when naming and grouping sessions.
///
/// The manager and the reconciliation pass only depend on this trait so tests
/// can answer without a real git checkout.
pub trait RepoInspector {
    /// Absolute path of the repository root containing `dir`, if any.
    fn repo_root(&self, dir: &Path) -> Option<String>;

    /// Current branch checked out in `dir`, if any.
    fn branch(&self, dir: &Path) -> Option<String>;

    /// Grouping key for sessions started in `dir`: the repository name, or the
    /// directory's own name outside a repository.
    fn project_name(&self, dir: &Path) -> String {
        let root = self.repo_root(dir);
        let base = root.as_deref().map(Path::new).unwrap_or(dir);
        base.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.to_string_lossy().into_owned())
    }
}

/// [`RepoInspector`] backed by the `git` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl RepoInspector for GitCli {
    fn repo_root(&self, dir: &Path) -> Option<String> {
        git_output(dir, &["rev-parse", "--show-toplevel"])
    }

    fn branch(&self, dir: &Path) -> Option<String> {
        git_output(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
    }
}

/// Run git in `dir` and return trimmed stdout, or None on any failure.
fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRoot(Option<&'static str>);

    impl RepoInspector for FixedRoot {
        fn repo_root(&self, _dir: &Path) -> Option<String> {
            self.0.map(str::to_string)
        }

        fn branch(&self, _dir: &Path) -> Option<String> {
            None
        }
    }

    #[test]
    fn project_name_uses_repo_root_basename() {
        let inspector = FixedRoot(Some("/work/webapp"));
        assert_eq!(
            inspector.project_name(Path::new("/work/webapp/src/bin")),
            "webapp"
        );
    }

    #[test]
    fn project_name_falls_back_to_directory_basename() {
        let inspector = FixedRoot(None);
        assert_eq!(inspector.project_name(Path::new("/tmp/scratch")), "scratch");
    }

    #[test]
    fn git_cli_returns_none_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitCli.repo_root(dir.path()).is_none());
        assert!(GitCli.branch(dir.path()).is_none());
    }
}
