//! Reconciliation of stored sessions against live panes.
//!
//! A pass prunes sessions whose pane has died, adopts assistant panes the
//! store does not know about, and tags sessions that live in managed
//! worktrees. After a manager crash this is what puts every surviving pane
//! back under management.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use super::{Session, SessionKind, State, Status};
use crate::git::{is_worktree_dir, RepoInspector};

/// Window that holds the sidebar and viewport; never scanned for adoption.
pub const PRIMARY_WINDOW: u32 = 0;

/// Substring identifying an assistant process in a pane's commands.
pub const ASSISTANT_SIGNATURE: &str = "claude";

/// Name given to adopted panes with neither a title nor a directory.
const RECOVERED_NAME: &str = "Recovered Session";

/// Snapshot of one multiplexer pane, taken fresh on every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivePane {
    pub pane_ref: String,
    pub window_index: u32,
    pub current_command: String,
    pub start_command: String,
    pub current_path: String,
    /// Already cleaned; empty when the title carries no information.
    pub title: String,
}

impl LivePane {
    /// Whether either of the pane's commands looks like the assistant.
    pub fn runs_assistant(&self) -> bool {
        [&self.current_command, &self.start_command]
            .iter()
            .any(|cmd| cmd.to_lowercase().contains(ASSISTANT_SIGNATURE))
    }

    fn derived_name(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        Path::new(&self.current_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| RECOVERED_NAME.to_string())
    }
}

impl State {
    /// Reconcile stored sessions against `live` panes.
    ///
    /// `layout_panes` holds the sidebar, plus the viewport when it shows the
    /// placeholder rather than a tracked session. Returns true if anything
    /// changed.
    pub fn reconcile(
        &mut self,
        live: &[LivePane],
        layout_panes: &HashSet<String>,
        repo: &dyn RepoInspector,
    ) -> bool {
        let mut changed = false;

        let live_set: HashSet<&str> = live.iter().map(|p| p.pane_ref.as_str()).collect();
        let before = self.sessions.len();
        self.sessions.retain(|s| {
            let alive = live_set.contains(s.pane_ref.as_str());
            if !alive {
                info!(session = %s.id, name = %s.name, pane = %s.pane_ref, "pruning session, pane is gone");
            }
            alive
        });
        if self.sessions.len() != before {
            changed = true;
            if let Some(active) = self.last_active_session.as_deref() {
                if self.find_by_id(active).is_none() {
                    self.last_active_session = None;
                }
            }
        }

        let tracked: HashSet<String> = self.sessions.iter().map(|s| s.pane_ref.clone()).collect();
        for pane in live {
            if tracked.contains(&pane.pane_ref)
                || layout_panes.contains(&pane.pane_ref)
                || pane.window_index == PRIMARY_WINDOW
                || !pane.runs_assistant()
            {
                continue;
            }

            let dir = Path::new(&pane.current_path);
            let mut session = Session::new(
                SessionKind::Assistant,
                pane.pane_ref.clone(),
                repo.project_name(dir),
                pane.derived_name(),
                pane.current_path.clone(),
            );
            session.status = Status::Idle;
            info!(session = %session.id, pane = %pane.pane_ref, name = %session.name, "adopted orphan pane");
            self.add_session(session);
            changed = true;
        }

        for session in &mut self.sessions {
            if session.is_worktree || !is_worktree_dir(&session.directory) {
                continue;
            }
            session.is_worktree = true;
            if let Some(branch) = repo.branch(Path::new(&session.directory)) {
                debug!(session = %session.id, %branch, "tagged worktree session");
                session.name = branch.clone();
                session.worktree_branch = branch;
            }
            changed = true;
        }

        changed
    }
}
