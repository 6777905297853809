//! Pane lifecycle manager.
//!
//! Owns the session state and drives the multiplexer: creating sessions in
//! their own windows, swapping them into the viewport, tearing them down, and
//! the periodic reconcile/classify tick. Every user-facing operation reloads
//! the state file first and persists after, so several corral processes
//! (the sidebar panel, dialogs, one-shot commands) can share one profile.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CorralError, Result};
use crate::git::{repo_root_from_worktree_dir, GitCli, GitWorktrees, RepoInspector, WorktreeOps};
use crate::mux::layout::{is_placeholder, placeholder_command, SIDEBAR_SIGNATURE};
use crate::mux::Multiplexer;
use crate::session::reconcile::PRIMARY_WINDOW;
use crate::session::{Direction, Session, SessionKind, State, StateStore};
use crate::status::{acknowledge, Classifier};

/// Name given to assistant sessions created without one.
pub const DEFAULT_SESSION_NAME: &str = "New Session";

/// Commands the manager starts in panes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub assistant_command: Vec<String>,
    pub shell_command: Vec<String>,
    pub placeholder_command: Vec<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            assistant_command: split_command(&config.assistant_command, "claude"),
            shell_command: split_command(&config.shell, "/bin/sh"),
            placeholder_command: placeholder_command(),
        }
    }
}

fn split_command(raw: &str, fallback: &str) -> Vec<String> {
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        vec![fallback.to_string()]
    } else {
        parts
    }
}

/// Live positions of the sidebar and viewport in the primary window.
struct Layout {
    sidebar: String,
    viewport: String,
    /// The viewport is showing the placeholder rather than a session.
    placeholder: bool,
}

/// Coordinates the session store with a multiplexer.
pub struct Manager<M: Multiplexer> {
    mux: M,
    store: StateStore,
    state: State,
    classifier: Classifier,
    worktrees: Box<dyn WorktreeOps>,
    repo: Box<dyn RepoInspector>,
    settings: ManagerSettings,
}

impl<M: Multiplexer> Manager<M> {
    /// Build a manager with the git and lsof backed collaborators.
    pub fn new(mux: M, store: StateStore, settings: ManagerSettings) -> Result<Self> {
        let state = store.load()?;
        Ok(Self {
            mux,
            store,
            state,
            classifier: Classifier::default(),
            worktrees: Box::new(GitWorktrees),
            repo: Box::new(GitCli),
            settings,
        })
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_repo(mut self, repo: Box<dyn RepoInspector>) -> Self {
        self.repo = repo;
        self
    }

    pub fn with_worktrees(mut self, worktrees: Box<dyn WorktreeOps>) -> Self {
        self.worktrees = worktrees;
        self
    }

    pub fn mux(&self) -> &M {
        &self.mux
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn sessions(&self) -> &[Session] {
        &self.state.sessions
    }

    pub fn repo(&self) -> &dyn RepoInspector {
        self.repo.as_ref()
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.state)
    }

    /// Replace in-memory state with what is on disk.
    ///
    /// A viewport reference whose pane has died is dropped.
    pub fn reload(&mut self) -> Result<()> {
        self.state = self.store.load()?;
        if let Some(viewport) = self.state.viewport_pane.clone() {
            if !self.mux.pane_exists(&viewport) {
                debug!(pane = %viewport, "viewport pane no longer exists, clearing");
                self.state.viewport_pane = None;
            }
        }
        Ok(())
    }

    /// Record a freshly built layout.
    ///
    /// On a fresh server every previous pane is gone, so stored sessions are
    /// dropped as well.
    pub fn adopt_layout(&mut self, sidebar: &str, viewport: &str, fresh_server: bool) -> Result<()> {
        self.reload()?;
        if fresh_server {
            info!(dropped = self.state.sessions.len(), "fresh server, clearing stale sessions");
            self.state.sessions.clear();
            self.state.last_active_session = None;
        }
        self.state.sidebar_pane = Some(sidebar.to_string());
        self.state.viewport_pane = Some(viewport.to_string());
        self.state.enforce_layout_invariant();
        self.persist()
    }

    /// Locate the sidebar and viewport in the live primary window.
    ///
    /// Fails unless the window holds exactly two panes, one of them the
    /// sidebar. Updates the stored references on success.
    fn resolve_layout(&mut self) -> Result<Layout> {
        let panes = self.mux.list_panes()?;
        let primary: Vec<_> = panes.iter().filter(|p| p.window_index == PRIMARY_WINDOW).collect();
        if primary.len() != 2 {
            return Err(CorralError::LayoutViolation(format!(
                "primary window has {} panes, expected 2",
                primary.len()
            )));
        }

        let stored = self.state.sidebar_pane.as_deref();
        let sidebar = primary
            .iter()
            .find(|p| Some(p.pane_ref.as_str()) == stored)
            .or_else(|| primary.iter().find(|p| p.start_command.contains(SIDEBAR_SIGNATURE)))
            .map(|p| p.pane_ref.clone())
            .ok_or_else(|| CorralError::LayoutViolation("no sidebar pane in primary window".to_string()))?;
        let viewport = primary
            .iter()
            .find(|p| p.pane_ref != sidebar)
            .ok_or_else(|| CorralError::LayoutViolation("no viewport pane in primary window".to_string()))?;
        let placeholder = is_placeholder(viewport);
        let viewport = viewport.pane_ref.clone();

        self.state.sidebar_pane = Some(sidebar.clone());
        self.state.viewport_pane = Some(viewport.clone());
        Ok(Layout {
            sidebar,
            viewport,
            placeholder,
        })
    }

    /// Whether `pane` is the live viewport.
    ///
    /// A broken layout is only an error when `pane` sits in the primary
    /// window; anywhere else it can be killed without touching the layout.
    fn shows_in_viewport(&mut self, pane: &str) -> Result<bool> {
        match self.resolve_layout() {
            Ok(layout) => Ok(layout.viewport == pane),
            Err(e) => {
                let in_primary = self
                    .mux
                    .list_panes()?
                    .iter()
                    .any(|p| p.pane_ref == pane && p.window_index == PRIMARY_WINDOW);
                if in_primary {
                    return Err(e);
                }
                debug!(%pane, error = %e, "layout unresolved, pane is outside the primary window");
                Ok(false)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────

    /// Start an assistant session in `dir` and show it.
    pub fn create_session(&mut self, dir: &Path, name: &str) -> Result<Session> {
        self.reload()?;
        let project = self.repo.project_name(dir);
        let name = if name.is_empty() { DEFAULT_SESSION_NAME } else { name };
        let draft = Session::new(SessionKind::Assistant, "", project, name, dir.to_string_lossy());
        let command = self.settings.assistant_command.clone();
        let session = self.spawn(draft, &command)?;
        Ok(self.show_new(session))
    }

    /// Start a plain shell in `dir`, grouped under `project` when given.
    pub fn create_terminal(&mut self, dir: &Path, project: Option<&str>) -> Result<Session> {
        self.reload()?;
        let project = project
            .map(str::to_string)
            .unwrap_or_else(|| self.repo.project_name(dir));
        let draft = Session::new(SessionKind::Terminal, "", project, "", dir.to_string_lossy());
        let command = self.settings.shell_command.clone();
        let session = self.spawn(draft, &command)?;
        Ok(self.show_new(session))
    }

    /// Create a worktree for `branch` and start an assistant session in it.
    ///
    /// If the session cannot be started and recorded, the worktree is removed
    /// again and neither a pane nor a record is left behind.
    pub fn create_worktree_session(&mut self, repo_root: &Path, branch: &str) -> Result<Session> {
        self.reload()?;
        let project = self.repo.project_name(repo_root);
        let dir = self.worktrees.create(repo_root, branch)?;
        info!(branch, dir = %dir.display(), "created worktree");

        let mut draft = Session::new(SessionKind::Assistant, "", project, branch, dir.to_string_lossy());
        draft.is_worktree = true;
        draft.worktree_branch = branch.to_string();
        let command = self.settings.assistant_command.clone();

        match self.spawn(draft, &command) {
            Ok(session) => Ok(self.show_new(session)),
            Err(e) => {
                warn!(branch, error = %e, "worktree session failed, removing worktree");
                if let Err(cleanup) = self.worktrees.remove(repo_root, &dir) {
                    warn!(error = %cleanup, "worktree rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Open a window for `draft`, record it and persist.
    ///
    /// Rolls back both the window and the record if persisting fails.
    fn spawn(&mut self, mut session: Session, command: &[String]) -> Result<Session> {
        let label = if session.name.is_empty() { session.kind.default_name() } else { session.name.as_str() };
        let window_name = format!("{}/{}", session.project, label);
        let pane = self.mux.new_window(&window_name, Path::new(&session.directory), command)?;

        session.pane_ref = pane.clone();
        info!(session = %session.id, %pane, window = %window_name, "created session");
        self.state.add_session(session.clone());

        if let Err(e) = self.persist() {
            self.state.remove_session(&session.id);
            if let Err(kill) = self.mux.kill_pane(&pane) {
                warn!(%pane, error = %kill, "failed to clean up pane after persist failure");
            }
            return Err(e);
        }
        Ok(session)
    }

    /// Swap a freshly created session into view; a failure only costs focus.
    fn show_new(&mut self, session: Session) -> Session {
        if let Err(e) = self.switch_to(&session.id) {
            warn!(session = %session.id, error = %e, "new session created but not shown");
        }
        self.state.find_by_id(&session.id).cloned().unwrap_or(session)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Switching and teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Bring a session into the viewport and focus it.
    pub fn switch_to(&mut self, id: &str) -> Result<()> {
        self.reload()?;
        let pane = self
            .state
            .find_by_id(id)
            .map(|s| s.pane_ref.clone())
            .ok_or_else(|| CorralError::SessionNotFound(id.to_string()))?;
        if !self.mux.pane_exists(&pane) {
            return Err(CorralError::PaneGone(pane));
        }

        let snapshot = self.state.clone();
        let layout = match self.resolve_layout() {
            Ok(layout) => layout,
            Err(e) => {
                self.state = snapshot;
                return Err(e);
            }
        };
        let Layout {
            sidebar,
            viewport,
            placeholder,
        } = layout;
        if pane == sidebar {
            self.state = snapshot;
            return Err(CorralError::LayoutViolation(format!(
                "refusing to swap sidebar pane {} into the viewport",
                pane
            )));
        }

        if pane != viewport {
            if let Err(e) = self.mux.swap_panes(&pane, &viewport) {
                self.state = snapshot;
                return Err(e);
            }
            debug!(%pane, old = %viewport, "swapped into viewport");
            self.state.viewport_pane = Some(pane.clone());

            // The old viewport pane now sits in the session's old window
            if placeholder {
                if let Err(e) = self.mux.kill_pane(&viewport) {
                    debug!(pane = %viewport, error = %e, "failed to discard placeholder pane");
                }
            } else if self.state.find_by_pane(&viewport).is_none() {
                info!(pane = %viewport, "untracked pane moved out of the viewport, leaving it for adoption");
            }
        }

        if let Err(e) = self.mux.select_pane(&pane) {
            debug!(%pane, error = %e, "select-pane failed");
        }
        self.state.last_active_session = Some(id.to_string());
        if let Some(session) = self.state.find_by_id_mut(id) {
            session.status = acknowledge(session.status);
        }
        self.persist()
    }

    /// Stop a session and destroy its pane.
    ///
    /// A session on screen is replaced in the viewport before its pane is
    /// destroyed; with nothing left to show, its pane becomes the placeholder.
    /// On error the in-memory state is left as it was.
    pub fn kill_session(&mut self, id: &str) -> Result<()> {
        self.reload()?;
        let snapshot = self.state.clone();
        match self.kill_inner(id) {
            Ok(removed) => {
                if removed.is_worktree {
                    self.remove_worktree(&removed);
                }
                Ok(())
            }
            Err(e) => {
                self.state = snapshot;
                Err(e)
            }
        }
    }

    fn kill_inner(&mut self, id: &str) -> Result<Session> {
        let session = self
            .state
            .find_by_id(id)
            .cloned()
            .ok_or_else(|| CorralError::SessionNotFound(id.to_string()))?;
        let pane = session.pane_ref.clone();

        let pane_live = self.mux.pane_exists(&pane);
        let in_viewport = pane_live && self.shows_in_viewport(&pane)?;

        self.state.remove_session(id);
        if self.state.last_active_session.as_deref() == Some(id) {
            self.state.last_active_session = None;
        }

        if !pane_live {
            if self.state.viewport_pane.as_deref() == Some(pane.as_str()) {
                self.state.viewport_pane = None;
            }
        } else if self.state.find_by_pane(&pane).is_some() {
            warn!(%pane, "pane still referenced by another session, not killing");
        } else if in_viewport {
            match self.replacement_for(&pane) {
                Some((replacement_id, replacement_pane)) => {
                    self.mux.swap_panes(&replacement_pane, &pane)?;
                    if let Err(e) = self.mux.kill_pane(&pane) {
                        warn!(%pane, error = %e, "failed to kill pane after swap");
                    }
                    if let Err(e) = self.mux.select_pane(&replacement_pane) {
                        debug!(pane = %replacement_pane, error = %e, "select-pane failed");
                    }
                    info!(session = %replacement_id, pane = %replacement_pane, "replacement swapped into viewport");
                    self.state.viewport_pane = Some(replacement_pane);
                    if let Some(s) = self.state.find_by_id_mut(&replacement_id) {
                        s.status = acknowledge(s.status);
                    }
                    self.state.last_active_session = Some(replacement_id);
                }
                None => {
                    self.mux.respawn_pane(&pane, &self.settings.placeholder_command)?;
                    info!(%pane, "no sessions left, showing placeholder");
                    self.state.last_active_session = None;
                }
            }
        } else {
            self.mux.kill_pane(&pane)?;
        }

        info!(session = %id, %pane, "killed session");
        self.persist()?;
        Ok(session)
    }

    /// Session to show after the one in `pane` goes away: the last active
    /// session if it is still live, else the first live one.
    fn replacement_for(&self, pane: &str) -> Option<(String, String)> {
        let live = |s: &&Session| s.pane_ref != pane && self.mux.pane_exists(&s.pane_ref);
        self.state
            .last_active_session
            .as_deref()
            .and_then(|id| self.state.find_by_id(id))
            .filter(live)
            .or_else(|| self.state.sessions.iter().find(live))
            .map(|s| (s.id.clone(), s.pane_ref.clone()))
    }

    fn remove_worktree(&self, session: &Session) {
        let Some(root) = repo_root_from_worktree_dir(&session.directory) else {
            return;
        };
        match self.worktrees.remove(&root, Path::new(&session.directory)) {
            Ok(()) => info!(dir = %session.directory, "removed worktree"),
            Err(e) => warn!(dir = %session.directory, error = %e, "failed to remove worktree"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Prune dead sessions and adopt orphaned assistant panes.
    pub fn reconcile(&mut self) -> Result<bool> {
        self.reload()?;
        let live = self.mux.list_panes()?;

        let mut layout_panes = HashSet::new();
        if let Some(sidebar) = &self.state.sidebar_pane {
            layout_panes.insert(sidebar.clone());
        }
        if let Some(viewport) = &self.state.viewport_pane {
            if !self.state.viewport_is_occupied() {
                layout_panes.insert(viewport.clone());
            }
        }

        let changed = self.state.reconcile(&live, &layout_panes, self.repo.as_ref());
        if changed {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Reclassify every session. Persists and returns true if anything moved.
    pub fn refresh_status(&mut self) -> Result<bool> {
        let viewport = self.state.viewport_pane.clone();
        let mut changed = false;
        for idx in 0..self.state.sessions.len() {
            let obs = self
                .classifier
                .observe(&self.mux, &self.state.sessions[idx], viewport.as_deref());
            let session = &mut self.state.sessions[idx];
            if session.status != obs.status {
                debug!(session = %session.id, from = ?session.status, to = ?obs.status, "status changed");
            }
            if session.status != obs.status || session.title != obs.title || session.service_port != obs.service_port {
                session.status = obs.status;
                session.title = obs.title;
                session.service_port = obs.service_port;
                changed = true;
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(changed)
    }

    /// One maintenance pass: reconcile, then reclassify.
    ///
    /// Failures are logged rather than returned so the loop keeps running.
    pub fn tick(&mut self) -> bool {
        let reconciled = self.reconcile().unwrap_or_else(|e| {
            warn!(error = %e, "reconcile failed");
            false
        });
        let refreshed = self.refresh_status().unwrap_or_else(|e| {
            warn!(error = %e, "status refresh failed");
            false
        });
        reconciled || refreshed
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ordering
    // ─────────────────────────────────────────────────────────────────────

    pub fn move_session(&mut self, id: &str, direction: Direction) -> Result<bool> {
        self.reload()?;
        if self.state.find_by_id(id).is_none() {
            return Err(CorralError::SessionNotFound(id.to_string()));
        }
        let moved = self.state.move_session(id, direction);
        if moved {
            self.persist()?;
        }
        Ok(moved)
    }

    pub fn move_project(&mut self, project: &str, direction: Direction) -> Result<bool> {
        self.reload()?;
        let moved = self.state.move_project(project, direction);
        if moved {
            self.persist()?;
        }
        Ok(moved)
    }
}
