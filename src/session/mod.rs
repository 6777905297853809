//! Tracked sessions and the persisted state document.
//!
//! This module provides:
//! - `Session` - one tracked subprocess and the pane it lives in
//! - `State` - the ordered session list plus layout pane references
//! - `store` - crash-tolerant load/save of the state file
//! - `project` - the derived project grouping and reordering
//! - `reconcile` - pruning and adoption against live panes

pub mod project;
pub mod reconcile;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use project::{Direction, ProjectGroup};
pub use reconcile::LivePane;
pub use store::StateStore;

/// Default multiplexer socket label written into fresh state.
pub const DEFAULT_SOCKET_LABEL: &str = "corral";

/// Runtime phase of a tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Assistant is generating, or a terminal has a foreground command.
    Running,
    /// Assistant is waiting on a permission or confirmation prompt.
    Input,
    /// Assistant is at its prompt.
    Idle,
    /// Assistant finished while the user was looking elsewhere.
    Done,
    /// Assistant finished a plan and is waiting for approval.
    PlanReady,
    /// Terminal sitting at its shell prompt.
    Shell,
    /// Terminal running something that listens on a TCP port.
    Service,
    /// The pane is gone.
    Exited,
}

impl Status {
    /// Whether this status is an unacknowledged completion flag.
    pub fn needs_attention(self) -> bool {
        matches!(self, Status::Done | Status::PlanReady)
    }

    /// Short label for plain-text listings.
    pub fn label(self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Input => "input",
            Status::Idle => "idle",
            Status::Done => "done",
            Status::PlanReady => "plan",
            Status::Shell => "shell",
            Status::Service => "service",
            Status::Exited => "exited",
        }
    }
}

/// What kind of subprocess a session wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// An AI coding-assistant session.
    #[default]
    Assistant,
    /// A plain interactive shell.
    Terminal,
}

impl SessionKind {
    /// Status a freshly created session of this kind starts in.
    pub fn initial_status(self) -> Status {
        match self {
            SessionKind::Assistant => Status::Running,
            SessionKind::Terminal => Status::Shell,
        }
    }

    /// Fallback display name when neither title nor name is set.
    pub fn default_name(self) -> &'static str {
        match self {
            SessionKind::Assistant => "Claude",
            SessionKind::Terminal => "Terminal",
        }
    }
}

/// One tracked interactive subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique, immutable identifier.
    pub id: String,
    /// Multiplexer pane hosting the process; the join key to live state.
    pub pane_ref: String,
    /// Grouping key, usually the repository name.
    pub project: String,
    /// Static label.
    pub name: String,
    /// Dynamic label from the subprocess's terminal title.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Working directory at creation.
    pub directory: String,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    #[serde(default)]
    pub kind: SessionKind,
    /// Listening TCP port detected under a terminal session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_worktree: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub worktree_branch: String,
}

impl Session {
    /// Build a new session record in its kind's initial status.
    pub fn new(
        kind: SessionKind,
        pane_ref: impl Into<String>,
        project: impl Into<String>,
        name: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pane_ref: pane_ref.into(),
            project: project.into(),
            name: name.into(),
            title: String::new(),
            directory: directory.into(),
            created_at: Utc::now(),
            status: kind.initial_status(),
            kind,
            service_port: None,
            is_worktree: false,
            worktree_branch: String::new(),
        }
    }

    /// Name to show: the live title, then the static name, then the kind default.
    pub fn display_name(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.name.is_empty() {
            &self.name
        } else {
            self.kind.default_name()
        }
    }
}

/// Root document of the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Tracked sessions; order defines project grouping and display order.
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default = "default_socket_label")]
    pub mux_socket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_pane: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar_pane: Option<String>,
}

fn default_socket_label() -> String {
    DEFAULT_SOCKET_LABEL.to_string()
}

impl Default for State {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            mux_socket: default_socket_label(),
            last_active_session: None,
            viewport_pane: None,
            sidebar_pane: None,
        }
    }
}

impl State {
    /// Append a session at the end of the sequence.
    pub fn add_session(&mut self, session: Session) {
        self.sessions.push(session);
    }

    /// Remove a session by id, returning it if it existed.
    pub fn remove_session(&mut self, id: &str) -> Option<Session> {
        let idx = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(idx))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn find_by_pane(&self, pane_ref: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.pane_ref == pane_ref)
    }

    /// Drop the viewport reference if it collides with the sidebar.
    ///
    /// Returns true if the state was modified.
    pub fn enforce_layout_invariant(&mut self) -> bool {
        match (&self.sidebar_pane, &self.viewport_pane) {
            (Some(sidebar), Some(viewport)) if sidebar == viewport => {
                self.viewport_pane = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a tracked session currently occupies the viewport pane.
    pub fn viewport_is_occupied(&self) -> bool {
        self.viewport_pane
            .as_deref()
            .is_some_and(|pane| self.find_by_pane(pane).is_some())
    }
}
