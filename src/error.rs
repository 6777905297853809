//! Error types for corral operations.
//!
//! Every failure the core can hit is returned as a [`CorralError`]; nothing in
//! the library terminates the process. The binary wraps these in `anyhow` at
//! its edges.

use std::path::PathBuf;

/// All errors that can occur in corral's core.
#[derive(Debug, thiserror::Error)]
pub enum CorralError {
    // ─────────────────────────────────────────────────────────────────────
    // External commands
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid profile name {0:?}: must be alphanumeric with hyphens")]
    InvalidProfile(String),

    // ─────────────────────────────────────────────────────────────────────
    // Sessions and layout
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session pane {0} no longer exists")]
    PaneGone(String),

    #[error("Layout violation: {0}")]
    LayoutViolation(String),

    // ─────────────────────────────────────────────────────────────────────
    // Git
    // ─────────────────────────────────────────────────────────────────────
    #[error("Worktree operation failed: {0}")]
    Worktree(String),
}

impl CorralError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CorralError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CorralError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using CorralError.
pub type Result<T> = std::result::Result<T, CorralError>;
