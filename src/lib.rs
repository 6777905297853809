//! corral library crate.
//!
//! corral runs many AI coding-assistant sessions inside a private tmux server
//! and keeps one of them on screen at a time. This library provides:
//! - the session model and its crash-safe persistence
//! - the multiplexer abstraction and its tmux implementation
//! - screen-scraping status classification
//! - the session manager (create, switch, kill, reconcile, worktrees)
//! - the sidebar panel and its popup dialogs

pub mod config;
pub mod dialog;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod logging;
pub mod manager;
pub mod mux;
pub mod panel;
pub mod session;
pub mod status;
