//! Primary window layout: a fixed-width sidebar on the left and the viewport.
//!
//! The sidebar pane is recognised by its start command carrying
//! [`SIDEBAR_SIGNATURE`], so it can be found again after a restart without
//! trusting stored state.

use tracing::{debug, info};

use super::{Multiplexer, TmuxClient};
use crate::error::{CorralError, Result};
use crate::session::reconcile::PRIMARY_WINDOW;
use crate::session::LivePane;

/// Argument that marks the sidebar process.
pub const SIDEBAR_SIGNATURE: &str = "--sidebar";

/// No-op marker at the head of the placeholder script, visible in the pane's
/// start command.
pub const PLACEHOLDER_SIGNATURE: &str = "corral-placeholder";

const PLACEHOLDER_SCRIPT: &str = ": corral-placeholder; printf '\\033[?25l\\n\\n        \\033[1mcorral\\033[0m\\n\\n    \
Create a session to get started.\\n    Type new in the sidebar, or press C-] to focus it.\\n'; exec cat";

/// Command that shows the welcome text in an empty viewport.
pub fn placeholder_command() -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), PLACEHOLDER_SCRIPT.to_string()]
}

/// Whether `pane` is running the placeholder rather than a session.
pub fn is_placeholder(pane: &LivePane) -> bool {
    pane.start_command.contains(PLACEHOLDER_SIGNATURE)
}

/// Replace whatever runs in `pane` with the placeholder.
pub fn show_placeholder<M: Multiplexer + ?Sized>(mux: &M, pane: &str) -> Result<()> {
    mux.respawn_pane(pane, &placeholder_command())
}

/// The sidebar pane of the primary window, if one is running.
pub fn find_sidebar_pane<M: Multiplexer + ?Sized>(mux: &M) -> Option<String> {
    mux.list_panes()
        .ok()?
        .into_iter()
        .find(|p| p.window_index == PRIMARY_WINDOW && p.start_command.contains(SIDEBAR_SIGNATURE))
        .map(|p| p.pane_ref)
}

/// Whether the primary window already holds a sidebar and a viewport.
pub fn has_layout<M: Multiplexer + ?Sized>(mux: &M) -> bool {
    let Ok(panes) = mux.list_panes() else {
        return false;
    };
    let primary: Vec<_> = panes.iter().filter(|p| p.window_index == PRIMARY_WINDOW).collect();
    primary.len() == 2 && primary.iter().any(|p| p.start_command.contains(SIDEBAR_SIGNATURE))
}

/// Respawn the sidebar in place with `sidebar_command`.
///
/// Sessions live in their own windows and are untouched.
pub fn reload_sidebar<M: Multiplexer + ?Sized>(mux: &M, sidebar_command: &[String]) -> Result<String> {
    let sidebar = find_sidebar_pane(mux)
        .ok_or_else(|| CorralError::LayoutViolation("no sidebar pane found".to_string()))?;
    mux.respawn_pane(&sidebar, sidebar_command)?;
    info!(pane = %sidebar, "reloaded sidebar");
    Ok(sidebar)
}

/// Split the primary window into sidebar and viewport.
///
/// The window's existing pane becomes the viewport. Returns
/// `(sidebar, viewport)` pane ids.
pub fn setup_layout(
    client: &TmuxClient,
    sidebar_command: &[String],
    sidebar_width: u16,
) -> Result<(String, String)> {
    let window = client.primary_window_target();
    let viewport = client
        .output(&["display-message", "-p", "-t", &window, "#{pane_id}"])?
        .trim()
        .to_string();
    if viewport.is_empty() {
        return Err(CorralError::LayoutViolation(format!("window {} has no pane", window)));
    }

    // Terminal capabilities must be in place before any pane is created
    client.run_quiet(&["set-option", "-g", "default-terminal", "xterm-256color"]);
    client.run_quiet(&["set-option", "-g", "terminal-overrides", ",xterm-256color:Tc"]);
    client.run_quiet(&["set-option", "-g", "escape-time", "10"]);
    client.run_quiet(&["set-option", "-g", "allow-passthrough", "on"]);
    client.run_quiet(&["set-option", "-g", "extended-keys", "on"]);
    client.run_quiet(&["set-environment", "-g", "COLORTERM", "truecolor"]);

    let width = sidebar_width.to_string();
    let mut split = vec![
        "split-window",
        "-h",
        "-b",
        "-P",
        "-F",
        "#{pane_id}",
        "-l",
        width.as_str(),
        "-t",
        viewport.as_str(),
    ];
    split.extend(sidebar_command.iter().map(String::as_str));
    let sidebar = client.output(&split)?.trim().to_string();
    if sidebar.is_empty() || sidebar == viewport {
        return Err(CorralError::LayoutViolation("could not identify sidebar pane".to_string()));
    }

    let session = client.session_name();
    for (option, value) in [
        ("status", "off"),
        ("pane-border-style", "fg=colour240"),
        ("pane-active-border-style", "fg=colour240"),
        ("focus-events", "on"),
        ("mouse", "on"),
        ("history-limit", "50000"),
    ] {
        client.run_quiet(&["set-option", "-t", session, option, value]);
    }
    client.run_quiet(&["bind-key", "-n", "C-]", "select-pane", "-t", &sidebar]);

    // A detached session starts small and tmux rescales panes on attach
    let resize = format!("resize-pane -t {} -x {}", sidebar, sidebar_width);
    client.run_quiet(&["set-hook", "-t", session, "client-attached[0]", &resize]);
    client.run_quiet(&["set-hook", "-t", session, "client-resized[0]", &resize]);

    debug!(%sidebar, %viewport, "layout created");
    Ok((sidebar, viewport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::fake::FakeMux;

    #[test]
    fn finds_sidebar_by_signature() {
        let (mux, sidebar, _viewport) = FakeMux::with_layout();
        mux.add_window("corral panel --sidebar", "/w");
        assert_eq!(find_sidebar_pane(&mux), Some(sidebar));
    }

    #[test]
    fn layout_requires_two_primary_panes() {
        let (mux, _sidebar, _viewport) = FakeMux::with_layout();
        assert!(has_layout(&mux));

        mux.split(0, "zsh");
        assert!(!has_layout(&mux));

        let empty = FakeMux::new();
        empty.add_window("zsh", "/w");
        assert!(!has_layout(&empty));

        let (single, _, vp) = FakeMux::with_layout();
        single.kill_pane(&vp).unwrap();
        assert!(!has_layout(&single));
    }

    #[test]
    fn reload_respawns_sidebar_in_place() {
        let (mux, sidebar, _viewport) = FakeMux::with_layout();
        let command = vec!["/new/corral".to_string(), "panel".to_string(), "--sidebar".to_string()];
        assert_eq!(reload_sidebar(&mux, &command).unwrap(), sidebar);
        let pane = mux.pane(&sidebar).unwrap();
        assert_eq!(pane.current_command, "corral");
        assert!(pane.start_command.contains("--sidebar"));

        let bare = FakeMux::new();
        assert!(reload_sidebar(&bare, &command).is_err());
    }

    #[test]
    fn placeholder_replaces_viewport_process() {
        let (mux, _sidebar, viewport) = FakeMux::with_layout();
        mux.set_content(&viewport, "stale");
        show_placeholder(&mux, &viewport).unwrap();
        assert_eq!(mux.pane(&viewport).unwrap().current_command, "sh");
        assert!(mux.pane(&viewport).unwrap().content.is_empty());

        let panes = mux.list_panes().unwrap();
        let shown = panes.iter().find(|p| p.pane_ref == viewport).unwrap();
        assert!(is_placeholder(shown));
    }

    #[test]
    fn sessions_are_not_mistaken_for_the_placeholder() {
        let (mux, sidebar, _viewport) = FakeMux::with_layout();
        let session = mux.add_window("claude", "/work/app");
        let panes = mux.list_panes().unwrap();
        for pane in panes.iter().filter(|p| p.pane_ref == session || p.pane_ref == sidebar) {
            assert!(!is_placeholder(pane));
        }
    }
}
