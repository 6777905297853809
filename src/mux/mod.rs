//! Multiplexer client.
//!
//! The core talks to tmux as a remote command protocol: every call is an
//! independent request returning text, with its own failure mode. The
//! [`Multiplexer`] trait is the seam the manager, the classifier and the
//! reconciliation pass depend on; [`TmuxClient`] is the real implementation.

#[cfg(test)]
pub(crate) mod fake;
pub mod layout;
pub mod tmux;

use std::path::Path;

use crate::error::Result;
use crate::session::LivePane;
use crate::status::clean_title;

pub use tmux::TmuxClient;

/// `list-panes` format consumed by [`parse_live_panes`].
pub const LIST_PANES_FORMAT: &str = "#{pane_id}\t#{window_index}\t#{pane_current_command}\t#{pane_start_command}\t#{pane_current_path}\t#{pane_title}";

pub const FORMAT_PANE_TITLE: &str = "#{pane_title}";
pub const FORMAT_PANE_PID: &str = "#{pane_pid}";
pub const FORMAT_CURRENT_COMMAND: &str = "#{pane_current_command}";

/// Pane-level operations against one multiplexer session.
pub trait Multiplexer {
    /// Snapshot every pane in the managed session, across all windows.
    fn list_panes(&self) -> Result<Vec<LivePane>>;

    /// Liveness probe; any failure counts as "not live".
    fn pane_exists(&self, pane: &str) -> bool;

    /// Expand a format string against one pane.
    fn pane_info(&self, pane: &str, format: &str) -> Result<String>;

    /// Visible text of a pane.
    fn capture_pane(&self, pane: &str) -> Result<String>;

    /// Open a detached window running `command` in `dir`; returns its pane.
    fn new_window(&self, name: &str, dir: &Path, command: &[String]) -> Result<String>;

    /// Exchange the positions (and therefore the content) of two panes.
    fn swap_panes(&self, source: &str, target: &str) -> Result<()>;

    fn select_pane(&self, pane: &str) -> Result<()>;

    fn kill_pane(&self, pane: &str) -> Result<()>;

    /// Replace the process in `pane` with `command`, keeping the pane.
    fn respawn_pane(&self, pane: &str, command: &[String]) -> Result<()>;

    /// Raw OSC-set title of a pane.
    fn pane_title(&self, pane: &str) -> Result<String> {
        self.pane_info(pane, FORMAT_PANE_TITLE)
    }

    /// Foreground command of a pane.
    fn pane_current_command(&self, pane: &str) -> Result<String> {
        self.pane_info(pane, FORMAT_CURRENT_COMMAND)
    }

    /// PID of the process the pane was started with.
    fn pane_pid(&self, pane: &str) -> Option<u32> {
        self.pane_info(pane, FORMAT_PANE_PID).ok()?.trim().parse().ok()
    }
}

/// Parse `list-panes` output produced with [`LIST_PANES_FORMAT`].
///
/// Malformed lines are skipped; titles are cleaned on the way in.
pub fn parse_live_panes(output: &str) -> Vec<LivePane> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(6, '\t');
            let pane_ref = parts.next()?.trim();
            if pane_ref.is_empty() {
                return None;
            }
            let window_index = parts.next()?.trim().parse().ok()?;
            Some(LivePane {
                pane_ref: pane_ref.to_string(),
                window_index,
                current_command: parts.next().unwrap_or_default().trim().to_string(),
                start_command: parts.next().unwrap_or_default().trim().to_string(),
                current_path: parts.next().unwrap_or_default().trim().to_string(),
                title: clean_title(parts.next().unwrap_or_default()),
            })
        })
        .collect()
}
