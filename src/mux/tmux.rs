//! tmux command adapter.
//!
//! Every command runs `tmux -S <socket> ...` with `$TMUX` removed, so it works
//! from inside one of our own panes and from inside an unrelated tmux, and
//! with `CORRAL_ACTIVE=1` so child processes can tell they are managed.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::{parse_live_panes, Multiplexer, LIST_PANES_FORMAT};
use crate::error::{CorralError, Result};
use crate::session::LivePane;

/// Environment variable marking processes started inside corral.
pub const ACTIVE_ENV: &str = "CORRAL_ACTIVE";

/// Synchronous client for one tmux server and session.
#[derive(Debug, Clone)]
pub struct TmuxClient {
    socket: PathBuf,
    session: String,
}

impl TmuxClient {
    pub fn new(socket: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
            session: session.into(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn session_name(&self) -> &str {
        &self.session
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("tmux");
        cmd.arg("-S").arg(&self.socket);
        cmd.env_remove("TMUX");
        cmd.env(ACTIVE_ENV, "1");
        cmd
    }

    /// Run a tmux command and return its stdout.
    pub fn output(&self, args: &[&str]) -> Result<String> {
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CorralError::CommandFailed {
                command: format!("tmux {}", args.join(" ")),
                details: e.to_string(),
            })?;

        if !output.status.success() {
            let details = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(args = ?args, %details, "tmux command failed");
            return Err(CorralError::CommandFailed {
                command: format!("tmux {}", args.join(" ")),
                details,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a tmux command, discarding its output.
    pub fn run(&self, args: &[&str]) -> Result<()> {
        self.output(args).map(|_| ())
    }

    /// Run a tmux command, logging rather than returning a failure.
    ///
    /// For cosmetic options whose absence does not break the layout.
    pub fn run_quiet(&self, args: &[&str]) {
        if let Err(e) = self.run(args) {
            debug!(error = %e, "ignored tmux failure");
        }
    }

    /// Run with the terminal inherited, e.g. for `attach-session`.
    fn run_interactive(&self, args: &[&str]) -> Result<()> {
        let status = self.command().args(args).status().map_err(|e| CorralError::CommandFailed {
            command: format!("tmux {}", args.join(" ")),
            details: e.to_string(),
        })?;
        if !status.success() {
            return Err(CorralError::CommandFailed {
                command: format!("tmux {}", args.join(" ")),
                details: format!("exited with {}", status),
            });
        }
        Ok(())
    }

    /// Target for the session's primary window.
    pub fn primary_window_target(&self) -> String {
        format!("{}:{}", self.session, crate::session::reconcile::PRIMARY_WINDOW)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Server lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Whether tmux is on PATH.
    pub fn is_installed() -> bool {
        Command::new("tmux")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    /// Whether a server is listening on our socket.
    pub fn server_running(&self) -> bool {
        self.run(&["list-sessions"]).is_ok()
    }

    /// Start the server with a detached session if it is not running.
    ///
    /// The window base index is pinned to zero before the session is created
    /// so the primary window is always window 0.
    pub fn ensure_server(&self) -> Result<()> {
        if self.server_running() {
            return Ok(());
        }
        if let Some(parent) = self.socket.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CorralError::io(format!("Failed to create socket directory {}", parent.display()), e)
            })?;
        }
        self.run(&[
            "start-server",
            ";",
            "set-option",
            "-g",
            "base-index",
            "0",
            ";",
            "new-session",
            "-d",
            "-s",
            &self.session,
        ])
    }

    /// Export a variable to every pane the server starts from now on.
    pub fn set_environment(&self, name: &str, value: &str) -> Result<()> {
        self.run(&["set-environment", "-g", name, value])
    }

    /// Attach the current terminal; blocks until detach.
    pub fn attach(&self) -> Result<()> {
        self.run_interactive(&["attach-session", "-t", &self.session])
    }

    pub fn kill_server(&self) -> Result<()> {
        self.run(&["kill-server"])
    }

    /// Whether the server supports `display-popup` (tmux 3.2 or newer).
    pub fn supports_popup(&self) -> bool {
        self.output(&["display-message", "-p", "#{version}"])
            .map(|v| version_supports_popup(&v))
            .unwrap_or(false)
    }

    /// Open a popup running `command`; returns once the popup is launched.
    pub fn show_popup(&self, title: &str, width: u16, height: u16, command: &[String]) -> Result<()> {
        let title = format!(" {} ", title);
        let width = width.to_string();
        let height = height.to_string();
        let mut args = vec![
            "display-popup",
            "-E",
            "-T",
            title.as_str(),
            "-w",
            width.as_str(),
            "-h",
            height.as_str(),
        ];
        args.extend(command.iter().map(String::as_str));
        self.run(&args)
    }
}

/// Parse a tmux version string such as `tmux 3.4` or `3.3a`.
fn version_supports_popup(raw: &str) -> bool {
    let version = raw.trim().trim_start_matches("tmux ").trim_start_matches("next-");
    let numeric = version.trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '-');
    let mut parts = numeric.splitn(2, '.');
    let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
        return false;
    };
    match (major.parse::<u32>(), minor.parse::<u32>()) {
        (Ok(major), Ok(minor)) => major > 3 || (major == 3 && minor >= 2),
        _ => false,
    }
}

impl Multiplexer for TmuxClient {
    fn list_panes(&self) -> Result<Vec<LivePane>> {
        let output = self.output(&["list-panes", "-s", "-t", &self.session, "-F", LIST_PANES_FORMAT])?;
        Ok(parse_live_panes(&output))
    }

    fn pane_exists(&self, pane: &str) -> bool {
        self.output(&["display-message", "-p", "-t", pane, "#{pane_id}"])
            .is_ok_and(|out| out.trim() == pane)
    }

    fn pane_info(&self, pane: &str, format: &str) -> Result<String> {
        self.output(&["display-message", "-p", "-t", pane, format])
            .map(|out| out.trim_end_matches('\n').to_string())
    }

    fn capture_pane(&self, pane: &str) -> Result<String> {
        self.output(&["capture-pane", "-p", "-t", pane])
    }

    fn new_window(&self, name: &str, dir: &Path, command: &[String]) -> Result<String> {
        let target = format!("{}:", self.session);
        let dir = dir.to_string_lossy();
        let mut args = vec![
            "new-window",
            "-d",
            "-P",
            "-F",
            "#{pane_id}",
            "-t",
            target.as_str(),
            "-n",
            name,
            "-c",
            &*dir,
        ];
        args.extend(command.iter().map(String::as_str));
        let pane = self.output(&args)?.trim().to_string();
        if pane.is_empty() {
            return Err(CorralError::CommandFailed {
                command: "tmux new-window".to_string(),
                details: "no pane id reported".to_string(),
            });
        }
        Ok(pane)
    }

    fn swap_panes(&self, source: &str, target: &str) -> Result<()> {
        self.run(&["swap-pane", "-s", source, "-t", target])
    }

    fn select_pane(&self, pane: &str) -> Result<()> {
        self.run(&["select-pane", "-t", pane])
    }

    fn kill_pane(&self, pane: &str) -> Result<()> {
        self.run(&["kill-pane", "-t", pane])
    }

    fn respawn_pane(&self, pane: &str, command: &[String]) -> Result<()> {
        let mut args = vec!["respawn-pane", "-k", "-t", pane];
        args.extend(command.iter().map(String::as_str));
        self.run(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_support_needs_tmux_3_2() {
        assert!(version_supports_popup("tmux 3.2"));
        assert!(version_supports_popup("3.4a\n"));
        assert!(version_supports_popup("tmux next-3.5"));
        assert!(version_supports_popup("4.0"));
        assert!(!version_supports_popup("tmux 3.1c"));
        assert!(!version_supports_popup("2.9"));
        assert!(!version_supports_popup("garbage"));
    }

    #[test]
    fn primary_window_target_is_window_zero() {
        let client = TmuxClient::new("/tmp/corral.sock", "corral-main");
        assert_eq!(client.primary_window_target(), "corral-main:0");
    }
}
