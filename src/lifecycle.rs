//! Server lifecycle: bootstrap, sidebar reload and teardown of a profile.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::System;
use tracing::{debug, info, warn};

use crate::config::{Profile, CLAUDE_CONFIG_ENV};
use crate::error::{CorralError, Result};
use crate::manager::{Manager, ManagerSettings};
use crate::mux::layout::{has_layout, reload_sidebar, setup_layout, show_placeholder, SIDEBAR_SIGNATURE};
use crate::mux::{Multiplexer, TmuxClient};
use crate::session::StateStore;
use crate::status::{Classifier, LsofProbe};

/// Subcommand the sidebar pane runs.
pub const PANEL_SUBCOMMAND: &str = "panel";

pub fn client_for(profile: &Profile) -> TmuxClient {
    TmuxClient::new(profile.socket_path(), profile.session_name())
}

pub fn current_exe() -> Result<PathBuf> {
    std::env::current_exe().map_err(|e| CorralError::io("Failed to resolve current executable", e))
}

/// Command line for the sidebar pane.
pub fn sidebar_command(exe: &Path, profile: &Profile) -> Vec<String> {
    let mut command = vec![exe.to_string_lossy().into_owned()];
    command.extend(profile.cli_args());
    command.push(PANEL_SUBCOMMAND.to_string());
    command.push(SIDEBAR_SIGNATURE.to_string());
    command
}

/// Manager for `profile` with its configured commands and patterns.
pub fn open_manager(profile: &Profile, client: TmuxClient) -> Result<Manager<TmuxClient>> {
    let classifier = Classifier::new(profile.config.pattern_table(), Box::new(LsofProbe));
    Ok(Manager::new(
        client,
        StateStore::new(profile.state_path()),
        ManagerSettings::from_config(&profile.config),
    )?
    .with_classifier(classifier))
}

/// Make sure the server and the sidebar/viewport layout exist.
///
/// On a fresh server every stored session is stale and is dropped; when the
/// server survived but the layout did not (say the sidebar crashed), sessions
/// are kept and the viewport is left alone.
pub fn bootstrap(profile: &Profile, client: &TmuxClient) -> Result<()> {
    let already_running = client.server_running();
    client.ensure_server()?;
    if let Some(dir) = &profile.config.claude_config_dir {
        client.set_environment(CLAUDE_CONFIG_ENV, dir)?;
    }

    if already_running && has_layout(client) {
        debug!("server and layout already present");
        return Ok(());
    }

    let exe = current_exe()?;
    let (sidebar, viewport) = setup_layout(
        client,
        &sidebar_command(&exe, profile),
        profile.config.sidebar_width,
    )?;
    let mut manager = open_manager(profile, client.clone())?;
    manager.adopt_layout(&sidebar, &viewport, !already_running)?;

    if !already_running {
        show_placeholder(client, &viewport)?;
        if let Err(e) = client.select_pane(&sidebar) {
            debug!(error = %e, "failed to focus sidebar");
        }
    }
    info!(%sidebar, %viewport, fresh = !already_running, "layout ready");
    Ok(())
}

/// Respawn the sidebar with the executable currently on disk.
pub fn reload(profile: &Profile) -> Result<String> {
    let client = client_for(profile);
    let exe = current_exe()?;
    reload_sidebar(&client, &sidebar_command(&exe, profile))
}

/// Whether `cmd` is a sidebar panel belonging to the profile `name`.
pub fn is_panel_cmdline(cmd: &[String], name: Option<&str>) -> bool {
    let Some(program) = cmd.first() else {
        return false;
    };
    let is_corral = Path::new(program)
        .file_name()
        .is_some_and(|n| n.to_string_lossy().contains("corral"));
    let is_sidebar = cmd.iter().any(|a| a == PANEL_SUBCOMMAND) && cmd.iter().any(|a| a == SIDEBAR_SIGNATURE);
    let profile = cmd
        .windows(2)
        .find(|w| w[0] == "--profile")
        .map(|w| w[1].as_str());
    is_corral && is_sidebar && profile == name
}

/// Send SIGTERM to panels of `profile` that outlived their server.
fn kill_lingering_panels(profile: &Profile) -> usize {
    let mut sys = System::new();
    sys.refresh_processes();
    let me = std::process::id();

    let mut killed = 0;
    for (pid, process) in sys.processes() {
        if pid.as_u32() == me || !is_panel_cmdline(process.cmd(), profile.name()) {
            continue;
        }
        let Ok(raw) = i32::try_from(pid.as_u32()) else {
            continue;
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => killed += 1,
            Err(e) => debug!(pid = raw, error = %e, "failed to signal panel"),
        }
    }
    killed
}

/// Delete a profile's files.
///
/// A named profile's directory is removed outright. The default profile's
/// directory also holds every named profile, so only its own entries go.
fn remove_profile_files(profile: &Profile) -> Result<()> {
    let dir = profile.base_dir();
    if profile.name().is_some() {
        return match fs::remove_dir_all(dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(CorralError::io(format!("Failed to remove {}", dir.display()), e))
            }
            _ => Ok(()),
        };
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CorralError::io(format!("Failed to read {}", dir.display()), e)),
    };
    for entry in entries.flatten() {
        if entry.file_name() == "profiles" {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| CorralError::io(format!("Failed to remove {}", path.display()), e))?;
    }
    Ok(())
}

/// Kill the server, stray panels and the profile's state.
pub fn teardown(profile: &Profile) -> Result<()> {
    let client = client_for(profile);
    if let Err(e) = client.kill_server() {
        debug!(error = %e, "no server to kill");
    }
    let killed = kill_lingering_panels(profile);
    if killed > 0 {
        warn!(killed, "terminated lingering panels");
    }
    remove_profile_files(profile)?;
    info!(dir = %profile.base_dir().display(), "profile torn down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &[&str]) -> Vec<String> {
        cmd.iter().map(|a| (*a).to_string()).collect()
    }

    #[test]
    fn sidebar_command_carries_profile_and_signature() {
        let home = tempfile::tempdir().unwrap();
        let profile = Profile::resolve_in(home.path(), Some("work")).unwrap();
        let command = sidebar_command(Path::new("/usr/bin/corral"), &profile);
        assert_eq!(command, args(&["/usr/bin/corral", "--profile", "work", "panel", "--sidebar"]));
        assert!(is_panel_cmdline(&command, Some("work")));
    }

    #[test]
    fn panel_cmdline_matching_respects_profile() {
        let default = args(&["/usr/bin/corral", "panel", "--sidebar"]);
        let work = args(&["corral", "--profile", "work", "panel", "--sidebar"]);
        assert!(is_panel_cmdline(&default, None));
        assert!(!is_panel_cmdline(&default, Some("work")));
        assert!(is_panel_cmdline(&work, Some("work")));
        assert!(!is_panel_cmdline(&work, None));
        assert!(!is_panel_cmdline(&args(&["corral", "panel"]), None));
        assert!(!is_panel_cmdline(&args(&["vim", "panel", "--sidebar"]), None));
        assert!(!is_panel_cmdline(&[], None));
    }

    #[test]
    fn default_profile_teardown_spares_named_profiles() {
        let home = tempfile::tempdir().unwrap();
        let named = Profile::resolve_in(home.path(), Some("work")).unwrap();
        let default = Profile::resolve_in(home.path(), None).unwrap();
        fs::write(default.state_path(), "{}").unwrap();
        fs::write(default.log_path(), "log").unwrap();

        remove_profile_files(&default).unwrap();
        assert!(!default.state_path().exists());
        assert!(!default.log_path().exists());
        assert!(named.config_path().exists());

        remove_profile_files(&named).unwrap();
        assert!(!named.base_dir().exists());
        remove_profile_files(&named).unwrap();
    }
}
