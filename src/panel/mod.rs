//! The sidebar panel.
//!
//! A sequential loop over the manager: each tick reconciles and reclassifies,
//! then the session list is redrawn. Keys are read in raw mode and edited into
//! a command line; dialogs run in tmux popups and report back through the
//! drop-file, which is polled at the shorter dialog interval while one is open.

pub mod command;
pub mod view;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{read, Event};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::dialog::{clear_result, expand_home, DialogMode, DialogResult, DropFileWatch, DropPoll};
use crate::error::{CorralError, Result};
use crate::manager::Manager;
use crate::mux::{Multiplexer, TmuxClient};
use crate::session::Session;

pub use command::PanelCommand;
use command::{Edit, InputLine};

/// Apply a finished dialog to the manager. Returns the created session, if any.
pub fn apply_dialog_result<M: Multiplexer>(
    manager: &mut Manager<M>,
    result: &DialogResult,
) -> Result<Option<Session>> {
    let dir = Path::new(&result.dir);
    let session = match result.mode {
        DialogMode::Canceled => return Ok(None),
        DialogMode::NewProject | DialogMode::AddSession => manager.create_session(dir, "")?,
        DialogMode::Terminal => manager.create_terminal(dir, None)?,
        DialogMode::Worktree => {
            let branch = result
                .branch
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| CorralError::Worktree("dialog returned no branch".to_string()))?;
            manager.create_worktree_session(dir, branch)?
        }
    };
    Ok(Some(session))
}

/// The session a numbered command refers to, or the last active one.
fn target_session<M: Multiplexer>(manager: &Manager<M>, n: Option<usize>) -> Result<Session> {
    let state = manager.state();
    let found = match n {
        Some(n) => view::session_at(state, n),
        None => state
            .last_active_session
            .as_deref()
            .and_then(|id| state.find_by_id(id))
            .or_else(|| state.sessions.first()),
    };
    found
        .cloned()
        .ok_or_else(|| CorralError::SessionNotFound(n.map_or_else(|| "no sessions".to_string(), |n| n.to_string())))
}

/// What the loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Interactive panel bound to one profile's tmux server.
pub struct Panel<'a> {
    profile: &'a Profile,
    client: TmuxClient,
    manager: Manager<TmuxClient>,
    exe: PathBuf,
    pending: Option<DropFileWatch>,
    input: InputLine,
    message: Option<String>,
    show_help: bool,
}

/// Leaves raw mode when the panel loop ends, however it ends.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode().map_err(|e| CorralError::io("Failed to enable raw mode", e))?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            debug!(error = %e, "failed to leave raw mode");
        }
    }
}

impl<'a> Panel<'a> {
    pub fn new(profile: &'a Profile, client: TmuxClient, manager: Manager<TmuxClient>, exe: PathBuf) -> Self {
        Self {
            profile,
            client,
            manager,
            exe,
            pending: None,
            input: InputLine::default(),
            message: None,
            show_help: false,
        }
    }

    /// Run until `q` or Ctrl-C.
    pub fn run(mut self) -> Result<()> {
        let _raw = RawMode::enable()?;
        let interval = Duration::from_millis(self.profile.config.status_interval_ms);
        let poll = Duration::from_millis(self.profile.config.dialog_poll_ms);
        let mut next_tick = Instant::now();

        info!("panel started");
        loop {
            if Instant::now() >= next_tick {
                self.manager.tick();
                next_tick = Instant::now() + interval;
            }
            self.poll_dialog();
            self.redraw();

            let until_tick = next_tick.saturating_duration_since(Instant::now());
            let wait = if self.pending.is_some() { until_tick.min(poll) } else { until_tick };
            if !crossterm::event::poll(wait).map_err(|e| CorralError::io("Failed to poll terminal input", e))? {
                continue;
            }
            match read().map_err(|e| CorralError::io("Failed to read terminal input", e))? {
                Event::Key(key) => match self.input.feed(key) {
                    Edit::Pending => {}
                    Edit::Submit(line) => {
                        if self.handle_line(&line) == Flow::Quit {
                            break;
                        }
                    }
                    Edit::Quit => break,
                },
                // Resizes only need the redraw at the top of the loop
                _ => {}
            }
        }
        info!("panel stopped");
        Ok(())
    }

    fn redraw(&self) {
        let width = usize::from(self.profile.config.sidebar_width);
        let mut rows = view::render(
            self.manager.state(),
            width,
            self.message.as_deref(),
            self.pending.is_some(),
        );
        if self.show_help {
            rows.extend(command::HELP.iter().map(|h| view::Row {
                text: (*h).to_string(),
                color: None,
                bold: false,
            }));
        }
        if let Err(e) = view::draw(&mut io::stdout(), &rows, self.input.as_str()) {
            debug!(error = %e, "redraw failed");
        }
    }

    fn poll_dialog(&mut self) {
        let Some(watch) = &self.pending else {
            return;
        };
        match watch.poll() {
            DropPoll::Pending => {}
            DropPoll::Expired => {
                debug!("dialog expired without a result");
                self.pending = None;
            }
            DropPoll::Ready(result) => {
                self.pending = None;
                debug!(mode = ?result.mode, dir = %result.dir, "dialog result");
                let outcome = apply_dialog_result(&mut self.manager, &result).map(|_| ());
                self.report(outcome);
            }
        }
    }

    fn report(&mut self, outcome: Result<()>) {
        self.message = match outcome {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "panel command failed");
                Some(e.to_string())
            }
        };
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        let command = match PanelCommand::parse(line) {
            Ok(command) => command,
            Err(message) => {
                self.message = Some(message);
                return Flow::Continue;
            }
        };
        self.show_help = command == PanelCommand::Help;

        let outcome = match command {
            PanelCommand::Quit => return Flow::Quit,
            PanelCommand::Help => Ok(()),
            PanelCommand::Refresh => {
                self.manager.tick();
                Ok(())
            }
            PanelCommand::New(Some(dir)) => self
                .manager
                .create_session(Path::new(&expand_home(&dir)), "")
                .map(|_| ()),
            PanelCommand::New(None) => self.open_directory_dialog(DialogMode::NewProject, ""),
            PanelCommand::Add(n) => target_session(&self.manager, n)
                .and_then(|s| self.open_directory_dialog(DialogMode::AddSession, &s.directory)),
            PanelCommand::Terminal(n) => target_session(&self.manager, n).and_then(|s| {
                self.manager
                    .create_terminal(Path::new(&s.directory), Some(&s.project))
                    .map(|_| ())
            }),
            PanelCommand::Worktree(n) => {
                target_session(&self.manager, n).and_then(|s| self.open_worktree_dialog(&s))
            }
            PanelCommand::Switch(n) => {
                target_session(&self.manager, Some(n)).and_then(|s| self.manager.switch_to(&s.id))
            }
            PanelCommand::Kill(n) => {
                target_session(&self.manager, Some(n)).and_then(|s| self.manager.kill_session(&s.id))
            }
            PanelCommand::MoveSession(n, direction) => target_session(&self.manager, Some(n))
                .and_then(|s| self.manager.move_session(&s.id, direction))
                .map(|_| ()),
            PanelCommand::MoveProject(n, direction) => target_session(&self.manager, Some(n))
                .and_then(|s| self.manager.move_project(&s.project, direction))
                .map(|_| ()),
        };
        self.report(outcome);
        Flow::Continue
    }

    fn dialog_command(&self, args: &[&str]) -> Vec<String> {
        let mut command = vec![self.exe.to_string_lossy().into_owned()];
        command.extend(self.profile.cli_args());
        command.extend(args.iter().map(|a| (*a).to_string()));
        command
    }

    fn launch(&mut self, title: &str, height: u16, command: &[String]) -> Result<()> {
        if self.pending.is_some() {
            return Ok(());
        }
        if !self.client.supports_popup() {
            return Err(CorralError::CommandFailed {
                command: "display-popup".to_string(),
                details: "dialogs require tmux >= 3.2; use new <dir> instead".to_string(),
            });
        }
        let path = self.profile.dialog_result_path();
        clear_result(&path);
        self.client.show_popup(title, 60, height, command)?;
        self.pending = Some(DropFileWatch::new(
            path,
            Duration::from_secs(self.profile.config.dialog_timeout_secs),
        ));
        Ok(())
    }

    fn open_directory_dialog(&mut self, mode: DialogMode, dir: &str) -> Result<()> {
        let mode_arg = match mode {
            DialogMode::AddSession => "add_session",
            _ => "new_project",
        };
        let command = self.dialog_command(&["dialog", "new", "--mode", mode_arg, "--dir", dir]);
        let title = if mode == DialogMode::AddSession { "New Session" } else { "New Project" };
        self.launch(title, 12, &command)
    }

    fn open_worktree_dialog(&mut self, session: &Session) -> Result<()> {
        let root = self
            .manager
            .repo()
            .repo_root(Path::new(&session.directory))
            .ok_or_else(|| CorralError::Worktree(format!("{} is not in a git repository", session.directory)))?;
        let command = self.dialog_command(&["dialog", "worktree", "--repo-root", &root]);
        self.launch(&format!("New Worktree in {}", session.project), 10, &command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::RepoInspector;
    use crate::manager::ManagerSettings;
    use crate::mux::fake::FakeMux;
    use crate::session::{SessionKind, StateStore};

    struct DirRepo;

    impl RepoInspector for DirRepo {
        fn repo_root(&self, dir: &Path) -> Option<String> {
            Some(dir.to_string_lossy().into_owned())
        }

        fn branch(&self, _dir: &Path) -> Option<String> {
            None
        }
    }

    fn manager(dir: &Path) -> Manager<FakeMux> {
        let (mux, sidebar, viewport) = FakeMux::with_layout();
        let mut manager = Manager::new(mux, StateStore::new(dir.join("state.json")), ManagerSettings::default())
            .unwrap()
            .with_repo(Box::new(DirRepo));
        manager.adopt_layout(&sidebar, &viewport, true).unwrap();
        manager
    }

    #[test]
    fn canceled_dialog_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());
        assert_eq!(apply_dialog_result(&mut manager, &DialogResult::canceled()).unwrap(), None);
        assert!(manager.sessions().is_empty());
    }

    #[test]
    fn directory_dialog_creates_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());
        let result = DialogResult {
            dir: "/work/app".to_string(),
            mode: DialogMode::NewProject,
            branch: None,
        };
        let session = apply_dialog_result(&mut manager, &result).unwrap().unwrap();
        assert_eq!(session.kind, SessionKind::Assistant);
        assert_eq!(session.project, "app");

        let result = DialogResult {
            mode: DialogMode::Terminal,
            ..result
        };
        let term = apply_dialog_result(&mut manager, &result).unwrap().unwrap();
        assert_eq!(term.kind, SessionKind::Terminal);
        assert_eq!(manager.sessions().len(), 2);
    }

    #[test]
    fn worktree_dialog_without_branch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());
        let result = DialogResult {
            dir: "/work/app".to_string(),
            mode: DialogMode::Worktree,
            branch: None,
        };
        assert!(matches!(
            apply_dialog_result(&mut manager, &result),
            Err(CorralError::Worktree(_))
        ));
    }

    #[test]
    fn numbered_targets_follow_display_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());
        let a = manager.create_session(Path::new("/work/app"), "a").unwrap();
        let b = manager.create_session(Path::new("/work/api"), "b").unwrap();
        let c = manager.create_session(Path::new("/work/app"), "c").unwrap();

        assert_eq!(target_session(&manager, Some(1)).unwrap().id, a.id);
        assert_eq!(target_session(&manager, Some(2)).unwrap().id, c.id);
        assert_eq!(target_session(&manager, Some(3)).unwrap().id, b.id);
        // Without a number the session on screen is the target
        assert_eq!(target_session(&manager, None).unwrap().id, c.id);
        assert!(target_session(&manager, Some(9)).is_err());
    }
}
