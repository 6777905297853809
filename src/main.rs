use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, error, info};

use corral::config::Profile;
use corral::dialog::{ask_branch, ask_directory, expand_home, write_canceled_if_absent, write_result, DialogMode};
use corral::lifecycle::{self, client_for, open_manager};
use corral::logging;
use corral::mux::tmux::ACTIVE_ENV;
use corral::mux::TmuxClient;
use corral::panel::{view, Panel};

#[derive(Parser)]
#[command(name = "corral", version, about = "Run many AI coding-assistant sessions side by side in tmux")]
struct Cli {
    /// Isolated profile with its own server, state and assistant config.
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start or reattach to the server (default).
    Up,
    /// Run the session list panel.
    Panel {
        /// Marks the long-lived sidebar instance.
        #[arg(long)]
        sidebar: bool,
    },
    /// Popup dialogs; they report back through the drop-file.
    #[command(subcommand, hide = true)]
    Dialog(DialogCommand),
    /// Kill the server and delete the profile's state.
    Teardown,
    /// Restart the sidebar with the current executable.
    Reload,
    /// Print the tracked sessions.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a session in the viewport (id, number or id prefix).
    Switch { session: String },
    /// Close a session.
    Close { session: String },
    /// Start an assistant session in a directory.
    New {
        dir: PathBuf,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Start a shell session in a directory.
    Terminal {
        dir: PathBuf,
        #[arg(long)]
        project: Option<String>,
    },
    /// Create a git worktree on a new branch and start a session in it.
    Worktree { repo: PathBuf, branch: String },
}

#[derive(Subcommand)]
enum DialogCommand {
    /// Ask for a directory.
    New {
        #[arg(long, value_enum)]
        mode: DirectoryMode,
        #[arg(long, default_value = "")]
        dir: String,
    },
    /// Ask for a branch name.
    Worktree {
        #[arg(long)]
        repo_root: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectoryMode {
    #[value(name = "new_project")]
    NewProject,
    #[value(name = "add_session")]
    AddSession,
}

impl From<DirectoryMode> for DialogMode {
    fn from(mode: DirectoryMode) -> Self {
        match mode {
            DirectoryMode::NewProject => DialogMode::NewProject,
            DirectoryMode::AddSession => DialogMode::AddSession,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let profile = Profile::resolve(cli.profile.as_deref()).context("Failed to resolve profile")?;
    let _log_guard = logging::init(&profile).context("Failed to initialize logging")?;

    let command = cli.command.unwrap_or(Command::Up);
    let result = run(&profile, command);
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "command failed");
    }
    result
}

fn run(profile: &Profile, command: Command) -> Result<()> {
    match command {
        Command::Up => up(profile),
        Command::Panel { sidebar } => {
            info!(sidebar, "starting panel");
            let client = client_for(profile);
            let manager = open_manager(profile, client.clone()).context("Failed to load sessions")?;
            let exe = lifecycle::current_exe()?;
            Panel::new(profile, client, manager, exe).run()?;
            Ok(())
        }
        Command::Dialog(dialog) => run_dialog(profile, dialog),
        Command::Teardown => {
            lifecycle::teardown(profile).context("Teardown failed")?;
            println!("Removed {}", profile.base_dir().display());
            Ok(())
        }
        Command::Reload => {
            let pane = lifecycle::reload(profile).context("Failed to reload sidebar")?;
            println!("Sidebar reloaded ({}).", pane);
            Ok(())
        }
        Command::List { json } => list(profile, json),
        Command::Switch { session } => {
            let mut manager = open_manager(profile, client_for(profile))?;
            let id = resolve(&manager, &session)?;
            manager.switch_to(&id).with_context(|| format!("Failed to switch to {}", session))?;
            Ok(())
        }
        Command::Close { session } => {
            let mut manager = open_manager(profile, client_for(profile))?;
            let id = resolve(&manager, &session)?;
            manager.kill_session(&id).with_context(|| format!("Failed to close {}", session))?;
            Ok(())
        }
        Command::New { dir, name } => {
            let mut manager = open_manager(profile, client_for(profile))?;
            let session = manager.create_session(&expand(&dir), &name)?;
            println!("{}", session.id);
            Ok(())
        }
        Command::Terminal { dir, project } => {
            let mut manager = open_manager(profile, client_for(profile))?;
            let session = manager.create_terminal(&expand(&dir), project.as_deref())?;
            println!("{}", session.id);
            Ok(())
        }
        Command::Worktree { repo, branch } => {
            let mut manager = open_manager(profile, client_for(profile))?;
            let session = manager
                .create_worktree_session(&expand(&repo), &branch)
                .with_context(|| format!("Failed to create worktree {}", branch))?;
            println!("{}", session.id);
            Ok(())
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(expand_home(&path.to_string_lossy()))
}

fn resolve(manager: &corral::manager::Manager<TmuxClient>, key: &str) -> Result<String> {
    match view::lookup(manager.state(), key) {
        Some(session) => Ok(session.id.clone()),
        None => bail!("No session matches {:?}", key),
    }
}

fn up(profile: &Profile) -> Result<()> {
    if std::env::var_os(ACTIVE_ENV).is_some() {
        bail!("Already inside corral; detach first (prefix + d)");
    }
    if !TmuxClient::is_installed() {
        bail!("tmux is not installed or not on PATH");
    }
    let client = client_for(profile);
    lifecycle::bootstrap(profile, &client).context("Failed to prepare tmux layout")?;
    client.attach().context("Failed to attach to tmux")?;
    Ok(())
}

fn run_dialog(profile: &Profile, dialog: DialogCommand) -> Result<()> {
    let path = profile.dialog_result_path();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let answered = match dialog {
        DialogCommand::New { mode, dir } => ask_directory(mode.into(), &dir, &mut input, &mut output),
        DialogCommand::Worktree { repo_root } => ask_branch(&repo_root, &mut input, &mut output),
    };
    let written = answered.and_then(|result| write_result(&path, &result));
    // The panel waits on this file; it must exist however the dialog ended.
    write_canceled_if_absent(&path).context("Failed to write dialog result")?;
    if let Err(e) = output.flush() {
        debug!(error = %e, "failed to flush dialog output");
    }
    written.context("Dialog failed")?;
    Ok(())
}

fn list(profile: &Profile, json: bool) -> Result<()> {
    let mut manager = open_manager(profile, client_for(profile))?;
    if client_for(profile).server_running() {
        manager.tick();
    }
    let state = manager.state();

    if json {
        let out = serde_json::to_string_pretty(&state.sessions).context("Failed to encode sessions")?;
        println!("{}", out);
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    for (n, idx) in view::display_order(state).into_iter().enumerate() {
        let session = &state.sessions[idx];
        writeln!(
            stdout,
            "{:>2}  {}  {:<8} {:<16} {}",
            n + 1,
            session.id,
            session.status.label(),
            session.project,
            session.display_name()
        )?;
    }
    Ok(())
}
