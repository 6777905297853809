//! Profiles and configuration for corral.
//!
//! A profile is an isolated environment: its own state directory, tmux
//! socket and session, and assistant config directory. The default profile
//! lives in `~/.corral`; named profiles live in `~/.corral/profiles/<name>`.
//! Each profile may carry a `config.toml` with user preferences.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CorralError, Result};
use crate::status::{Pattern, PatternTable};

/// Directory under the home directory holding all profiles.
const BASE_DIR_NAME: &str = ".corral";
const CONFIG_FILE: &str = "config.toml";

/// Environment variable pointing the assistant at its config directory.
pub const CLAUDE_CONFIG_ENV: &str = "CLAUDE_CONFIG_DIR";

/// User preferences loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Program started in new assistant sessions.
    #[serde(default = "default_assistant_command")]
    pub assistant_command: String,

    /// Shell started in new terminal sessions.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Interval between status ticks in the panel.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// How often a pending dialog result is polled for.
    #[serde(default = "default_dialog_poll_ms")]
    pub dialog_poll_ms: u64,

    /// How long to wait for a dialog before treating it as canceled.
    #[serde(default = "default_dialog_timeout_secs")]
    pub dialog_timeout_secs: u64,

    /// Sidebar width in columns (16-80).
    #[serde(default = "default_sidebar_width")]
    pub sidebar_width: u16,

    /// Exported as `CLAUDE_CONFIG_DIR` to every pane of the profile's server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_config_dir: Option<String>,

    /// Replaces the built-in status patterns when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<Pattern>,
}

fn default_assistant_command() -> String {
    "claude".to_string()
}

fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

fn default_status_interval_ms() -> u64 {
    2000
}

fn default_dialog_poll_ms() -> u64 {
    200
}

fn default_dialog_timeout_secs() -> u64 {
    600
}

fn default_sidebar_width() -> u16 {
    28
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant_command: default_assistant_command(),
            shell: default_shell(),
            status_interval_ms: default_status_interval_ms(),
            dialog_poll_ms: default_dialog_poll_ms(),
            dialog_timeout_secs: default_dialog_timeout_secs(),
            sidebar_width: default_sidebar_width(),
            claude_config_dir: None,
            patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or return default if not found
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CorralError::io(
                    format!("Failed to read config file {}", path.display()),
                    e,
                ))
            }
        };

        let mut config: Config = toml::from_str(&contents).map_err(|e| CorralError::ConfigMalformed {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CorralError::io(format!("Failed to create config directory {}", parent.display()), e)
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| CorralError::ConfigMalformed {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        fs::write(path, contents)
            .map_err(|e| CorralError::io(format!("Failed to write config file {}", path.display()), e))
    }

    /// Clamp values to their usable ranges.
    pub fn validate(&mut self) {
        self.sidebar_width = self.sidebar_width.clamp(16, 80);
        self.status_interval_ms = self.status_interval_ms.max(100);
        self.dialog_poll_ms = self.dialog_poll_ms.max(10);
        self.dialog_timeout_secs = self.dialog_timeout_secs.max(1);
    }

    /// Status patterns to classify with.
    pub fn pattern_table(&self) -> PatternTable {
        if self.patterns.is_empty() {
            PatternTable::default()
        } else {
            PatternTable::new(self.patterns.clone())
        }
    }
}

/// Whether `name` is usable as a profile name: alphanumerics and inner hyphens.
pub fn is_valid_profile_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        }
        _ => false,
    }
}

/// One isolated corral environment.
#[derive(Debug, Clone)]
pub struct Profile {
    /// None for the default profile.
    name: Option<String>,
    base_dir: PathBuf,
    pub config: Config,
}

impl Profile {
    /// Resolve a profile under the user's home directory.
    pub fn resolve(name: Option<&str>) -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            CorralError::io(
                "Could not find home directory",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        Self::resolve_in(&home, name)
    }

    /// Resolve a profile rooted at `home`.
    ///
    /// Named profiles get their directory created and a default config
    /// written on first use, with the assistant config directory defaulting
    /// to `~/.claude-<name>`.
    pub fn resolve_in(home: &Path, name: Option<&str>) -> Result<Self> {
        let root = home.join(BASE_DIR_NAME);
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            let config = Config::load(&root.join(CONFIG_FILE))?;
            return Ok(Self {
                name: None,
                base_dir: root,
                config,
            });
        };

        if !is_valid_profile_name(name) {
            return Err(CorralError::InvalidProfile(name.to_string()));
        }

        let base_dir = root.join("profiles").join(name);
        fs::create_dir_all(&base_dir).map_err(|e| {
            CorralError::io(format!("Failed to create profile directory {}", base_dir.display()), e)
        })?;

        let config_path = base_dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            let mut config = Config::load(&config_path)?;
            if config.claude_config_dir.is_none() {
                config.claude_config_dir = Some(default_claude_dir(home, name));
            }
            config
        } else {
            let config = Config {
                claude_config_dir: Some(default_claude_dir(home, name)),
                ..Config::default()
            };
            config.save(&config_path)?;
            debug!(profile = name, path = %config_path.display(), "wrote default profile config");
            config
        };

        Ok(Self {
            name: Some(name.to_string()),
            base_dir,
            config,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            CorralError::io(format!("Failed to create profile directory {}", self.base_dir.display()), e)
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    pub fn dialog_result_path(&self) -> PathBuf {
        self.base_dir.join("dialog-result.json")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.base_dir.join("tmux.sock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join("debug.log")
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    /// tmux session name for this profile.
    pub fn session_name(&self) -> String {
        match &self.name {
            None => "corral-main".to_string(),
            Some(name) => format!("corral-{}-main", name),
        }
    }

    /// Arguments that select this profile on a child `corral` invocation.
    pub fn cli_args(&self) -> Vec<String> {
        match &self.name {
            None => Vec::new(),
            Some(name) => vec!["--profile".to_string(), name.clone()],
        }
    }
}

fn default_claude_dir(home: &Path, name: &str) -> String {
    home.join(format!(".claude-{}", name)).to_string_lossy().into_owned()
}
