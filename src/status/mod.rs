//! Status detection for tracked sessions.
//!
//! Assistant sessions are classified from their visible terminal text using a
//! [`PatternTable`], then smoothed by [`settle`] so that a completion the user
//! has not seen yet stays flagged. Terminal sessions are classified from their
//! foreground command and, for non-shell commands, a listening-port probe.

pub mod ports;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mux::Multiplexer;
use crate::session::{Session, SessionKind, Status};

pub use ports::{LsofProbe, PortProbe};

/// Raw categories a pattern can signal, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Running,
    PlanReady,
    Input,
    Idle,
}

impl Category {
    fn status(self) -> Status {
        match self {
            Category::Running => Status::Running,
            Category::PlanReady => Status::PlanReady,
            Category::Input => Status::Input,
            Category::Idle => Status::Idle,
        }
    }
}

/// One literal substring that signals a category when present in pane text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub category: Category,
    pub literal: String,
}

impl Pattern {
    pub fn new(category: Category, literal: impl Into<String>) -> Self {
        Self {
            category,
            literal: literal.into(),
        }
    }
}

/// Ordered list of classification patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTable {
    patterns: Vec<Pattern>,
}

const BUILTIN_PATTERNS: &[(Category, &str)] = &[
    (Category::Running, "esc to interrupt"),
    (Category::PlanReady, "Would you like to proceed?"),
    (Category::PlanReady, "Ready to code?"),
    (Category::Input, "Do you want to"),
    (Category::Input, "[Y/n]"),
    (Category::Input, "[y/N]"),
    (Category::Input, "Allow once"),
    (Category::Input, "Yes, allow"),
    (Category::Input, "Allow all"),
    (Category::Input, "trust this tool"),
    (Category::Input, "approve this"),
    (Category::Idle, "? for shortcuts"),
    (Category::Idle, "? for help"),
];

impl Default for PatternTable {
    fn default() -> Self {
        Self::new(
            BUILTIN_PATTERNS
                .iter()
                .map(|(category, literal)| Pattern::new(*category, *literal))
                .collect(),
        )
    }
}

impl PatternTable {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Classify captured assistant text.
    ///
    /// The highest-priority category with any matching literal wins; text
    /// matching nothing is treated as an idle prompt.
    pub fn classify(&self, text: &str) -> Status {
        self.patterns
            .iter()
            .filter(|p| !p.literal.is_empty() && text.contains(p.literal.as_str()))
            .map(|p| p.category)
            .min()
            .map_or(Status::Idle, Category::status)
    }
}

/// Combine the previous status with a fresh raw classification.
///
/// `in_viewport` is whether the session is the one currently on screen.
pub fn settle(prev: Status, raw: Status, in_viewport: bool) -> Status {
    match (prev, raw) {
        (Status::Exited, _) => Status::Exited,
        (Status::Running, Status::Idle) if !in_viewport => Status::Done,
        (Status::Running, Status::PlanReady) if !in_viewport => Status::PlanReady,
        (Status::Done, Status::Idle) => Status::Done,
        (Status::PlanReady, Status::Idle) => Status::PlanReady,
        (_, raw) => raw,
    }
}

/// Status after the user has looked at a session.
pub fn acknowledge(status: Status) -> Status {
    if status.needs_attention() {
        Status::Idle
    } else {
        status
    }
}

/// Titles that carry no information about what a session is doing.
const NOISE_TITLES: &[&str] = &["bash", "zsh", "sh", "fish", "claude", "claude-code", "tmux"];

const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish", "dash", "ksh", "tcsh", "csh", "nu"];

/// Reduce a raw pane title to something worth displaying, or empty.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if NOISE_TITLES.iter().any(|n| n.eq_ignore_ascii_case(trimmed)) {
        return String::new();
    }
    // Spinner and status glyphs the assistant prefixes its title with
    let stripped = trimmed.trim_start_matches(|c: char| !c.is_alphanumeric()).trim();
    if stripped.contains('@') && !stripped.contains(' ') {
        return String::new();
    }
    if NOISE_TITLES.iter().any(|n| n.eq_ignore_ascii_case(stripped)) {
        return String::new();
    }
    stripped.to_string()
}

/// Whether a foreground command is an interactive shell.
pub fn is_shell(command: &str) -> bool {
    let command = command.trim().trim_start_matches('-');
    let base = command.rsplit('/').next().unwrap_or(command);
    SHELLS.contains(&base)
}

/// Result of observing one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub status: Status,
    pub title: String,
    pub service_port: Option<u16>,
}

/// Classifies sessions against a multiplexer.
pub struct Classifier {
    patterns: PatternTable,
    ports: Box<dyn PortProbe>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(PatternTable::default(), Box::new(LsofProbe))
    }
}

impl Classifier {
    pub fn new(patterns: PatternTable, ports: Box<dyn PortProbe>) -> Self {
        Self { patterns, ports }
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    /// Observe `session`; `viewport` is the pane currently on screen.
    pub fn observe<M: Multiplexer + ?Sized>(
        &self,
        mux: &M,
        session: &Session,
        viewport: Option<&str>,
    ) -> Observation {
        let exited = Observation {
            status: Status::Exited,
            title: session.title.clone(),
            service_port: None,
        };
        if session.status == Status::Exited || !mux.pane_exists(&session.pane_ref) {
            return exited;
        }

        match session.kind {
            SessionKind::Assistant => {
                let text = match mux.capture_pane(&session.pane_ref) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!(session = %session.id, error = %e, "capture failed, treating as exited");
                        return exited;
                    }
                };
                let raw = self.patterns.classify(&text);
                let in_viewport = viewport == Some(session.pane_ref.as_str());
                let title = mux
                    .pane_title(&session.pane_ref)
                    .map(|t| clean_title(&t))
                    .unwrap_or_else(|_| session.title.clone());
                Observation {
                    status: settle(session.status, raw, in_viewport),
                    title,
                    service_port: None,
                }
            }
            SessionKind::Terminal => {
                let Ok(command) = mux.pane_current_command(&session.pane_ref) else {
                    return exited;
                };
                let command = command.trim().to_string();
                if is_shell(&command) {
                    return Observation {
                        status: Status::Shell,
                        title: String::new(),
                        service_port: None,
                    };
                }

                let service_port = mux.pane_pid(&session.pane_ref).and_then(|pid| {
                    let pids = self.ports.process_tree(pid);
                    self.ports.find_listening_port(&pids)
                });
                Observation {
                    status: if service_port.is_some() {
                        Status::Service
                    } else {
                        Status::Running
                    },
                    title: command,
                    service_port,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::fake::FakeMux;

    struct FixedPort(Option<u16>);

    impl PortProbe for FixedPort {
        fn find_listening_port(&self, pids: &[u32]) -> Option<u16> {
            if pids.is_empty() {
                None
            } else {
                self.0
            }
        }

        fn process_tree(&self, root: u32) -> Vec<u32> {
            vec![root, root + 1]
        }
    }

    fn classifier(port: Option<u16>) -> Classifier {
        Classifier::new(PatternTable::default(), Box::new(FixedPort(port)))
    }

    #[test]
    fn classify_uses_category_priority() {
        let table = PatternTable::default();
        assert_eq!(table.classify("Thinking… (esc to interrupt)\n? for shortcuts"), Status::Running);
        assert_eq!(table.classify("Would you like to proceed?\nDo you want to"), Status::PlanReady);
        assert_eq!(table.classify("Do you want to make this edit?\n? for shortcuts"), Status::Input);
        assert_eq!(table.classify("> \n? for shortcuts"), Status::Idle);
        assert_eq!(table.classify("nothing recognisable"), Status::Idle);
    }

    #[test]
    fn custom_pattern_table_replaces_builtins() {
        let table = PatternTable::new(vec![Pattern::new(Category::Input, "Proceed?")]);
        assert_eq!(table.classify("Proceed?"), Status::Input);
        assert_eq!(table.classify("esc to interrupt"), Status::Idle);
    }

    #[test]
    fn completion_off_screen_becomes_done_and_sticks() {
        let mut status = Status::Running;
        status = settle(status, Status::Idle, false);
        assert_eq!(status, Status::Done);
        status = settle(status, Status::Idle, false);
        assert_eq!(status, Status::Done);
        // Leaves Done as soon as the assistant does something else
        assert_eq!(settle(status, Status::Input, false), Status::Input);
        assert_eq!(settle(status, Status::Running, false), Status::Running);
    }

    #[test]
    fn completion_on_screen_goes_straight_to_idle() {
        assert_eq!(settle(Status::Running, Status::Idle, true), Status::Idle);
        assert_eq!(settle(Status::Running, Status::PlanReady, true), Status::PlanReady);
    }

    #[test]
    fn plan_ready_survives_idle_readings() {
        let status = settle(Status::Running, Status::PlanReady, false);
        assert_eq!(status, Status::PlanReady);
        assert_eq!(settle(status, Status::Idle, false), Status::PlanReady);
        assert_eq!(settle(status, Status::Running, true), Status::Running);
    }

    #[test]
    fn exited_is_terminal() {
        assert_eq!(settle(Status::Exited, Status::Running, true), Status::Exited);
    }

    #[test]
    fn acknowledge_clears_only_attention_flags() {
        assert_eq!(acknowledge(Status::Done), Status::Idle);
        assert_eq!(acknowledge(Status::PlanReady), Status::Idle);
        assert_eq!(acknowledge(Status::Input), Status::Input);
        assert_eq!(acknowledge(Status::Running), Status::Running);
    }

    #[test]
    fn clean_title_drops_noise() {
        assert_eq!(clean_title("  zsh "), "");
        assert_eq!(clean_title("Claude"), "");
        assert_eq!(clean_title("claude-code"), "");
        assert_eq!(clean_title("✳ Fix login bug"), "Fix login bug");
        assert_eq!(clean_title("⠂ claude"), "");
        assert_eq!(clean_title("user@host"), "");
        assert_eq!(clean_title("user@host: ~/src"), "user@host: ~/src");
        assert_eq!(clean_title("npm run dev"), "npm run dev");
    }

    #[test]
    fn recognises_shells() {
        assert!(is_shell("zsh"));
        assert!(is_shell("-bash"));
        assert!(is_shell("/bin/fish"));
        assert!(!is_shell("node"));
        assert!(!is_shell("claude"));
    }

    #[test]
    fn assistant_observation_uses_text_and_title() {
        let mux = FakeMux::new();
        let pane = mux.add_window("claude", "/work/app");
        mux.set_content(&pane, "Working (esc to interrupt)");
        mux.set_title(&pane, "✳ Add tests");
        let session = Session::new(SessionKind::Assistant, pane.clone(), "app", "a", "/work/app");

        let obs = classifier(None).observe(&mux, &session, None);
        assert_eq!(obs.status, Status::Running);
        assert_eq!(obs.title, "Add tests");
    }

    #[test]
    fn assistant_finishing_off_screen_is_done() {
        let mux = FakeMux::new();
        let pane = mux.add_window("claude", "/work/app");
        mux.set_content(&pane, "> \n? for shortcuts");
        let session = Session::new(SessionKind::Assistant, pane.clone(), "app", "a", "/work/app");

        let c = classifier(None);
        assert_eq!(c.observe(&mux, &session, Some("%99")).status, Status::Done);
        assert_eq!(c.observe(&mux, &session, Some(pane.as_str())).status, Status::Idle);
    }

    #[test]
    fn missing_pane_is_exited() {
        let mux = FakeMux::new();
        let session = Session::new(SessionKind::Assistant, "%42", "app", "a", "/w");
        assert_eq!(classifier(None).observe(&mux, &session, None).status, Status::Exited);
    }

    #[test]
    fn terminal_classification() {
        let mux = FakeMux::new();
        let pane = mux.add_window("zsh", "/work/app");
        let mut session = Session::new(SessionKind::Terminal, pane.clone(), "app", "", "/work/app");
        session.service_port = Some(3000);

        let obs = classifier(Some(3000)).observe(&mux, &session, None);
        assert_eq!(obs.status, Status::Shell);
        assert_eq!(obs.service_port, None);
        assert_eq!(obs.title, "");

        mux.set_current_command(&pane, "node");
        let obs = classifier(Some(3000)).observe(&mux, &session, None);
        assert_eq!(obs.status, Status::Service);
        assert_eq!(obs.service_port, Some(3000));
        assert_eq!(obs.title, "node");

        let obs = classifier(None).observe(&mux, &session, None);
        assert_eq!(obs.status, Status::Running);
        assert_eq!(obs.service_port, None);
    }
}
