//! Line commands accepted by the panel, and the input line they are typed into.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::session::Direction;

/// One parsed panel command. Session numbers are 1-based display positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    /// Start an assistant session; prompts for a directory when none is given.
    New(Option<String>),
    /// Another assistant session in the project of the given session.
    Add(Option<usize>),
    Terminal(Option<usize>),
    Worktree(Option<usize>),
    Switch(usize),
    Kill(usize),
    MoveSession(usize, Direction),
    MoveProject(usize, Direction),
    Refresh,
    Help,
    Quit,
}

fn number(arg: Option<&str>, verb: &str) -> Result<usize, String> {
    let arg = arg.ok_or_else(|| format!("usage: {} N", verb))?;
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("not a session number: {}", arg)),
    }
}

fn optional_number(arg: Option<&str>, verb: &str) -> Result<Option<usize>, String> {
    arg.map(|a| number(Some(a), verb)).transpose()
}

impl PanelCommand {
    /// Parse one input line. A bare number switches to that session.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(PanelCommand::Refresh);
        };
        let arg = words.next();
        if let Ok(n) = verb.parse::<usize>() {
            return number(Some(verb), "s").map(|_| PanelCommand::Switch(n));
        }

        let command = match verb {
            "new" | "n" => PanelCommand::New(arg.map(str::to_string)),
            "add" | "a" => PanelCommand::Add(optional_number(arg, verb)?),
            "term" | "t" => PanelCommand::Terminal(optional_number(arg, verb)?),
            "wt" | "w" => PanelCommand::Worktree(optional_number(arg, verb)?),
            "s" | "switch" => PanelCommand::Switch(number(arg, verb)?),
            "k" | "kill" => PanelCommand::Kill(number(arg, verb)?),
            "up" => PanelCommand::MoveSession(number(arg, verb)?, Direction::Up),
            "down" => PanelCommand::MoveSession(number(arg, verb)?, Direction::Down),
            "pup" => PanelCommand::MoveProject(number(arg, verb)?, Direction::Up),
            "pdown" => PanelCommand::MoveProject(number(arg, verb)?, Direction::Down),
            "r" | "refresh" => PanelCommand::Refresh,
            "?" | "h" | "help" => PanelCommand::Help,
            "q" | "quit" => PanelCommand::Quit,
            other => return Err(format!("unknown command: {} (? for help)", other)),
        };
        Ok(command)
    }
}

pub const HELP: &[&str] = &[
    "new [dir]   new project session",
    "add [N]     session in project of N",
    "term [N]    terminal in project of N",
    "wt [N]      worktree of project of N",
    "s N | N     show session N",
    "k N         close session N",
    "up/down N   reorder session N",
    "pup/pdown N reorder project of N",
    "q           quit panel",
];

/// Result of feeding one key to an [`InputLine`].
#[derive(Debug, PartialEq, Eq)]
pub enum Edit {
    Pending,
    Submit(String),
    Quit,
}

/// The command being typed at the prompt.
#[derive(Debug, Default)]
pub struct InputLine {
    buffer: String,
}

impl InputLine {
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn feed(&mut self, key: KeyEvent) -> Edit {
        if key.kind == KeyEventKind::Release {
            return Edit::Pending;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return Edit::Quit,
            KeyCode::Char('d') if ctrl && self.buffer.is_empty() => return Edit::Quit,
            KeyCode::Char('u') if ctrl => self.buffer.clear(),
            KeyCode::Char(_) if ctrl => {}
            KeyCode::Char(c) => self.buffer.push(c),
            KeyCode::Backspace => {
                self.buffer.pop();
            }
            KeyCode::Esc => self.buffer.clear(),
            KeyCode::Enter => return Edit::Submit(std::mem::take(&mut self.buffer)),
            _ => {}
        }
        Edit::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(input: &mut InputLine, text: &str) {
        for c in text.chars() {
            assert_eq!(input.feed(key(KeyCode::Char(c))), Edit::Pending);
        }
    }

    #[test]
    fn test_input_line_editing() {
        let mut input = InputLine::default();
        type_str(&mut input, "k 12");
        input.feed(key(KeyCode::Backspace));
        assert_eq!(input.as_str(), "k 1");
        assert_eq!(input.feed(key(KeyCode::Enter)), Edit::Submit("k 1".to_string()));
        assert_eq!(input.as_str(), "");

        type_str(&mut input, "new /tmp");
        input.feed(key(KeyCode::Esc));
        assert_eq!(input.as_str(), "");
        type_str(&mut input, "s 2");
        input.feed(ctrl('u'));
        assert_eq!(input.as_str(), "");

        // Unbound control chords are not typed into the line
        input.feed(ctrl('x'));
        assert_eq!(input.as_str(), "");
    }

    #[test]
    fn test_input_line_quit_keys() {
        let mut input = InputLine::default();
        assert_eq!(input.feed(ctrl('d')), Edit::Quit);
        type_str(&mut input, "q");
        assert_eq!(input.feed(ctrl('d')), Edit::Pending);
        assert_eq!(input.feed(ctrl('c')), Edit::Quit);

        let mut release = key(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;
        assert_eq!(input.feed(release), Edit::Pending);
        assert_eq!(input.as_str(), "q");
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(PanelCommand::parse("s 3"), Ok(PanelCommand::Switch(3)));
        assert_eq!(PanelCommand::parse("2"), Ok(PanelCommand::Switch(2)));
        assert_eq!(PanelCommand::parse("k 1"), Ok(PanelCommand::Kill(1)));
        assert_eq!(PanelCommand::parse("up 2"), Ok(PanelCommand::MoveSession(2, Direction::Up)));
        assert_eq!(PanelCommand::parse("pdown 4"), Ok(PanelCommand::MoveProject(4, Direction::Down)));
    }

    #[test]
    fn test_parse_creation_commands() {
        assert_eq!(PanelCommand::parse("new"), Ok(PanelCommand::New(None)));
        assert_eq!(
            PanelCommand::parse("new ~/src/app"),
            Ok(PanelCommand::New(Some("~/src/app".to_string())))
        );
        assert_eq!(PanelCommand::parse("term"), Ok(PanelCommand::Terminal(None)));
        assert_eq!(PanelCommand::parse("wt 2"), Ok(PanelCommand::Worktree(Some(2))));
        assert_eq!(PanelCommand::parse("add 1"), Ok(PanelCommand::Add(Some(1))));
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(PanelCommand::parse("   "), Ok(PanelCommand::Refresh));
        assert_eq!(PanelCommand::parse("q"), Ok(PanelCommand::Quit));
        assert_eq!(PanelCommand::parse("?"), Ok(PanelCommand::Help));
    }

    #[test]
    fn test_parse_errors() {
        assert!(PanelCommand::parse("s").is_err());
        assert!(PanelCommand::parse("k zero").is_err());
        assert!(PanelCommand::parse("0").is_err());
        assert!(PanelCommand::parse("frobnicate").is_err());
        assert!(PanelCommand::parse("term x").is_err());
    }
}
