//! Plain-text rendering of the session list.
//!
//! Rendering produces styled rows; only [`draw`] touches the terminal.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::{Color, Print, ResetColor, SetAttribute, Attribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;

use crate::session::{Session, State, Status};

/// One line of panel output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub text: String,
    pub color: Option<Color>,
    pub bold: bool,
}

impl Row {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: false,
        }
    }

    fn colored(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
            bold: false,
        }
    }
}

/// Session indices in display order: grouped by project, first occurrence first.
pub fn display_order(state: &State) -> Vec<usize> {
    state
        .project_groups()
        .into_iter()
        .flat_map(|g| g.members)
        .collect()
}

/// Session shown at 1-based display position `n`.
pub fn session_at(state: &State, n: usize) -> Option<&Session> {
    let idx = *display_order(state).get(n.checked_sub(1)?)?;
    state.sessions.get(idx)
}

/// Resolve a session by id, display number or unique id prefix.
pub fn lookup<'a>(state: &'a State, key: &str) -> Option<&'a Session> {
    if let Some(session) = state.find_by_id(key) {
        return Some(session);
    }
    if let Ok(n) = key.parse::<usize>() {
        return session_at(state, n);
    }
    let mut matches = state.sessions.iter().filter(|s| s.id.starts_with(key));
    match (matches.next(), matches.next()) {
        (Some(session), None) if !key.is_empty() => Some(session),
        _ => None,
    }
}

fn glyph(status: Status) -> (&'static str, Color) {
    match status {
        Status::Running => ("●", Color::Green),
        Status::Input => ("◐", Color::Yellow),
        Status::Idle => ("○", Color::DarkGrey),
        Status::Done => ("✓", Color::Cyan),
        Status::PlanReady => ("◆", Color::Magenta),
        Status::Shell => ("$", Color::DarkGrey),
        Status::Service => ("⇄", Color::Blue),
        Status::Exited => ("✗", Color::Red),
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Build the rows for `state`.
pub fn render(state: &State, width: usize, message: Option<&str>, waiting_on_dialog: bool) -> Vec<Row> {
    let mut rows = Vec::new();

    if state.sessions.is_empty() {
        rows.push(Row::plain("  No sessions yet."));
        rows.push(Row::plain("  Type new to create one."));
    }

    let mut n = 0;
    for group in state.project_groups() {
        rows.push(Row::colored(truncate_string(&group.project, width), Color::Blue));
        for idx in group.members {
            n += 1;
            let session = &state.sessions[idx];
            let (mark, color) = glyph(session.status);
            let mut label = session.display_name().to_string();
            if session.is_worktree && label != session.worktree_branch {
                label = format!("{} [{}]", label, session.worktree_branch);
            }
            if let Some(port) = session.service_port {
                label = format!("{} :{}", label, port);
            }
            let line = format!("{:>2} {} {}", n, mark, label);
            rows.push(Row {
                text: truncate_string(&line, width),
                color: Some(color),
                bold: state.last_active_session.as_deref() == Some(session.id.as_str()),
            });
        }
    }

    rows.push(Row::plain(""));
    if waiting_on_dialog {
        rows.push(Row::colored("waiting for dialog...", Color::DarkGrey));
    }
    if let Some(message) = message.filter(|m| !m.is_empty()) {
        rows.push(Row::colored(truncate_string(message, width), Color::Red));
    }
    rows
}

/// Clear the screen and print `rows` followed by the prompt and `input`.
pub fn draw(out: &mut impl Write, rows: &[Row], input: &str) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    for (line, row) in rows.iter().enumerate() {
        let y = u16::try_from(line).unwrap_or(u16::MAX);
        queue!(out, MoveTo(0, y))?;
        if row.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if let Some(color) = row.color {
            queue!(out, SetForegroundColor(color))?;
        }
        queue!(out, Print(&row.text), ResetColor, SetAttribute(Attribute::Reset))?;
    }
    let prompt_line = u16::try_from(rows.len()).unwrap_or(u16::MAX);
    queue!(out, MoveTo(0, prompt_line), Print("> "), Print(input))?;
    out.flush()
}
