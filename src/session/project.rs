//! Project grouping over the flat session sequence.
//!
//! The persisted form stays a flat list; groups are recomputed on demand from
//! the first-occurrence order of each project, so the two can never drift.

use super::{SessionKind, State};

/// Direction for reordering operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// One project and the indices of its sessions in `State::sessions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGroup {
    pub project: String,
    pub members: Vec<usize>,
}

impl State {
    /// Group sessions by project in first-occurrence order.
    pub fn project_groups(&self) -> Vec<ProjectGroup> {
        let mut groups: Vec<ProjectGroup> = Vec::new();
        for (idx, session) in self.sessions.iter().enumerate() {
            match groups.iter_mut().find(|g| g.project == session.project) {
                Some(group) => group.members.push(idx),
                None => groups.push(ProjectGroup {
                    project: session.project.clone(),
                    members: vec![idx],
                }),
            }
        }
        groups
    }

    /// Move a session one step among siblings of the same project and kind.
    ///
    /// Returns false if the session is unknown or already at the edge.
    pub fn move_session(&mut self, id: &str, direction: Direction) -> bool {
        let Some(idx) = self.sessions.iter().position(|s| s.id == id) else {
            return false;
        };
        let project = self.sessions[idx].project.clone();
        let kind: SessionKind = self.sessions[idx].kind;
        let is_sibling = |i: &usize| {
            let s = &self.sessions[*i];
            s.project == project && s.kind == kind
        };

        let neighbor = match direction {
            Direction::Up => (0..idx).rev().find(is_sibling),
            Direction::Down => (idx + 1..self.sessions.len()).find(is_sibling),
        };

        match neighbor {
            Some(other) => {
                self.sessions.swap(idx, other);
                true
            }
            None => false,
        }
    }

    /// Move a whole project group one step relative to its neighbours.
    ///
    /// The sequence is regrouped and reflattened; each group keeps its
    /// internal order. Returns false if the project is unknown or at the edge.
    pub fn move_project(&mut self, project: &str, direction: Direction) -> bool {
        let mut groups = self.project_groups();
        let Some(pos) = groups.iter().position(|g| g.project == project) else {
            return false;
        };
        let target = match direction {
            Direction::Up if pos > 0 => pos - 1,
            Direction::Down if pos + 1 < groups.len() => pos + 1,
            _ => return false,
        };
        groups.swap(pos, target);

        let mut slots: Vec<Option<_>> = std::mem::take(&mut self.sessions)
            .into_iter()
            .map(Some)
            .collect();
        self.sessions = groups
            .iter()
            .flat_map(|g| g.members.iter())
            .filter_map(|&idx| slots[idx].take())
            .collect();
        true
    }
}
