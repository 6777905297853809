//! In-memory multiplexer for tests.
//!
//! Models windows holding ordered panes. Swapping exchanges two panes'
//! positions, so pane ids travel with their content exactly as they do in
//! tmux.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use super::layout::placeholder_command;
use super::{Multiplexer, FORMAT_CURRENT_COMMAND, FORMAT_PANE_PID, FORMAT_PANE_TITLE};
use crate::error::{CorralError, Result};
use crate::session::LivePane;
use crate::status::clean_title;

#[derive(Debug, Clone)]
pub(crate) struct FakePane {
    pub id: String,
    pub current_command: String,
    pub start_command: String,
    pub path: String,
    pub title: String,
    pub content: String,
    pub pid: u32,
}

#[derive(Debug, Default)]
struct Inner {
    windows: BTreeMap<u32, Vec<FakePane>>,
    next_id: u32,
    next_pid: u32,
    fail_new_window: bool,
    fail_swap: bool,
}

impl Inner {
    fn locate(&self, pane: &str) -> Option<(u32, usize)> {
        self.windows.iter().find_map(|(w, panes)| {
            panes.iter().position(|p| p.id == pane).map(|i| (*w, i))
        })
    }

    fn pane_mut(&mut self, pane: &str) -> Option<&mut FakePane> {
        self.windows.values_mut().flatten().find(|p| p.id == pane)
    }

    fn spawn(&mut self, command: &str, start_command: &str, path: &str) -> FakePane {
        let id = format!("%{}", self.next_id);
        self.next_id += 1;
        self.next_pid += 1;
        FakePane {
            id,
            current_command: command.to_string(),
            start_command: start_command.to_string(),
            path: path.to_string(),
            title: String::new(),
            content: String::new(),
            pid: 1000 + self.next_pid,
        }
    }
}

fn missing(pane: &str) -> CorralError {
    CorralError::CommandFailed {
        command: "fake".to_string(),
        details: format!("can't find pane: {}", pane),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeMux {
    inner: RefCell<Inner>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window 0 holding a sidebar and a placeholder viewport.
    pub fn with_layout() -> (Self, String, String) {
        let mux = Self::new();
        let (sidebar, viewport) = {
            let mut inner = mux.inner.borrow_mut();
            let sidebar = inner.spawn("corral", "corral panel --sidebar", "/");
            let viewport = inner.spawn("sh", &placeholder_command().join(" "), "/");
            let ids = (sidebar.id.clone(), viewport.id.clone());
            inner.windows.insert(0, vec![sidebar, viewport]);
            ids
        };
        (mux, sidebar, viewport)
    }

    /// Open a new window with a single pane; returns the pane id.
    pub fn add_window(&self, command: &str, path: &str) -> String {
        let mut inner = self.inner.borrow_mut();
        let pane = inner.spawn(command, command, path);
        let id = pane.id.clone();
        let index = inner.windows.keys().next_back().map_or(0, |w| w + 1);
        inner.windows.insert(index, vec![pane]);
        id
    }

    /// Add an extra pane to an existing window.
    pub fn split(&self, window: u32, command: &str) -> String {
        let mut inner = self.inner.borrow_mut();
        let pane = inner.spawn(command, command, "/");
        let id = pane.id.clone();
        inner.windows.entry(window).or_default().push(pane);
        id
    }

    pub fn set_content(&self, pane: &str, content: &str) {
        if let Some(p) = self.inner.borrow_mut().pane_mut(pane) {
            p.content = content.to_string();
        }
    }

    pub fn set_title(&self, pane: &str, title: &str) {
        if let Some(p) = self.inner.borrow_mut().pane_mut(pane) {
            p.title = title.to_string();
        }
    }

    pub fn set_current_command(&self, pane: &str, command: &str) {
        if let Some(p) = self.inner.borrow_mut().pane_mut(pane) {
            p.current_command = command.to_string();
        }
    }

    /// Simulate a pane dying on its own.
    pub fn destroy(&self, pane: &str) {
        let _ = self.kill_pane(pane);
    }

    pub fn window_of(&self, pane: &str) -> Option<u32> {
        self.inner.borrow().locate(pane).map(|(w, _)| w)
    }

    /// Pane ids in a window, in position order.
    pub fn panes_in(&self, window: u32) -> Vec<String> {
        self.inner
            .borrow()
            .windows
            .get(&window)
            .map(|panes| panes.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn pane(&self, pane: &str) -> Option<FakePane> {
        let inner = self.inner.borrow();
        inner.windows.values().flatten().find(|p| p.id == pane).cloned()
    }

    pub fn fail_new_window(&self, fail: bool) {
        self.inner.borrow_mut().fail_new_window = fail;
    }

    pub fn fail_swap(&self, fail: bool) {
        self.inner.borrow_mut().fail_swap = fail;
    }
}

impl Multiplexer for FakeMux {
    fn list_panes(&self) -> Result<Vec<LivePane>> {
        let inner = self.inner.borrow();
        Ok(inner
            .windows
            .iter()
            .flat_map(|(w, panes)| {
                panes.iter().map(move |p| LivePane {
                    pane_ref: p.id.clone(),
                    window_index: *w,
                    current_command: p.current_command.clone(),
                    start_command: p.start_command.clone(),
                    current_path: p.path.clone(),
                    title: clean_title(&p.title),
                })
            })
            .collect())
    }

    fn pane_exists(&self, pane: &str) -> bool {
        self.inner.borrow().locate(pane).is_some()
    }

    fn pane_info(&self, pane: &str, format: &str) -> Result<String> {
        let p = self.pane(pane).ok_or_else(|| missing(pane))?;
        match format {
            FORMAT_PANE_TITLE => Ok(p.title),
            FORMAT_PANE_PID => Ok(p.pid.to_string()),
            FORMAT_CURRENT_COMMAND => Ok(p.current_command),
            other => Err(CorralError::CommandFailed {
                command: "fake".to_string(),
                details: format!("unsupported format {}", other),
            }),
        }
    }

    fn capture_pane(&self, pane: &str) -> Result<String> {
        self.pane(pane).map(|p| p.content).ok_or_else(|| missing(pane))
    }

    fn new_window(&self, _name: &str, dir: &Path, command: &[String]) -> Result<String> {
        if self.inner.borrow().fail_new_window {
            return Err(CorralError::CommandFailed {
                command: "fake new-window".to_string(),
                details: "injected failure".to_string(),
            });
        }
        let program = command
            .first()
            .and_then(|c| c.rsplit('/').next())
            .unwrap_or("sh");
        let id = self.add_window(program, &dir.to_string_lossy());
        if let Some(p) = self.inner.borrow_mut().pane_mut(&id) {
            p.start_command = command.join(" ");
        }
        Ok(id)
    }

    fn swap_panes(&self, source: &str, target: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_swap {
            return Err(CorralError::CommandFailed {
                command: "fake swap-pane".to_string(),
                details: "injected failure".to_string(),
            });
        }
        let (sw, si) = inner.locate(source).ok_or_else(|| missing(source))?;
        let (tw, ti) = inner.locate(target).ok_or_else(|| missing(target))?;
        if sw == tw {
            if let Some(panes) = inner.windows.get_mut(&sw) {
                panes.swap(si, ti);
            }
            return Ok(());
        }
        let a = inner.windows.get(&sw).map(|p| p[si].clone()).ok_or_else(|| missing(source))?;
        let b = inner.windows.get(&tw).map(|p| p[ti].clone()).ok_or_else(|| missing(target))?;
        if let Some(panes) = inner.windows.get_mut(&sw) {
            panes[si] = b;
        }
        if let Some(panes) = inner.windows.get_mut(&tw) {
            panes[ti] = a;
        }
        Ok(())
    }

    fn select_pane(&self, pane: &str) -> Result<()> {
        if self.pane_exists(pane) {
            Ok(())
        } else {
            Err(missing(pane))
        }
    }

    fn kill_pane(&self, pane: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let (w, i) = inner.locate(pane).ok_or_else(|| missing(pane))?;
        let now_empty = inner.windows.get_mut(&w).is_some_and(|panes| {
            panes.remove(i);
            panes.is_empty()
        });
        if now_empty {
            inner.windows.remove(&w);
        }
        Ok(())
    }

    fn respawn_pane(&self, pane: &str, command: &[String]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.next_pid += 1;
        let pid = 1000 + inner.next_pid;
        let p = inner.pane_mut(pane).ok_or_else(|| missing(pane))?;
        p.start_command = command.join(" ");
        p.current_command = command
            .first()
            .and_then(|c| c.rsplit('/').next())
            .unwrap_or("sh")
            .to_string();
        p.content.clear();
        p.title.clear();
        p.pid = pid;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_moves_panes_between_windows() {
        let (mux, sidebar, viewport) = FakeMux::with_layout();
        let session = mux.add_window("claude", "/w");
        assert_eq!(mux.window_of(&session), Some(1));

        mux.swap_panes(&session, &viewport).unwrap();
        assert_eq!(mux.panes_in(0), vec![sidebar, session.clone()]);
        assert_eq!(mux.panes_in(1), vec![viewport]);
    }

    #[test]
    fn killing_last_pane_drops_window() {
        let mux = FakeMux::new();
        let pane = mux.add_window("zsh", "/w");
        mux.kill_pane(&pane).unwrap();
        assert!(!mux.pane_exists(&pane));
        assert!(mux.list_panes().unwrap().is_empty());
        assert!(mux.kill_pane(&pane).is_err());
    }

    #[test]
    fn respawn_keeps_pane_id() {
        let mux = FakeMux::new();
        let pane = mux.add_window("claude", "/w");
        mux.set_content(&pane, "old");
        mux.respawn_pane(&pane, &["sh".to_string(), "-c".to_string(), "x".to_string()]).unwrap();
        let p = mux.pane(&pane).unwrap();
        assert_eq!(p.current_command, "sh");
        assert!(p.content.is_empty());
    }
}
