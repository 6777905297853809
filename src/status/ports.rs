//! Listening-port detection for terminal sessions.
//!
//! Walking the process tree and enumerating sockets is racy and
//! platform-specific, so the classifier only sees the [`PortProbe`] trait.

use std::collections::HashMap;
use std::process::Command;

use sysinfo::System;
use tracing::debug;

/// How many generations below the pane's process to search.
pub const MAX_TREE_DEPTH: usize = 5;

/// Highest port considered a user service; above this is the ephemeral range.
pub const MAX_SERVICE_PORT: u16 = 49151;

/// Finds a listening TCP port owned by a set of processes.
pub trait PortProbe {
    /// Lowest non-ephemeral listening port owned by any of `pids`.
    fn find_listening_port(&self, pids: &[u32]) -> Option<u16>;

    /// `root` and its descendants down to [`MAX_TREE_DEPTH`] generations.
    fn process_tree(&self, root: u32) -> Vec<u32> {
        process_tree(root, MAX_TREE_DEPTH)
    }
}

/// [`PortProbe`] using the `sysinfo` process table and `lsof`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsofProbe;

impl PortProbe for LsofProbe {
    fn find_listening_port(&self, pids: &[u32]) -> Option<u16> {
        if pids.is_empty() {
            return None;
        }
        let pid_list = pids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let output = match Command::new("lsof")
            .args(["-nP", "-iTCP", "-sTCP:LISTEN", "-a", "-p", &pid_list])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "lsof unavailable");
                return None;
            }
        };

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_lsof_port)
            .min()
    }
}

/// Collect `root` plus its descendants, breadth first, up to `max_depth`.
pub fn process_tree(root: u32, max_depth: usize) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    let mut pids = vec![root];
    let mut frontier = vec![root];
    for _ in 0..max_depth {
        let next: Vec<u32> = frontier
            .iter()
            .filter_map(|pid| children.get(pid))
            .flatten()
            .copied()
            .collect();
        if next.is_empty() {
            break;
        }
        pids.extend(&next);
        frontier = next;
    }
    pids
}

/// Extract the port from one lsof line, e.g.
/// `node 12345 u 20u IPv4 0x0 0t0 TCP *:3000 (LISTEN)`.
pub fn parse_lsof_port(line: &str) -> Option<u16> {
    let idx = line.find("(LISTEN)")?;
    let addr = line[..idx].split_whitespace().last()?;
    let (_, port) = addr.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    (1..=MAX_SERVICE_PORT).contains(&port).then_some(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listen_lines() {
        assert_eq!(
            parse_lsof_port("node    12345 user   20u  IPv4 0xabc 0t0  TCP *:3000 (LISTEN)"),
            Some(3000)
        );
        assert_eq!(
            parse_lsof_port("python3 2222 user 3u IPv6 0xdef 0t0 TCP [::1]:8080 (LISTEN)"),
            Some(8080)
        );
        assert_eq!(
            parse_lsof_port("ruby 1 u 5u IPv4 0x1 0t0 TCP 127.0.0.1:4000 (LISTEN)"),
            Some(4000)
        );
    }

    #[test]
    fn rejects_headers_established_and_ephemeral_ports() {
        assert_eq!(parse_lsof_port("COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME"), None);
        assert_eq!(
            parse_lsof_port("node 1 u 20u IPv4 0x1 0t0 TCP 127.0.0.1:3000->127.0.0.1:5000 (ESTABLISHED)"),
            None
        );
        assert_eq!(parse_lsof_port("node 1 u 20u IPv4 0x1 0t0 TCP *:52000 (LISTEN)"), None);
        assert_eq!(parse_lsof_port("node 1 u 20u IPv4 0x1 0t0 TCP *:0 (LISTEN)"), None);
    }

    #[test]
    fn process_tree_always_contains_root() {
        let me = std::process::id();
        let tree = process_tree(me, MAX_TREE_DEPTH);
        assert_eq!(tree.first(), Some(&me));
    }

    #[test]
    fn empty_pid_set_finds_nothing() {
        assert_eq!(LsofProbe.find_listening_port(&[]), None);
    }
}
