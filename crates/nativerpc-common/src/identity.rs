//! Process identity advertised by a client on connect.
//!
//! Identity is acquired once per server/client construction and never
//! mutated afterwards. The project is discovered by walking up from the
//! running executable towards a `workspace.json` marker (falling back to a
//! `Cargo.toml`), the way the rest of the tooling locates a project root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Marker file that identifies a project root.
pub const CONFIG_NAME: &str = "workspace.json";

/// Identity fields carried in the `connectClient` handshake body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessIdentity {
    pub project_id: String,
    pub client_id: String,
    pub parent_id: String,
    pub shell_id: String,
    pub entry_point: String,
}

impl ProcessIdentity {
    /// Identity with an explicit project id, keeping the process-derived
    /// fields. Used by tests and by processes serving several projects.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }
}

/// Acquires the identity of the running process.
///
/// Called once at client/server construction; pid, parent pid and the shell
/// pid chain are snapshots taken at that moment.
pub fn process_identity() -> ProcessIdentity {
    let pid = std::process::id();
    ProcessIdentity {
        project_id: project_name(),
        client_id: pid.to_string(),
        parent_id: parent_pid(pid).to_string(),
        shell_id: shell_chain(pid),
        entry_point: entry_point(),
    }
}

/// Path of the running executable, or empty when it cannot be resolved.
pub fn entry_point() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Project root containing this process, found by walking up from the
/// executable (then the working directory) towards a `workspace.json` or
/// `Cargo.toml` marker.
pub fn project_path() -> PathBuf {
    let start = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    if let Some(found) = start.as_deref().and_then(find_project_root) {
        return found;
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root(&cwd).unwrap_or(cwd)
}

/// Name of the project directory, used as the default `projectId`.
pub fn project_name() -> String {
    project_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(CONFIG_NAME).exists() || dir.join("Cargo.toml").exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Parent pid of `pid`, read from procfs. Returns 0 where unavailable.
fn parent_pid(pid: u32) -> u32 {
    read_ppid(pid).unwrap_or(0)
}

/// Chain of ancestor pids above the parent, joined with `:`. Best effort;
/// empty on platforms without procfs.
fn shell_chain(pid: u32) -> String {
    let mut chain = Vec::new();
    let mut current = read_ppid(pid).unwrap_or(0);
    while current > 1 && chain.len() < 8 {
        match read_ppid(current) {
            Some(parent) if parent > 0 => {
                chain.push(parent.to_string());
                current = parent;
            }
            _ => break,
        }
    }
    chain.join(":")
}

fn read_ppid(pid: u32) -> Option<u32> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("PPid:"))
        .and_then(|rest| rest.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_snapshot() {
        let identity = process_identity();
        assert_eq!(identity.client_id, std::process::id().to_string());
        assert!(!identity.project_id.is_empty());
        assert!(!identity.entry_point.is_empty());
    }

    #[test]
    fn test_identity_serializes_camel_case() {
        let identity = process_identity().with_project("alpha");
        let encoded = serde_json::to_value(&identity).unwrap();
        assert_eq!(encoded["projectId"], "alpha");
        assert!(encoded.get("entryPoint").is_some());
        assert!(encoded.get("shellId").is_some());
    }

    #[test]
    fn test_project_root_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_NAME), "{}").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_project_root(&nested).unwrap();
        assert_eq!(found, dir.path());
    }
}
