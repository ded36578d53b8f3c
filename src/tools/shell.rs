//! Allowlisted shell command execution
//!
//! Only a fixed set of harmless binaries may run, always from the
//! repository root and under a timeout. Failures are folded into the
//! returned text so the calling ability can feed them straight back to
//! the model.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Default timeout for command execution
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Binaries allowed by default
const SAFE_BINARIES: &[&str] = &[
    "ls", "cat", "wc", "echo", "grep", "sed", "awk", "head", "tail", "cargo",
];

/// Allowlisted shell command executor
#[derive(Clone)]
pub struct SafeShell {
    root: PathBuf,
    allowed: HashSet<String>,
    timeout: Duration,
}

impl SafeShell {
    /// Create a shell confined to the given working directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed: SAFE_BINARIES.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Allow an extra binary
    pub fn allow(&mut self, binary: impl Into<String>) {
        self.allowed.insert(binary.into());
    }

    pub fn working_dir(&self) -> &Path {
        &self.root
    }

    /// Run a command if its binary is allowlisted. All failures come back
    /// as text, never as errors.
    pub async fn run(&self, cmd: &str) -> String {
        let parts = match shell_words::split(cmd) {
            Ok(parts) => parts,
            Err(e) => return format!("SHELL_ERROR: {e}"),
        };

        let Some(program) = parts.first() else {
            return "SHELL_ERROR: empty command".to_string();
        };

        if !self.allowed.contains(program) {
            return format!("SHELL_DENIED: '{program}' is not allowlisted");
        }

        debug!(command = %cmd, "running shell command");

        let mut command = Command::new(program);
        command.args(&parts[1..])
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return format!("SHELL_ERROR: failed to spawn '{program}': {e}"),
        };

        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                format!("RC={}\n{}", output.status.code().unwrap_or(-1), combined)
            }
            Ok(Err(e)) => format!("SHELL_ERROR: {e}"),
            Err(_) => format!("SHELL_TIMEOUT after {:?}", self.timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_denied_binary() {
        let dir = TempDir::new().unwrap();
        let shell = SafeShell::new(dir.path());

        let out = shell.run("rm -rf /").await;
        assert!(out.starts_with("SHELL_DENIED"));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = TempDir::new().unwrap();
        let shell = SafeShell::new(dir.path());

        assert!(shell.run("").await.starts_with("SHELL_ERROR"));
    }

    #[tokio::test]
    async fn test_echo_runs() {
        let dir = TempDir::new().unwrap();
        let shell = SafeShell::new(dir.path());

        let out = shell.run("echo hello").await;
        assert!(out.starts_with("RC=0"));
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn test_extra_allowed_binary() {
        let dir = TempDir::new().unwrap();
        let mut shell = SafeShell::new(dir.path());
        assert!(shell.run("true").await.starts_with("SHELL_DENIED"));

        shell.allow("true");
        assert!(shell.run("true").await.starts_with("RC=0"));
    }
}
