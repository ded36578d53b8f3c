//! Git-backed working tree for the self-modification cycle
//!
//! All operations are confined to a single repository root. A proposed
//! change is applied on a temporary branch, tests run against the working
//! tree, and a successful cycle merges the branch back to main. Each
//! subprocess gets a timeout; a timed-out test run reads as a failure.

use anyhow::{Result, Context, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::abilities::selfmod::{
    ApplyOutcome, MergeOutcome, TestOutcome,
    PatchApplier, TestRunner, MergeCommitter,
};
use crate::config::WorkspaceConfig;

/// Branch the patch is applied on before merging
const TEMP_BRANCH: &str = "agent/temp-change";

/// Main branch the tested change is merged back into
const MAIN_BRANCH: &str = "main";

/// Result of one subprocess run
#[derive(Debug)]
struct CommandOutput {
    /// Exit code (None if timed out or killed by signal)
    code: Option<i32>,
    /// Combined stdout + stderr
    output: String,
    timed_out: bool,
}

/// A git working tree scoped to one repository root.
#[derive(Clone)]
pub struct GitWorkspace {
    root: PathBuf,
    test_command: String,
    command_timeout: Duration,
}

impl GitWorkspace {
    /// Open a workspace rooted at `root`. The root must exist.
    pub fn new(root: impl AsRef<Path>, test_command: impl Into<String>, command_timeout: Duration) -> Result<Self> {
        let root = root.as_ref()
            .canonicalize()
            .context("Workspace root does not exist")?;

        Ok(Self {
            root,
            test_command: test_command.into(),
            command_timeout,
        })
    }

    pub fn from_config(config: &WorkspaceConfig) -> Result<Self> {
        Self::new(
            &config.repo_root,
            &config.test_command,
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a UTF-8 file, rejecting any path that resolves outside the
    /// repository root.
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let resolved = self.resolve(path.as_ref())?;
        tokio::fs::read_to_string(&resolved)
            .await
            .with_context(|| format!("Failed to read {}", resolved.display()))
    }

    /// Resolve a repository-relative path and enforce confinement.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            bail!("absolute paths are not allowed: {}", path.display());
        }

        let resolved = self.root.join(path)
            .canonicalize()
            .with_context(|| format!("invalid path: {}", path.display()))?;

        if !resolved.starts_with(&self.root) {
            bail!("path escapes repository root: {}", path.display());
        }

        Ok(resolved)
    }

    /// Run a program with arguments inside the repository root.
    async fn run_cmd(&self, program: &str, args: &[&str], stdin_data: Option<&str>) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(if stdin_data.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        if let Some(data) = stdin_data {
            let mut stdin = child.stdin.take()
                .context("Failed to open child stdin")?;
            stdin.write_all(data.as_bytes()).await
                .context("Failed to write to child stdin")?;
            drop(stdin);
        }

        match timeout(self.command_timeout, child.wait_with_output()).await {
            Ok(result) => {
                let output = result.context("Failed to collect command output")?;
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));

                Ok(CommandOutput {
                    code: output.status.code(),
                    output: combined,
                    timed_out: false,
                })
            }
            Err(_) => Ok(CommandOutput {
                code: None,
                output: format!("command timed out after {:?}", self.command_timeout),
                timed_out: true,
            }),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_cmd("git", args, None).await
    }

    /// Make sure the root is a git repository with a main branch and a
    /// committed snapshot to branch from.
    pub async fn ensure_git(&self) -> Result<()> {
        self.run_git(&["init"]).await?;
        self.run_git(&["config", "user.email", "agent@localhost"]).await?;
        self.run_git(&["config", "user.name", "Forge Agent"]).await?;
        self.run_git(&["checkout", "-B", MAIN_BRANCH]).await?;
        self.run_git(&["add", "-A"]).await?;
        self.run_git(&["commit", "-m", "agent: snapshot", "--allow-empty"]).await?;
        Ok(())
    }
}

#[async_trait]
impl PatchApplier for GitWorkspace {
    /// Apply a unified diff on the temporary branch. The diff is expected
    /// in `-p0` form (plain repository-relative paths).
    async fn apply_change(&self, change: &str) -> Result<ApplyOutcome> {
        self.ensure_git().await?;
        self.run_git(&["checkout", "-B", TEMP_BRANCH]).await?;

        let patch = self.run_cmd(
            "git",
            &["apply", "--whitespace=fix", "-p0"],
            Some(change),
        ).await?;

        if patch.code != Some(0) {
            debug!("patch did not apply cleanly");
            return Ok(ApplyOutcome {
                success: false,
                diagnostic: format!("PATCH_FAILED:\n{}", patch.output),
            });
        }

        self.run_git(&["add", "-A"]).await?;
        let commit = self.run_git(&["commit", "-m", "agent: apply patch"]).await?;

        info!(root = %self.root.display(), "patch applied");
        Ok(ApplyOutcome {
            success: true,
            diagnostic: format!("PATCH_APPLIED rc={}\n{}", commit.code.unwrap_or(-1), commit.output),
        })
    }
}

#[async_trait]
impl TestRunner for GitWorkspace {
    /// Run the configured test command. The exit code is embedded as a
    /// `TESTS_RC=<n>` marker line so downstream evaluation stays text-based.
    async fn run_tests(&self) -> Result<TestOutcome> {
        let result = self.run_cmd("sh", &["-c", &self.test_command], None).await?;

        if result.timed_out {
            return Ok(TestOutcome {
                passed: false,
                output: format!("TESTS_TIMEOUT\n{}", result.output),
            });
        }

        let code = result.code.unwrap_or(-1);
        Ok(TestOutcome {
            passed: code == 0,
            output: format!("TESTS_RC={}\n{}", code, result.output),
        })
    }
}

#[async_trait]
impl MergeCommitter for GitWorkspace {
    /// Merge the temporary branch back to main with a merge commit.
    async fn merge(&self) -> Result<MergeOutcome> {
        let checkout = self.run_git(&["checkout", MAIN_BRANCH]).await?;
        if checkout.code != Some(0) {
            return Ok(MergeOutcome {
                success: false,
                diagnostic: format!("MERGE_RC={}\n{}", checkout.code.unwrap_or(-1), checkout.output),
            });
        }

        let merge = self.run_git(&[
            "merge", "--no-ff", TEMP_BRANCH, "-m", "agent: merge temp-change",
        ]).await?;

        let code = merge.code.unwrap_or(-1);
        Ok(MergeOutcome {
            success: code == 0,
            diagnostic: format!("MERGE_RC={}\n{}", code, merge.output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace_in(dir: &TempDir) -> GitWorkspace {
        GitWorkspace::new(dir.path(), "true", Duration::from_secs(30)).unwrap()
    }

    #[tokio::test]
    async fn test_read_file_inside_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello").unwrap();

        let ws = workspace_in(&dir);
        let content = ws.read_file("hello.txt").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_read_file_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let ws = workspace_in(&dir);

        assert!(ws.read_file("../outside.txt").await.is_err());
        assert!(ws.read_file("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let result = GitWorkspace::new("/nonexistent/path/xyz", "true", Duration::from_secs(5));
        assert!(result.is_err());
    }
}
