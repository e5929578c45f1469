//! Ephemeral workspaces and deadline-bounded command execution.
//!
//! Everything in WARDEN that leaves the process boundary (typecheck shells,
//! mutation runners, staged batch applies) goes through this crate so that
//! timeouts, output capture, and workspace cleanup behave identically
//! everywhere.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;

/// Errors raised by workspace and command plumbing.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("workspace walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path escapes workspace: {0}")]
    PathEscape(String),
}

/// Result type for exec operations.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Directories never seeded into or collected from a workspace.
const SKIP_DIRS: &[&str] = &["node_modules", "target", "dist", "build", ".git"];

/// Captured result of one external command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Runs shell invocations in a working directory under a deadline.
///
/// The deadline is mandatory: a runner without one would let a wedged
/// external tool hold a checkpoint open forever.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    deadline: Duration,
}

impl CommandRunner {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `sh -c <command>` in `workdir`, capturing stdout/stderr.
    ///
    /// A non-zero exit is not an error at this layer; callers inspect
    /// `success`. Only spawn failures and deadline expiry surface as `Err`.
    pub async fn run_shell(&self, command: &str, workdir: &Path) -> Result<CommandOutput> {
        let future = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .output();

        let output = tokio::time::timeout(self.deadline, future)
            .await
            .map_err(|_| ExecError::Timeout(self.deadline))??;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        // Matches the mutation-testing default; most callers override downward.
        Self::new(Duration::from_secs(300))
    }
}

/// Ephemeral workspace seeded from an in-memory file map.
///
/// The backing directory is destroyed on drop, including on error paths.
pub struct ScratchDir {
    temp_dir: TempDir,
}

impl ScratchDir {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("warden-scratch-")
            .tempdir()?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write the file map into the workspace, creating parent directories.
    pub fn seed(&self, files: &BTreeMap<String, String>) -> Result<()> {
        for (rel, content) in files {
            let dest = self.resolve(rel)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, content)?;
        }
        Ok(())
    }

    /// Read the workspace back into a file map, skipping build output and
    /// dependency directories.
    pub fn collect(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let walker = walkdir::WalkDir::new(self.path()).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref())
        });

        for entry in walker {
            let entry = entry?;
            if entry.path().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(self.path())
                    .unwrap_or_else(|_| entry.path());
                let key = rel.to_string_lossy().replace('\\', "/");
                files.insert(key, std::fs::read_to_string(entry.path())?);
            }
        }
        Ok(files)
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        let escapes = rel_path.is_absolute()
            || rel_path.components().any(|c| matches!(c, Component::ParentDir));
        if escapes {
            return Err(ExecError::PathEscape(rel.to_string()));
        }
        Ok(self.temp_dir.path().join(rel_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scratch_round_trips_file_map() -> anyhow::Result<()> {
        let scratch = ScratchDir::new()?;
        let mut files = BTreeMap::new();
        files.insert("src/index.ts".to_string(), "export const x = 1;\n".to_string());
        files.insert("README.md".to_string(), "hello\n".to_string());

        scratch.seed(&files)?;
        let collected = scratch.collect()?;

        assert_eq!(collected, files);
        Ok(())
    }

    #[tokio::test]
    async fn scratch_rejects_escaping_paths() {
        let scratch = ScratchDir::new().unwrap();
        let mut files = BTreeMap::new();
        files.insert("../outside.txt".to_string(), "nope".to_string());

        assert!(matches!(scratch.seed(&files), Err(ExecError::PathEscape(_))));
    }

    #[tokio::test]
    async fn runner_captures_output_and_exit_code() -> anyhow::Result<()> {
        let scratch = ScratchDir::new()?;
        let runner = CommandRunner::new(Duration::from_secs(5));

        let ok = runner.run_shell("printf ok", scratch.path()).await?;
        assert!(ok.success);
        assert_eq!(ok.stdout, "ok");

        let fail = runner.run_shell("exit 3", scratch.path()).await?;
        assert!(!fail.success);
        assert_eq!(fail.exit_code, 3);
        Ok(())
    }

    #[tokio::test]
    async fn runner_enforces_deadline() {
        let scratch = ScratchDir::new().unwrap();
        let runner = CommandRunner::new(Duration::from_millis(100));

        let result = runner.run_shell("sleep 5", scratch.path()).await;
        assert!(matches!(result, Err(ExecError::Timeout(_))));
    }
}
