//! Path-confined, command-whitelisted sandbox executor (§4.6).
//!
//! Defense-in-depth, not a full isolation boundary: it presumes the
//! verifier has already admitted the action.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path escapes sandbox root: {0}")]
    PathEscape(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("command not in allowed set: {0}")]
    CommandNotAllowed(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Policy governing the sandbox: which command basenames may run, and the
/// default execution timeout.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub allowed_commands: HashSet<String>,
    pub default_timeout: Duration,
}

impl SandboxPolicy {
    pub fn new(allowed_commands: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed_commands: allowed_commands.into_iter().collect(),
            default_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Result of running a command in the sandbox (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub command: Vec<String>,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Owns a canonicalized root directory and runs commands confined to it.
pub struct SandboxExecutor {
    root: PathBuf,
    policy: SandboxPolicy,
}

impl SandboxExecutor {
    /// Creates (if needed) and canonicalizes the sandbox root. Path
    /// canonicalization resolves symlinks so later escape checks are
    /// meaningful (§5).
    pub fn new(root: impl AsRef<Path>, policy: SandboxPolicy) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        tracing::debug!(root = %root.display(), "sandbox root established");
        Ok(Self { root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `root/relative_path`, canonicalizing its parent directory
    /// and rejecting any candidate that escapes `root`.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, SandboxError> {
        let joined = self.root.join(relative_path);
        let parent = joined
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&parent)?;
        let canonical_parent = parent.canonicalize()?;
        if !canonical_parent.starts_with(&self.root) {
            return Err(SandboxError::PathEscape(relative_path.to_string()));
        }
        let file_name = joined
            .file_name()
            .ok_or_else(|| SandboxError::PathEscape(relative_path.to_string()))?;
        let candidate = canonical_parent.join(file_name);
        Ok(candidate)
    }

    pub fn write_text(&self, relative_path: &str, content: &str) -> Result<(), SandboxError> {
        let path = self.resolve(relative_path)?;
        let mut file = std::fs::File::create(&path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn read_text(&self, relative_path: &str) -> Result<String, SandboxError> {
        let path = self.resolve(relative_path)?;
        let canonical = path.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(SandboxError::PathEscape(relative_path.to_string()));
        }
        let mut file = std::fs::File::open(&canonical)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Rejects empty commands; rejects when the executable's basename is
    /// not in the policy's allowed set; runs with `cwd = root`, applies a
    /// timeout, and never raises on non-zero exit codes (§4.6).
    pub fn run(
        &self,
        command: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, SandboxError> {
        let Some(program) = command.first() else {
            return Err(SandboxError::EmptyCommand);
        };
        let basename = Path::new(program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(program);
        if !self.policy.allowed_commands.contains(basename) {
            return Err(SandboxError::CommandNotAllowed(basename.to_string()));
        }

        let timeout = timeout.unwrap_or(self.policy.default_timeout);
        tracing::info!(command = ?command, timeout = ?timeout, "sandbox run");

        let mut child = Command::new(program)
            .args(&command[1..])
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain stdout/stderr on their own threads concurrently with the
        // wait loop below. A command that writes more than the OS pipe
        // buffer would otherwise block in write() while try_wait() never
        // returns, tripping the timeout on output that would have
        // completed fine.
        let stdout_pipe = child.stdout.take().expect("stdout was piped");
        let stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_thread = std::thread::spawn(move || {
            let mut buf = String::new();
            let mut pipe = stdout_pipe;
            let _ = pipe.read_to_string(&mut buf);
            buf
        });
        let stderr_thread = std::thread::spawn(move || {
            let mut buf = String::new();
            let mut pipe = stderr_pipe;
            let _ = pipe.read_to_string(&mut buf);
            buf
        });

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_thread.join();
                let _ = stderr_thread.join();
                return Err(SandboxError::Timeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();

        Ok(ExecutionResult {
            command: command.to_vec(),
            returncode: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}
