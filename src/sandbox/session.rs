//! Scoped execution context for one artifact.
//!
//! A session owns a fresh temp directory holding the artifact, the harness
//! and its config. Dropping the session removes the directory; a child still
//! running when its wait is abandoned is killed on drop.

use serde_json::json;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use super::SandboxFailure;
use crate::config::SandboxSettings;
use crate::heal::HealedArtifact;

const HARNESS: &str = include_str!("harness.py");

/// What the interpreter left behind.
#[derive(Debug)]
pub struct RunOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
}

/// Temp directory, artifact and harness for a single execution.
#[derive(Debug)]
pub struct SandboxSession {
    dir: TempDir,
    harness_path: PathBuf,
    config_path: PathBuf,
    marker: String,
}

fn setup(context: &str, err: std::io::Error) -> SandboxFailure {
    SandboxFailure::Setup(format!("{}: {}", context, err))
}

/// Locate `program` on the parent's `PATH`; the child runs with an empty
/// environment and could not search it.
fn resolve_program(program: &str) -> Result<PathBuf, SandboxFailure> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    std::env::var_os("PATH")
        .iter()
        .flat_map(std::env::split_paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| SandboxFailure::Setup(format!("interpreter '{}' not found on PATH", program)))
}

impl SandboxSession {
    /// Take ownership of `artifact` and lay out a fresh session directory.
    pub fn open(artifact: HealedArtifact, settings: &SandboxSettings) -> Result<Self, SandboxFailure> {
        let dir = tempfile::Builder::new()
            .prefix("codemend-sandbox-")
            .tempdir()
            .map_err(|e| setup("failed to create sandbox directory", e))?;

        let token = dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let marker = format!("@@{}@@", token);

        let artifact_path = dir.path().join("artifact.py");
        let harness_path = dir.path().join("harness.py");
        let config_path = dir.path().join("harness.json");

        std::fs::write(&artifact_path, artifact.into_text())
            .map_err(|e| setup("failed to write artifact", e))?;
        std::fs::write(&harness_path, HARNESS).map_err(|e| setup("failed to write harness", e))?;

        let config = json!({
            "marker": marker,
            "artifact": artifact_path,
            "memory_limit_mb": settings.memory_limit_mb,
            "cpu_limit_seconds": settings.cpu_limit_seconds,
            "allowed_imports": settings.allowed_imports,
            "allowed_paths": settings.allowed_paths,
        });
        std::fs::write(&config_path, config.to_string())
            .map_err(|e| setup("failed to write harness config", e))?;

        debug!(dir = %dir.path().display(), "sandbox session opened");
        Ok(Self {
            dir,
            harness_path,
            config_path,
            marker,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Prefix of the harness report line.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Run the harness under `argv` with an empty environment, no stdin and
    /// a wall-clock `timeout`.
    pub async fn run(&self, argv: &[String], timeout: Duration) -> Result<RunOutput, SandboxFailure> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SandboxFailure::Setup("interpreter command is empty".to_string()))?;
        let program = resolve_program(program)?;

        let started = Instant::now();
        let child = Command::new(&program)
            .args(args)
            .arg(&self.harness_path)
            .arg(&self.config_path)
            .current_dir(self.dir.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SandboxFailure::Setup(format!(
                    "interpreter '{}' not found",
                    program.display()
                )),
                _ => setup("failed to start interpreter", e),
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| setup("failed to collect interpreter output", e))?,
            Err(_) => {
                return Err(SandboxFailure::ExecutionTimeout {
                    seconds: timeout.as_secs(),
                });
            }
        };

        Ok(RunOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started.elapsed(),
        })
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        debug!(dir = %self.dir.path().display(), "sandbox session torn down");
    }
}
