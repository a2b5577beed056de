//! The sandbox executor.

use async_trait::async_trait;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::precheck::check_imports;
use super::report::{HarnessReport, evaluate};
use super::session::{RunOutput, SandboxSession};
use super::{SandboxFailure, ValidationScores};
use crate::config::SandboxSettings;
use crate::heal::HealedArtifact;
use crate::skill::InputKind;

/// Lines of interpreter stderr kept in a fault message.
const STDERR_TAIL_LINES: usize = 5;

/// Runs a healed artifact and scores its entry points.
///
/// Takes the artifact by value: once handed over, its lifetime belongs to
/// the executor.
#[async_trait]
pub trait ArtifactExecutor: Send + Sync {
    async fn execute(&self, artifact: HealedArtifact, kind: InputKind) -> Result<ValidationScores, SandboxFailure>;
}

/// Executes artifacts with the configured interpreter and embedded harness.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    settings: SandboxSettings,
    argv: Vec<String>,
}

impl SandboxExecutor {
    pub fn new(settings: SandboxSettings) -> Result<Self, SandboxFailure> {
        let argv = shell_words::split(&settings.interpreter).map_err(|e| {
            SandboxFailure::Setup(format!(
                "failed to parse interpreter '{}': {}",
                settings.interpreter, e
            ))
        })?;
        if argv.is_empty() {
            return Err(SandboxFailure::Setup("interpreter command is empty".to_string()));
        }
        Ok(Self { settings, argv })
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Run the harness in `session` and score its report. Teardown stays
    /// with whoever owns the session.
    pub async fn run_session(&self, session: &SandboxSession, kind: InputKind) -> Result<ValidationScores, SandboxFailure> {
        let output = session
            .run(&self.argv, Duration::from_secs(self.settings.timeout_seconds))
            .await?;
        self.interpret(&output, session.marker(), kind)
    }

    fn interpret(&self, output: &RunOutput, marker: &str, kind: InputKind) -> Result<ValidationScores, SandboxFailure> {
        let signal = exit_signal(&output.status);
        match HarnessReport::from_stdout(&output.stdout, marker) {
            Some(Ok(report)) => evaluate(report, kind),
            Some(Err(e)) => Err(SandboxFailure::RuntimeFault(format!(
                "unreadable harness report: {}",
                e
            ))),
            None if cpu_limit_exceeded(signal, output.elapsed, self.settings.cpu_limit_seconds) => {
                Err(SandboxFailure::ExecutionTimeout {
                    seconds: self.settings.cpu_limit_seconds,
                })
            }
            None => {
                let lines: Vec<&str> = output.stderr.lines().collect();
                let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
                let killed = if signal == Some(SIGKILL) {
                    format!(
                        ", killed after {}ms before reaching the {}s CPU limit (likely out of memory)",
                        output.elapsed.as_millis(),
                        self.settings.cpu_limit_seconds
                    )
                } else {
                    String::new()
                };
                Err(SandboxFailure::RuntimeFault(format!(
                    "interpreter exited ({}{}) without a report: {}",
                    output.status,
                    killed,
                    tail.trim()
                )))
            }
        }
    }
}

const SIGKILL: i32 = 9;
const SIGXCPU: i32 = 24;

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// The soft CPU limit raises SIGXCPU and the hard limit kills one second
/// later. A SIGKILL that lands before the CPU budget could be spent came
/// from elsewhere, such as the OOM killer.
fn cpu_limit_exceeded(signal: Option<i32>, elapsed: Duration, cpu_limit_seconds: u64) -> bool {
    match signal {
        Some(SIGXCPU) => true,
        Some(SIGKILL) => elapsed >= Duration::from_secs(cpu_limit_seconds),
        _ => false,
    }
}

#[async_trait]
impl ArtifactExecutor for SandboxExecutor {
    async fn execute(&self, artifact: HealedArtifact, kind: InputKind) -> Result<ValidationScores, SandboxFailure> {
        check_imports(artifact.text(), &self.settings.allowed_imports)?;

        let started = Instant::now();
        let session = SandboxSession::open(artifact, &self.settings)?;
        let result = self.run_session(&session, kind).await;
        drop(session);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(scores) => debug!(elapsed_ms, score = scores.score, "artifact validated"),
            Err(failure) => warn!(elapsed_ms, kind = failure.kind(), error = %failure, "artifact rejected"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigxcpu_is_a_timeout() {
        assert!(cpu_limit_exceeded(Some(SIGXCPU), Duration::from_millis(10), 5));
    }

    #[test]
    fn test_early_sigkill_is_not_a_timeout() {
        assert!(!cpu_limit_exceeded(Some(SIGKILL), Duration::from_millis(300), 5));
        assert!(cpu_limit_exceeded(Some(SIGKILL), Duration::from_secs(6), 5));
        assert!(!cpu_limit_exceeded(None, Duration::from_secs(60), 5));
    }

    #[cfg(unix)]
    #[test]
    fn test_early_sigkill_reported_as_fault() {
        use std::os::unix::process::ExitStatusExt;

        let executor = SandboxExecutor::new(SandboxSettings::default()).unwrap();
        let output = RunOutput {
            status: ExitStatus::from_raw(SIGKILL),
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(200),
        };
        let err = executor
            .interpret(&output, "@@marker@@", InputKind::FreeText)
            .unwrap_err();
        assert!(
            matches!(&err, SandboxFailure::RuntimeFault(m) if m.contains("likely out of memory")),
            "got {:?}",
            err
        );
    }
}
