//! Error types for codemend.
//!
//! Each subsystem owns a narrow error enum; `MendError` is the top-level type
//! surfaced by CLI commands and maps every failure to an exit code.

use crate::exit_codes;
use crate::generation::GenerationError;
use crate::heal::StageFailure;
use crate::metrics::MetricsError;
use crate::prompt::PromptError;
use crate::sandbox::SandboxFailure;
use thiserror::Error;

/// Main error type for codemend operations.
#[derive(Error, Debug)]
pub enum MendError {
    /// User provided invalid arguments, files, or configuration.
    #[error("{0}")]
    UserError(String),

    /// A skill specification could not be composed into a prompt.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The generation service did not produce an artifact.
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A healing stage marked the artifact unrecoverable.
    #[error("Healing failed: {0}")]
    Unrecoverable(#[from] StageFailure),

    /// The sandbox rejected the healed artifact.
    #[error("Sandbox rejected artifact: {0}")]
    Sandbox(#[from] SandboxFailure),

    /// The metrics recorder lost or rejected attempts.
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Fewer attempts were recorded than dispatched.
    #[error("Experiment incomplete: {0}")]
    Incomplete(String),
}

impl MendError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MendError::UserError(_) => exit_codes::USER_ERROR,
            MendError::Prompt(_) => exit_codes::USER_ERROR,
            MendError::Generation(_) => exit_codes::GENERATION_FAILURE,
            MendError::Unrecoverable(_) => exit_codes::HEAL_FAILURE,
            MendError::Sandbox(SandboxFailure::Setup(_)) => exit_codes::USER_ERROR,
            MendError::Sandbox(_) => exit_codes::SANDBOX_FAILURE,
            MendError::Metrics(_) | MendError::Incomplete(_) => exit_codes::EXPERIMENT_INCOMPLETE,
        }
    }
}

/// Result type alias for codemend operations.
pub type Result<T> = std::result::Result<T, MendError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heal::StageName;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = MendError::UserError("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn incomplete_skill_is_a_user_error() {
        let err = MendError::from(PromptError::from(crate::prompt::SpecIncompleteError {
            skill_id: "s".to_string(),
            field: "template skeleton",
        }));
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert_eq!(err.to_string(), "skill 's' is incomplete: missing template skeleton");
    }

    #[test]
    fn generation_error_has_correct_exit_code() {
        let err = MendError::from(GenerationError::QuotaExceeded("daily cap".to_string()));
        assert_eq!(err.exit_code(), exit_codes::GENERATION_FAILURE);
    }

    #[test]
    fn unrecoverable_error_has_correct_exit_code() {
        let err = MendError::from(StageFailure::new(
            StageName::StructuralRepair,
            "line 3: unexpected indent",
        ));
        assert_eq!(err.exit_code(), exit_codes::HEAL_FAILURE);
    }

    #[test]
    fn sandbox_errors_split_setup_from_artifact_failures() {
        let err = MendError::from(SandboxFailure::ContractViolation("no question".to_string()));
        assert_eq!(err.exit_code(), exit_codes::SANDBOX_FAILURE);

        let err = MendError::from(SandboxFailure::Setup("python3 not found".to_string()));
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn lost_attempts_mark_experiment_incomplete() {
        let err = MendError::from(MetricsError::Closed);
        assert_eq!(err.exit_code(), exit_codes::EXPERIMENT_INCOMPLETE);

        let err = MendError::Incomplete("arm 'bare@all' recorded 3 of 4".to_string());
        assert_eq!(err.exit_code(), exit_codes::EXPERIMENT_INCOMPLETE);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = MendError::from(SandboxFailure::ExecutionTimeout { seconds: 5 });
        assert_eq!(
            err.to_string(),
            "Sandbox rejected artifact: execution exceeded its 5s budget"
        );
    }
}
