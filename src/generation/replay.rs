//! Offline provider serving recorded raw artifacts.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{GenerationError, GenerationService};
use crate::prompt::GenerationRequest;

/// Serves `<skill>.<variant>.txt`, falling back to `<skill>.txt`, from a
/// directory of recorded generations.
#[derive(Debug, Clone)]
pub struct ReplayClient {
    dir: PathBuf,
}

impl ReplayClient {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, request: &GenerationRequest) -> [PathBuf; 2] {
        [
            self.dir
                .join(format!("{}.{}.txt", request.skill_id, request.variant)),
            self.dir.join(format!("{}.txt", request.skill_id)),
        ]
    }
}

#[async_trait]
impl GenerationService for ReplayClient {
    fn name(&self) -> &str {
        "replay"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if request.skill_id.contains(['/', '\\']) || request.skill_id.starts_with('.') {
            return Err(GenerationError::PayloadRejected(format!(
                "skill id '{}' cannot name a recording",
                request.skill_id
            )));
        }

        for path in self.candidates(request) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    debug!(skill = %request.skill_id, path = %path.display(), "replaying recorded artifact");
                    return Ok(text);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(GenerationError::Transport(format!(
                        "failed to read '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        Err(GenerationError::NotRecorded(format!(
            "no recording for skill '{}' in '{}'",
            request.skill_id,
            self.dir.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptVariant;
    use tempfile::TempDir;

    fn request(skill: &str, variant: PromptVariant) -> GenerationRequest {
        GenerationRequest {
            skill_id: skill.to_string(),
            variant,
            system: String::new(),
            user: String::new(),
        }
    }

    #[tokio::test]
    async fn test_prefers_variant_specific_recording() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("add.txt"), "generic").unwrap();
        std::fs::write(temp.path().join("add.bare.txt"), "bare").unwrap();
        let client = ReplayClient::new(temp.path());

        assert_eq!(client.generate(&request("add", PromptVariant::Bare)).await.unwrap(), "bare");
        assert_eq!(
            client
                .generate(&request("add", PromptVariant::ContractAnnotated))
                .await
                .unwrap(),
            "generic"
        );
    }

    #[tokio::test]
    async fn test_missing_recording_is_not_recorded() {
        let temp = TempDir::new().unwrap();
        let client = ReplayClient::new(temp.path());

        let err = client.generate(&request("nope", PromptVariant::Bare)).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotRecorded(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_rejects_path_like_skill_ids() {
        let temp = TempDir::new().unwrap();
        let client = ReplayClient::new(temp.path());

        let err = client
            .generate(&request("../secrets", PromptVariant::Bare))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::PayloadRejected(_)));
    }
}
