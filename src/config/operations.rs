//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{MendError, Result};
use crate::heal::StageSet;
use globset::Glob;
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            MendError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| MendError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| MendError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - counts and budgets must be positive
    /// - the interpreter command must parse and be non-empty
    /// - `allowed_imports` entries must be valid globs
    /// - every arm's `stages` must parse as a stage set
    pub fn validate(&self) -> Result<()> {
        if self.generation.request_timeout_seconds == 0 {
            return Err(invalid("generation.request_timeout_seconds must be greater than 0"));
        }

        if self.pipeline.pattern_max_passes == 0 {
            return Err(invalid("pipeline.pattern_max_passes must be greater than 0"));
        }

        if self.sandbox.timeout_seconds == 0 {
            return Err(invalid("sandbox.timeout_seconds must be greater than 0"));
        }

        let interpreter = shell_words::split(&self.sandbox.interpreter).map_err(|e| {
            invalid(&format!(
                "sandbox.interpreter '{}' could not be parsed: {}",
                self.sandbox.interpreter, e
            ))
        })?;
        if interpreter.is_empty() {
            return Err(invalid("sandbox.interpreter must not be empty"));
        }

        for pattern in &self.sandbox.allowed_imports {
            Glob::new(pattern).map_err(|e| {
                invalid(&format!(
                    "invalid glob '{}' in sandbox.allowed_imports: {}",
                    pattern, e
                ))
            })?;
        }

        if self.experiment.workers == 0 {
            return Err(invalid("experiment.workers must be greater than 0"));
        }

        if self.experiment.repeats == 0 {
            return Err(invalid("experiment.repeats must be greater than 0"));
        }

        for (index, arm) in self.experiment.arms.iter().enumerate() {
            if arm.preset.is_none() && arm.stages.is_none() {
                return Err(invalid(&format!(
                    "experiment.arms[{}] needs either a preset or a stages list",
                    index
                )));
            }
            if let Some(stages) = &arm.stages {
                StageSet::parse(stages).map_err(|e| {
                    invalid(&format!("experiment.arms[{}].stages: {}", index, e))
                })?;
            }
        }

        Ok(())
    }

    /// The interpreter command split into program and arguments.
    pub fn interpreter_argv(&self) -> Result<Vec<String>> {
        shell_words::split(&self.sandbox.interpreter).map_err(|e| {
            MendError::UserError(format!(
                "failed to parse sandbox.interpreter '{}': {}",
                self.sandbox.interpreter, e
            ))
        })
    }
}

fn invalid(message: &str) -> MendError {
    MendError::UserError(format!("config validation failed: {}", message))
}
