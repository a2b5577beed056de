//! Tests for config functionality.

use crate::config::types::default_allowed_imports;
use crate::config::{ArmPreset, Config};
use crate::prompt::PromptVariant;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.generation.max_retries, 2);
    assert_eq!(config.generation.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.pipeline.pattern_max_passes, 8);
    assert_eq!(config.sandbox.interpreter, "python3 -I");
    assert_eq!(config.sandbox.timeout_seconds, 10);
    assert_eq!(config.sandbox.allowed_imports, default_allowed_imports());
    assert_eq!(config.experiment.workers, 4);
    assert_eq!(config.experiment.repeats, 1);
    assert_eq!(config.experiment.arms.len(), 3);
    assert_eq!(config.experiment.arms[0].preset, Some(ArmPreset::NoRepair));
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_minimal_yaml() {
    let config = Config::from_yaml("").unwrap();

    assert_eq!(config.sandbox.timeout_seconds, 10);
    assert_eq!(config.experiment.output_dir, ".codemend");
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
generation:
  model: local-coder
sandbox:
  timeout_seconds: 3
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.generation.model, "local-coder");
    assert_eq!(config.sandbox.timeout_seconds, 3);

    // Unspecified values within a section still default
    assert_eq!(config.generation.max_retries, 2);
    assert_eq!(config.sandbox.memory_limit_mb, 512);
}

#[test]
fn test_parse_arms() {
    let yaml = r#"
experiment:
  workers: 8
  repeats: 3
  arms:
    - preset: leave-one-out
      variant: contract-annotated-with-repair-notice
    - name: hygiene-bare
      stages: "1-3"
      variant: bare
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.experiment.workers, 8);
    assert_eq!(config.experiment.repeats, 3);
    assert_eq!(config.experiment.arms.len(), 2);
    assert_eq!(config.experiment.arms[0].preset, Some(ArmPreset::LeaveOneOut));
    assert_eq!(
        config.experiment.arms[0].variant,
        PromptVariant::ContractAnnotatedWithRepairNotice
    );
    assert_eq!(config.experiment.arms[1].name.as_deref(), Some("hygiene-bare"));
    assert_eq!(config.experiment.arms[1].stages.as_deref(), Some("1-3"));
    assert_eq!(config.experiment.arms[1].variant, PromptVariant::Bare);
}

#[test]
fn test_parse_yaml_with_unknown_fields() {
    let yaml = r#"
sandbox:
  timeout_seconds: 4
  future_isolation: gvisor
unknown_section:
  nested: true
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.sandbox.timeout_seconds, 4);
}

#[test]
fn test_validate_zero_workers() {
    let err = Config::from_yaml("experiment:\n  workers: 0\n").unwrap_err();
    assert!(err.to_string().contains("experiment.workers"));
}

#[test]
fn test_validate_zero_pattern_passes() {
    let err = Config::from_yaml("pipeline:\n  pattern_max_passes: 0\n").unwrap_err();
    assert!(err.to_string().contains("pattern_max_passes"));
}

#[test]
fn test_validate_empty_interpreter() {
    let err = Config::from_yaml("sandbox:\n  interpreter: \"\"\n").unwrap_err();
    assert!(err.to_string().contains("sandbox.interpreter"));
}

#[test]
fn test_validate_unbalanced_interpreter_quotes() {
    let err = Config::from_yaml("sandbox:\n  interpreter: \"python3 '-I\"\n").unwrap_err();
    assert!(err.to_string().contains("could not be parsed"));
}

#[test]
fn test_validate_invalid_import_glob() {
    let yaml = r#"
sandbox:
  allowed_imports: ["["]
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("invalid glob"));
}

#[test]
fn test_validate_arm_needs_stage_selection() {
    let yaml = r#"
experiment:
  arms:
    - name: nothing
      variant: bare
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("preset or a stages list"));
}

#[test]
fn test_validate_arm_bad_stage_set() {
    let yaml = r#"
experiment:
  arms:
    - stages: "1,9"
      variant: bare
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("experiment.arms[0].stages"));
}

#[test]
fn test_load_and_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("codemend.yaml");

    let mut config = Config::default();
    config.experiment.workers = 2;
    std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.experiment.workers, 2);
    assert_eq!(loaded.experiment.arms.len(), 3);
}

#[test]
fn test_load_missing_file() {
    let temp = TempDir::new().unwrap();
    let err = Config::load(temp.path().join("missing.yaml")).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn test_interpreter_argv() {
    let config = Config::default();
    assert_eq!(config.interpreter_argv().unwrap(), vec!["python3", "-I"]);
}
