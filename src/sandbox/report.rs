//! The harness report and the output-shape contract.
//!
//! The harness only records what happened; every contract decision is made
//! here, shape first, so an item missing its prompt text is a contract
//! violation even when a probe later faulted on it.

use serde::Deserialize;
use serde_json::Value;

use super::{SandboxFailure, ValidationScores};
use crate::contract::{EntryPoint, fields};
use crate::skill::InputKind;

/// Which synthetic answer a probe submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Correct,
    Incorrect,
}

/// One `check(...)` call made by the harness.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeReport {
    pub kind: ProbeKind,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub fault: Option<String>,
}

/// The single JSON line the harness writes after its marker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HarnessReport {
    Ok {
        item: Value,
        #[serde(default)]
        probes: Vec<ProbeReport>,
    },
    MissingEntry {
        name: String,
    },
    Fault {
        phase: String,
        error: String,
    },
}

impl HarnessReport {
    /// Find and parse the last `marker`-prefixed line of `stdout`.
    pub fn from_stdout(stdout: &str, marker: &str) -> Option<Result<Self, serde_json::Error>> {
        let line = stdout.lines().rev().find_map(|l| l.strip_prefix(marker))?;
        Some(serde_json::from_str(line))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a dict",
    }
}

/// Check the value returned by `generate()` against the output-shape contract.
pub fn validate_item(item: &Value, kind: InputKind) -> Result<(), String> {
    let Some(map) = item.as_object() else {
        return Err(format!(
            "{}() returned {}, expected a dict",
            EntryPoint::Generate,
            type_name(item)
        ));
    };

    if let Some(error) = map.get(fields::ERROR) {
        let message = error.as_str().map_or_else(|| error.to_string(), str::to_string);
        return Err(format!("{}() reported a failure: {}", EntryPoint::Generate, message));
    }

    match map.get(fields::QUESTION) {
        None => return Err(format!("item has no \"{}\" field", fields::QUESTION)),
        Some(Value::String(q)) if !q.trim().is_empty() => {}
        Some(_) => return Err(format!("\"{}\" must be a non-empty string", fields::QUESTION)),
    }

    let has_answer = map.get(fields::ANSWER).is_some_and(|a| !a.is_null());
    let visual = map.get(fields::VISUAL_GRADING) == Some(&Value::Bool(true));
    match (has_answer, visual) {
        (false, false) => {
            return Err(format!(
                "item has neither an \"{}\" nor \"{}\": True",
                fields::ANSWER,
                fields::VISUAL_GRADING
            ));
        }
        (true, true) => {
            return Err(format!(
                "item carries both an \"{}\" and \"{}\": True",
                fields::ANSWER,
                fields::VISUAL_GRADING
            ));
        }
        _ => {}
    }

    if kind == InputKind::StructuredChoice {
        let choices = map.get(fields::CHOICES).and_then(Value::as_array);
        if choices.is_none_or(|c| c.is_empty()) {
            return Err(format!(
                "structured-choice item needs a non-empty \"{}\" list",
                fields::CHOICES
            ));
        }
    }

    Ok(())
}

fn probe_verdict(probe: &ProbeReport) -> Result<bool, SandboxFailure> {
    let label = match probe.kind {
        ProbeKind::Correct => "correct",
        ProbeKind::Incorrect => "incorrect",
    };
    if let Some(fault) = &probe.fault {
        return Err(SandboxFailure::RuntimeFault(format!(
            "{}() raised on the {} probe: {}",
            EntryPoint::Check,
            label,
            fault
        )));
    }

    let result = probe.result.as_ref().unwrap_or(&Value::Null);
    match result.get(fields::CORRECT) {
        Some(Value::Bool(correct)) if result.is_object() => Ok(*correct),
        _ => Err(SandboxFailure::ContractViolation(format!(
            "{}() must return a dict with a boolean \"{}\", got {}",
            EntryPoint::Check,
            fields::CORRECT,
            type_name(result)
        ))),
    }
}

/// Turn a harness report into scores or a terminal failure.
pub fn evaluate(report: HarnessReport, kind: InputKind) -> Result<ValidationScores, SandboxFailure> {
    match report {
        HarnessReport::Fault { phase, error } => Err(SandboxFailure::RuntimeFault(format!(
            "{} failed: {}",
            phase, error
        ))),
        HarnessReport::MissingEntry { name } => Err(SandboxFailure::ContractViolation(format!(
            "entry point `{}` is missing",
            name
        ))),
        HarnessReport::Ok { item, probes } => {
            validate_item(&item, kind).map_err(SandboxFailure::ContractViolation)?;

            let mut accepts_correct = None;
            let mut rejects_incorrect = None;
            for probe in &probes {
                let verdict = probe_verdict(probe)?;
                match probe.kind {
                    ProbeKind::Correct => accepts_correct = Some(verdict),
                    ProbeKind::Incorrect => rejects_incorrect = Some(!verdict),
                }
            }

            let rejects_incorrect = rejects_incorrect.ok_or_else(|| {
                SandboxFailure::RuntimeFault("harness report carries no incorrect probe".to_string())
            })?;
            Ok(ValidationScores::new(accepts_correct, rejects_incorrect))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(item: Value, probes: Value) -> HarnessReport {
        serde_json::from_value(json!({"status": "ok", "item": item, "probes": probes})).unwrap()
    }

    fn probes(correct: bool, incorrect: bool) -> Value {
        json!([
            {"kind": "correct", "result": {"correct": correct}},
            {"kind": "incorrect", "result": {"correct": incorrect}}
        ])
    }

    #[test]
    fn test_parses_last_marker_line() {
        let stdout = "noise\n@@M@@{\"status\": \"missing_entry\", \"name\": \"check\"}\n";
        let report = HarnessReport::from_stdout(stdout, "@@M@@").unwrap().unwrap();
        assert_eq!(
            report,
            HarnessReport::MissingEntry {
                name: "check".to_string()
            }
        );
        assert!(HarnessReport::from_stdout("no marker here", "@@M@@").is_none());
    }

    #[test]
    fn test_valid_item_scores_both_probes() {
        let report = ok(json!({"question": "1+1?", "answer": 2}), probes(true, false));
        let scores = evaluate(report, InputKind::FreeText).unwrap();
        assert_eq!(scores.accepts_correct, Some(true));
        assert!(scores.rejects_incorrect);
        assert_eq!(scores.score, 1.0);
    }

    #[test]
    fn test_lenient_check_scores_half() {
        let report = ok(json!({"question": "1+1?", "answer": 2}), probes(true, true));
        let scores = evaluate(report, InputKind::FreeText).unwrap();
        assert!(!scores.rejects_incorrect);
        assert_eq!(scores.score, 0.5);
    }

    #[test]
    fn test_missing_question_is_contract_violation_even_when_probe_faults() {
        let report = ok(
            json!({"answer": 4}),
            json!([{"kind": "incorrect", "fault": "KeyError: 'question'"}]),
        );
        let err = evaluate(report, InputKind::FreeText).unwrap_err();
        assert_eq!(
            err,
            SandboxFailure::ContractViolation("item has no \"question\" field".to_string())
        );
    }

    #[test]
    fn test_visual_grading_item_needs_no_answer() {
        let report = ok(
            json!({"question": "Sketch y = x", "requires_visual_grading": true}),
            json!([{"kind": "incorrect", "result": {"correct": false}}]),
        );
        let scores = evaluate(report, InputKind::FreehandGraph).unwrap();
        assert_eq!(scores.accepts_correct, None);
        assert_eq!(scores.score, 1.0);
    }

    #[test]
    fn test_item_shape_rules() {
        let cases = [
            (json!([1, 2]), "returned a list"),
            (json!({"question": "", "answer": 1}), "non-empty string"),
            (json!({"question": "q"}), "neither"),
            (json!({"question": "q", "answer": null}), "neither"),
            (json!({"question": "q", "answer": 1, "requires_visual_grading": true}), "both"),
            (json!({"error": "item could not be produced: boom"}), "reported a failure"),
        ];
        for (item, expected) in cases {
            let message = validate_item(&item, InputKind::FreeText).unwrap_err();
            assert!(message.contains(expected), "{} !~ {}", message, expected);
        }
    }

    #[test]
    fn test_structured_choice_requires_choices() {
        let item = json!({"question": "Pick", "answer": "b"});
        assert!(validate_item(&item, InputKind::FreeText).is_ok());
        assert!(validate_item(&item, InputKind::StructuredChoice).is_err());

        let item = json!({"question": "Pick", "answer": "b", "choices": ["a", "b"]});
        assert!(validate_item(&item, InputKind::StructuredChoice).is_ok());
    }

    #[test]
    fn test_check_without_boolean_is_contract_violation() {
        let report = ok(
            json!({"question": "q", "answer": 1}),
            json!([{"kind": "incorrect", "result": {"correct": "no"}}]),
        );
        let err = evaluate(report, InputKind::FreeText).unwrap_err();
        assert!(matches!(err, SandboxFailure::ContractViolation(m) if m.contains("boolean")));
    }

    #[test]
    fn test_probe_fault_is_runtime_fault() {
        let report = ok(
            json!({"question": "q", "answer": 1}),
            json!([{"kind": "incorrect", "fault": "ValueError: invalid literal"}]),
        );
        let err = evaluate(report, InputKind::FreeText).unwrap_err();
        assert!(matches!(err, SandboxFailure::RuntimeFault(m) if m.contains("incorrect probe")));
    }

    #[test]
    fn test_fault_and_missing_entry_reports() {
        let fault = HarnessReport::Fault {
            phase: "generate".to_string(),
            error: "ZeroDivisionError: division by zero".to_string(),
        };
        assert!(matches!(
            evaluate(fault, InputKind::FreeText),
            Err(SandboxFailure::RuntimeFault(_))
        ));

        let missing = HarnessReport::MissingEntry {
            name: "generate".to_string(),
        };
        assert_eq!(
            evaluate(missing, InputKind::FreeText).unwrap_err(),
            SandboxFailure::ContractViolation("entry point `generate` is missing".to_string())
        );
    }
}
