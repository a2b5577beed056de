//! Static import allow-list check.

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::sync::LazyLock;

use super::SandboxFailure;
use crate::heal::lexer;

static IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+([^\n;]+)").expect("Invalid import regex")
});

static FROM_IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+([.\w]+)[ \t]+import\b").expect("Invalid from-import regex")
});

/// Every module name the artifact imports, in source order.
///
/// Relative imports keep their leading dots.
pub fn imported_modules(text: &str) -> Vec<String> {
    let skeleton = lexer::code_skeleton(text);
    let mut found: Vec<(usize, String)> = Vec::new();

    for caps in IMPORT_REGEX.captures_iter(&skeleton) {
        let at = caps.get(0).map_or(0, |m| m.start());
        for part in caps[1].trim_end_matches('\\').split(',') {
            if let Some(name) = part.split_whitespace().next() {
                found.push((at, name.to_string()));
            }
        }
    }
    for caps in FROM_IMPORT_REGEX.captures_iter(&skeleton) {
        let at = caps.get(0).map_or(0, |m| m.start());
        found.push((at, caps[1].to_string()));
    }

    found.sort_by_key(|(at, _)| *at);
    found.into_iter().map(|(_, name)| name).collect()
}

fn build_allow_list(patterns: &[String]) -> Result<GlobSet, SandboxFailure> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| SandboxFailure::Setup(format!("invalid import glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SandboxFailure::Setup(format!("failed to build import allow-list: {}", e)))
}

/// Reject any import outside `allowed` before a process is spawned.
pub fn check_imports(text: &str, allowed: &[String]) -> Result<(), SandboxFailure> {
    let allow_list = build_allow_list(allowed)?;

    for module in imported_modules(text) {
        if module.starts_with('.') {
            return Err(SandboxFailure::ContractViolation(format!(
                "relative import '{}' is not allowed",
                module
            )));
        }
        if !allow_list.is_match(&module) {
            return Err(SandboxFailure::ContractViolation(format!(
                "import of '{}' is not on the allow-list",
                module
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::default_allowed_imports;

    #[test]
    fn test_collects_plain_from_and_nested_imports() {
        let text = "import random, math as m\nfrom fractions import Fraction\n\ndef generate():\n    from sympy.parsing import parse_expr\n    import statistics\n";
        assert_eq!(
            imported_modules(text),
            vec!["random", "math", "fractions", "sympy.parsing", "statistics"]
        );
    }

    #[test]
    fn test_ignores_imports_inside_strings_and_comments() {
        let text = "# import os\nq = \"import subprocess\"\nimport random\n";
        assert_eq!(imported_modules(text), vec!["random"]);
    }

    #[test]
    fn test_allow_list_accepts_defaults() {
        let text = "import random\nfrom sympy.core import Symbol\nimport sympy\n";
        assert!(check_imports(text, &default_allowed_imports()).is_ok());
    }

    #[test]
    fn test_disallowed_import_is_contract_violation() {
        let err = check_imports("import os\n", &default_allowed_imports()).unwrap_err();
        assert_eq!(
            err,
            SandboxFailure::ContractViolation("import of 'os' is not on the allow-list".to_string())
        );

        let err = check_imports("from socket import socket\n", &default_allowed_imports()).unwrap_err();
        assert!(matches!(err, SandboxFailure::ContractViolation(_)));
    }

    #[test]
    fn test_relative_import_is_rejected() {
        let err = check_imports("from . import helpers\n", &default_allowed_imports()).unwrap_err();
        assert!(err.to_string().contains("relative import"));
    }

    #[test]
    fn test_invalid_glob_is_setup_failure() {
        let err = check_imports("import random\n", &["[".to_string()]).unwrap_err();
        assert!(matches!(err, SandboxFailure::Setup(_)));
    }
}
