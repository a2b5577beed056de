//! Command implementations for codemend.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the input helpers they share.

mod check;
mod compose;
mod heal;
mod report;
mod rules;
mod run;

use crate::cli::Command;
use crate::config::Config;
use crate::error::{MendError, Result};
use crate::heal::StageSet;
use crate::skill::{SkillSpec, load_skills};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "codemend.yaml";

/// Dispatch a command to its implementation.
pub async fn dispatch(command: Command, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;

    match command {
        Command::Compose(args) => compose::cmd_compose(args),
        Command::Heal(args) => heal::cmd_heal(args, &config),
        Command::Check(args) => check::cmd_check(args, &config).await,
        Command::Rules(args) => rules::cmd_rules(args),
        Command::Run(args) => run::cmd_run(args, config).await,
        Command::Report(args) => report::cmd_report(args, &config),
    }
}

/// Load the explicit config, else `./codemend.yaml` if it exists, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let default = Path::new(DEFAULT_CONFIG_FILE);
    match path {
        Some(path) => Config::load(path),
        None if default.is_file() => Config::load(default),
        None => Ok(Config::default()),
    }
}

/// Read a file, or stdin for `None` / `-`.
fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path).map_err(|e| {
            MendError::UserError(format!("failed to read '{}': {}", path.display(), e))
        }),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| MendError::UserError(format!("failed to read stdin: {}", e)))?;
            Ok(text)
        }
    }
}

fn parse_stages(expr: &str) -> Result<StageSet> {
    StageSet::parse(expr).map_err(|e| MendError::UserError(e.to_string()))
}

/// Load the skills file and look up one skill by id.
fn find_skill(path: &Path, skill_id: &str) -> Result<SkillSpec> {
    let skills = load_skills(path)?;
    let known: Vec<String> = skills.iter().map(|s| s.id.clone()).collect();
    skills
        .into_iter()
        .find(|s| s.id == skill_id)
        .ok_or_else(|| {
            MendError::UserError(format!(
                "skill '{}' not found in '{}'.\n\nKnown skills: {}",
                skill_id,
                path.display(),
                known.join(", ")
            ))
        })
}
