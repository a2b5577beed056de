//! CLI argument parsing for codemend.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Codemend: heal and validate generated quiz-skill modules.
///
/// Raw generated code passes through an ordered healing pipeline
/// (fences, characters, imports, signatures, pattern rules, forbidden
/// symbols, structural repair) before it is executed in a sandbox against
/// the `generate` / `check` contract.
#[derive(Parser, Debug)]
#[command(name = "codemend")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (defaults to ./codemend.yaml when present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for codemend.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose the generation request for one skill.
    ///
    /// Prints the system and user messages, or the full request as JSON.
    Compose(ComposeArgs),

    /// Run the healing pipeline over a raw artifact.
    ///
    /// Writes the healed text to stdout and the per-stage outcomes to stderr.
    Heal(HealArgs),

    /// Execute an artifact in the sandbox and score its entry points.
    Check(CheckArgs),

    /// List the pattern rule table.
    Rules(RulesArgs),

    /// Run an ablation experiment over a skills file.
    ///
    /// Every skill is generated, healed, and executed once per arm and
    /// repeat; results land in `<output_dir>/<run_id>/`.
    Run(RunArgs),

    /// Summarize a recorded experiment run.
    Report(ReportArgs),
}

/// Arguments for the `compose` command.
#[derive(Parser, Debug)]
pub struct ComposeArgs {
    /// YAML file with the skill list.
    #[arg(short, long)]
    pub skills: PathBuf,

    /// Skill id to compose.
    pub skill_id: String,

    /// Prompt variant (bare, contract-annotated, contract-annotated-with-repair-notice).
    #[arg(long, default_value = "contract-annotated")]
    pub variant: String,

    /// Print the request as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `heal` command.
#[derive(Parser, Debug)]
pub struct HealArgs {
    /// Raw artifact file; reads stdin when omitted or `-`.
    pub input: Option<PathBuf>,

    /// Enabled stages (`all`, `none`, `1-3`, `1,2,5`, or stage names).
    #[arg(long, default_value = "all")]
    pub stages: String,

    /// Write the healed text here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the full report as JSON instead of the healed text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `check` command.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Artifact file to execute.
    pub input: PathBuf,

    /// Answer-input kind of the skill (free-text, structured-choice, freehand-graph).
    #[arg(long, default_value = "free-text")]
    pub input_kind: String,

    /// Heal the artifact with these stages before executing it.
    #[arg(long)]
    pub heal: Option<String>,
}

/// Arguments for the `rules` command.
#[derive(Parser, Debug)]
pub struct RulesArgs {
    /// Print the table as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML file with the skill list.
    #[arg(short, long)]
    pub skills: PathBuf,

    /// Serve recorded raw artifacts from this directory instead of calling
    /// the generation endpoint.
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Override `experiment.workers`.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Override `experiment.repeats`.
    #[arg(long)]
    pub repeats: Option<u32>,

    /// Override `experiment.output_dir`.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Only run these skill ids.
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Arguments for the `report` command.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Run directory to report on; defaults to the latest run under the
    /// configured output directory.
    pub run_dir: Option<PathBuf>,

    /// Print the snapshot as JSON.
    #[arg(long)]
    pub json: bool,

    /// Also list every failed attempt with its reason.
    #[arg(long)]
    pub failures: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_heal_with_stages() {
        let cli = Cli::try_parse_from(["codemend", "heal", "raw.txt", "--stages", "1-3"]).unwrap();
        match cli.command {
            Command::Heal(args) => {
                assert_eq!(args.input, Some(PathBuf::from("raw.txt")));
                assert_eq!(args.stages, "1-3");
                assert!(!args.json);
            }
            other => panic!("expected heal, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "codemend", "run", "--skills", "skills.yaml", "-vv", "--config", "c.yaml", "--only", "add,sub",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        match cli.command {
            Command::Run(args) => assert_eq!(args.only, vec!["add", "sub"]),
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_compose_requires_skills_file() {
        assert!(Cli::try_parse_from(["codemend", "compose", "add"]).is_err());
    }
}
