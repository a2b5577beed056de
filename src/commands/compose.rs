//! Implementation of the `codemend compose` command.

use super::find_skill;
use crate::cli::ComposeArgs;
use crate::error::{MendError, Result};
use crate::prompt::{PromptVariant, compose};

/// Execute the `codemend compose` command.
pub fn cmd_compose(args: ComposeArgs) -> Result<()> {
    let variant = PromptVariant::from_str(&args.variant).ok_or_else(|| {
        MendError::UserError(format!(
            "unknown prompt variant '{}'. Expected one of: {}",
            args.variant,
            PromptVariant::ALL.map(|v| v.as_str()).join(", ")
        ))
    })?;
    let skill = find_skill(&args.skills, &args.skill_id)?;
    let request = compose(&skill, variant)?;

    if args.json {
        let json = serde_json::to_string_pretty(&request)
            .map_err(|e| MendError::UserError(format!("failed to serialize request: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    println!("--- system ---");
    println!("{}", request.system);
    println!("--- user ({}) ---", request.variant);
    println!("{}", request.user);
    Ok(())
}
