//! Implementation of the `codemend rules` command.

use serde_json::json;

use crate::cli::RulesArgs;
use crate::error::{MendError, Result};
use crate::heal::rules;

/// Execute the `codemend rules` command.
pub fn cmd_rules(args: RulesArgs) -> Result<()> {
    if args.json {
        let table: Vec<_> = rules()
            .iter()
            .map(|rule| {
                json!({
                    "id": rule.id(),
                    "scope": rule.scope(),
                    "pattern": rule.pattern(),
                    "rationale": rule.rationale(),
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&table)
            .map_err(|e| MendError::UserError(format!("failed to serialize rules: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Pattern Rules ({})", rules().len());
    println!("=================");
    for (index, rule) in rules().iter().enumerate() {
        println!();
        println!("{:>2}. {} [{}]", index + 1, rule.id(), rule.scope());
        println!("    {}", rule.rationale());
    }
    Ok(())
}
