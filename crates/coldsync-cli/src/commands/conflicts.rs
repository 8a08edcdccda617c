use coldsync_core::{ConflictLog, ResolutionStrategy};
use serde_json::Value;

use crate::cli::{ConflictCommands, StrategyArg};
use crate::commands::common::{format_conflict_lines, parse_json_arg, CommandContext};
use crate::error::CliError;

pub async fn run_conflicts(command: ConflictCommands, ctx: &CommandContext) -> Result<(), CliError> {
    let log = ctx.open_conflicts()?;
    match command {
        ConflictCommands::List { all, limit, json } => {
            let conflicts = if all {
                log.list(limit).await?
            } else {
                log.get_unresolved().await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&conflicts)?);
            } else if conflicts.is_empty() {
                println!("No sync conflicts recorded.");
            } else {
                for line in format_conflict_lines(&conflicts) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        ConflictCommands::Resolve { id, strategy, data } => {
            let data = data
                .as_deref()
                .map(|raw| parse_json_arg("--data", raw))
                .transpose()?;
            let strategy = resolution_strategy(strategy);
            resolve_conflict(&log, id, strategy, data).await?;
            println!("Resolved conflict #{id} with strategy {strategy}");
            Ok(())
        }
    }
}

pub const fn resolution_strategy(strategy: StrategyArg) -> ResolutionStrategy {
    match strategy {
        StrategyArg::Local => ResolutionStrategy::Local,
        StrategyArg::Server => ResolutionStrategy::Server,
        StrategyArg::Merge => ResolutionStrategy::Merge,
    }
}

/// Resolve with explicit data, or default to the side the strategy names
pub async fn resolve_conflict(
    log: &ConflictLog,
    id: i64,
    strategy: ResolutionStrategy,
    data: Option<Value>,
) -> Result<(), CliError> {
    let record = log.get(id).await?.ok_or(CliError::ConflictNotFound(id))?;
    if record.resolved {
        return Err(CliError::ConflictAlreadyResolved(id));
    }

    let resolved_data = data
        .or_else(|| record.default_resolution_data(strategy))
        .ok_or(CliError::MergeDataRequired)?;
    if !log
        .resolve_conflict(id, strategy, Some(&resolved_data))
        .await?
    {
        return Err(CliError::ConflictAlreadyResolved(id));
    }
    Ok(())
}
