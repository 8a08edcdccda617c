use coldsync_core::{OperationStatus, QueueCounts};
use serde::Serialize;

use crate::cli::{QueueCommands, StatusArg};
use crate::commands::common::{format_operation_lines, CommandContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct QueueStatusItem {
    #[serde(flatten)]
    pub counts: QueueCounts,
    pub db_path: String,
}

pub async fn run_queue(command: QueueCommands, ctx: &CommandContext) -> Result<(), CliError> {
    match command {
        QueueCommands::List {
            status,
            limit,
            json,
        } => run_queue_list(status, limit, json, ctx).await,
        QueueCommands::Status { json } => run_queue_status(json, ctx).await,
        QueueCommands::Cleanup => run_queue_cleanup(ctx).await,
        QueueCommands::Requeue { id } => run_queue_requeue(id, ctx).await,
    }
}

pub const fn operation_status(status: StatusArg) -> OperationStatus {
    match status {
        StatusArg::Pending => OperationStatus::Pending,
        StatusArg::Completed => OperationStatus::Completed,
        StatusArg::Failed => OperationStatus::Failed,
    }
}

async fn run_queue_list(
    status: Option<StatusArg>,
    limit: usize,
    as_json: bool,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let queue = ctx.open_queue()?;
    let operations = queue.list(status.map(operation_status), limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }
    if operations.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    for line in format_operation_lines(&operations, now_ms) {
        println!("{line}");
    }
    Ok(())
}

async fn run_queue_status(as_json: bool, ctx: &CommandContext) -> Result<(), CliError> {
    let queue = ctx.open_queue()?;
    let counts = queue.counts().await?;

    if as_json {
        let item = QueueStatusItem {
            counts,
            db_path: ctx.db_path.display().to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!(
            "pending={} completed={} failed={}",
            counts.pending, counts.completed, counts.failed
        );
    }
    Ok(())
}

async fn run_queue_cleanup(ctx: &CommandContext) -> Result<(), CliError> {
    let queue = ctx.open_queue()?;
    let removed = queue.cleanup_completed().await?;
    println!("Removed {removed} completed operations");
    Ok(())
}

async fn run_queue_requeue(id: i64, ctx: &CommandContext) -> Result<(), CliError> {
    let queue = ctx.open_queue()?;
    let queued = queue
        .requeue_failed(id)
        .await?
        .ok_or(CliError::OperationNotFound(id))?;
    println!("Requeued operation #{id} as #{}", queued.id);
    Ok(())
}
