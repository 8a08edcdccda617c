use coldsync_core::{Connectivity, ConnectivityMonitor, Execution};

use crate::cli::OperationArgs;
use crate::commands::common::{build_operation, CommandContext};
use crate::error::CliError;

pub async fn run_enqueue(args: &OperationArgs, ctx: &CommandContext) -> Result<(), CliError> {
    let operation = build_operation(args)?;
    let queue = ctx.open_queue()?;
    let queued = queue.enqueue(operation).await?;
    println!(
        "Queued operation #{} ({} {})",
        queued.id, queued.method, queued.endpoint
    );
    Ok(())
}

pub async fn run_exec(args: &OperationArgs, ctx: &CommandContext) -> Result<(), CliError> {
    let operation = build_operation(args)?;
    let api = ctx.build_api()?;
    let online = api.is_reachable().await;
    if !online {
        println!("API unreachable at {}; queueing instead", api.base_url());
    }

    let service = ctx.build_service(
        api,
        ctx.settings.clone(),
        ConnectivityMonitor::new(Connectivity::from_online(online)),
    )?;
    // One call only; the queue is drained by `sync` and `run`
    service.disable_background_sync();
    let result = service.execute(operation).await;
    service.shutdown().await;

    match result {
        Ok(Execution::Completed(response)) => {
            println!("HTTP {}", response.status);
            if !response.data.is_null() {
                println!("{}", serde_json::to_string_pretty(&response.data)?);
            }
            Ok(())
        }
        Ok(Execution::Queued(pending)) => {
            println!("Queued operation #{}", pending.id());
            Ok(())
        }
        Err(error) => {
            if error.is_retryable() {
                eprintln!("The operation was queued for retry.");
            }
            Err(error.into())
        }
    }
}
