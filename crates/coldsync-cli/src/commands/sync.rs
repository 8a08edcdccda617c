use std::time::Duration;

use coldsync_core::{spawn_probe, Connectivity, ConnectivityMonitor, SyncReport};

use crate::commands::common::CommandContext;
use crate::error::CliError;

pub async fn run_sync(ctx: &CommandContext) -> Result<(), CliError> {
    let api = ctx.build_api()?;
    if !api.is_reachable().await {
        println!("API unreachable at {}; nothing synced", api.base_url());
        return Ok(());
    }

    let driver = ctx.build_driver(api, true)?;
    let report = driver.sync().await?;
    println!("{}", format_report(&report));
    Ok(())
}

pub async fn run_daemon(
    interval_secs: Option<u64>,
    probe_secs: u64,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let api = ctx.build_api()?;
    let mut settings = ctx.settings.clone();
    if let Some(secs) = interval_secs {
        settings = settings.with_sync_interval(Duration::from_secs(secs.max(1)));
    }

    let online = api.is_reachable().await;
    let connectivity = ConnectivityMonitor::new(Connectivity::from_online(online));
    let probe_api = api.clone();
    let probe = spawn_probe(
        connectivity.clone(),
        Duration::from_secs(probe_secs.max(1)),
        move || {
            let api = probe_api.clone();
            async move { api.is_reachable().await }
        },
    );

    let service = ctx.build_service(api, settings, connectivity)?;
    let status = service.get_queue_status().await?;
    println!(
        "Sync daemon running against {} ({} pending, {}). Press Ctrl-C to stop.",
        service.api().base_url(),
        status.pending,
        if status.is_online { "online" } else { "offline" }
    );

    tokio::signal::ctrl_c().await?;
    probe.abort();
    service.shutdown().await;

    let status = service.get_queue_status().await?;
    println!("Stopped with {} pending operations", status.pending);
    Ok(())
}

pub fn format_report(report: &SyncReport) -> String {
    format!(
        "Sync pass: {} attempted, {} completed, {} retried, {} failed, {} conflicts, {} deferred",
        report.attempted,
        report.completed,
        report.retried,
        report.failed,
        report.conflicts,
        report.deferred
    )
}
