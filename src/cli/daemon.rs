//! Long-running scheduler process

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::VaultResult;
use crate::vault::Vault;

/// Recover unfinished work, then run the ticker until Ctrl-C
pub async fn run_daemon(vault: &Vault) -> VaultResult<()> {
    let report = vault.recover()?;
    if !report.interrupted.is_empty() {
        println!(
            "Marked {} interrupted backup(s) as failed.",
            report.interrupted.len()
        );
    }
    vault.sweep_audit(chrono::Utc::now(), "scheduler")?;

    let shutdown = CancellationToken::new();
    let schedules = vault.schedules();
    let listener = schedules.spawn_listener(shutdown.clone());
    let ticker = schedules.spawn_ticker(shutdown.clone());

    let stats = schedules.stats()?;
    println!(
        "Scheduler running: {} active schedule(s), tick every {}s. Press Ctrl-C to stop.",
        stats.active_schedules,
        vault.settings().scheduler.tick_interval_secs
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C, stopping");
    }
    info!("shutdown requested");
    shutdown.cancel();
    let _ = tokio::join!(listener, ticker);
    println!("Scheduler stopped.");
    Ok(())
}
