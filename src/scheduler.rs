use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::janitor::Janitor;
use crate::mail::Mailer;
use crate::notifier::Notifier;
use crate::provider::ProviderClient;

/// Wires the notification job and the janitor job onto independent cron
/// schedules and blocks until a shutdown signal arrives. The two jobs may
/// overlap; they only share the cache directory, where distinct keys never
/// contend.
pub async fn run(
    config: &Config,
    notifier: Arc<Notifier<ProviderClient, Mailer>>,
    janitor: Janitor,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("scheduler init failed: {e}"))?;

    let notify_job = {
        let notifier = Arc::clone(&notifier);
        let cancel = cancel.clone();
        Job::new_async(config.schedule.as_str(), move |_id, _scheduler| {
            let notifier = Arc::clone(&notifier);
            let cancel = cancel.clone();
            Box::pin(async move {
                notifier.run(&cancel).await;
            })
        })
        .map_err(|e| anyhow::anyhow!("invalid notification schedule: {e}"))?
    };
    scheduler
        .add(notify_job)
        .await
        .map_err(|e| anyhow::anyhow!("cannot add notification job: {e}"))?;

    let sweep_job = {
        let janitor = Arc::new(janitor);
        let retention = Duration::from_secs(config.cache_retention_hours * 3600);
        Job::new_async(config.janitor_schedule.as_str(), move |_id, _scheduler| {
            let janitor = Arc::clone(&janitor);
            Box::pin(async move {
                info!("cache sweep started");
                janitor.sweep(retention);
            })
        })
        .map_err(|e| anyhow::anyhow!("invalid janitor schedule: {e}"))?
    };
    scheduler
        .add(sweep_job)
        .await
        .map_err(|e| anyhow::anyhow!("cannot add janitor job: {e}"))?;

    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("scheduler start failed: {e}"))?;
    info!(
        schedule = %config.schedule,
        janitor_schedule = %config.janitor_schedule,
        "scheduler started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    info!("shutdown signal received");

    cancel.cancel();
    scheduler
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("scheduler shutdown failed: {e}"))?;

    Ok(())
}
