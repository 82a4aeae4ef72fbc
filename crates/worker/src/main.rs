//! Payflow Background Worker
//!
//! Runs scheduled maintenance jobs:
//! - Reconciliation sweep cancelling orphaned pending subscriptions (hourly)
//! - Heartbeat logging (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use payflow_billing::{ProviderRegistry, SubscriptionService};
use payflow_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Pending subscriptions older than this are considered abandoned.
const ORPHAN_CUTOFF_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Payflow Worker v{}", env!("CARGO_PKG_VERSION"));

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url, 5).await?;
    info!("Database pool created");

    // The sweep only touches local rows, so no provider credentials are
    // needed here.
    let subscriptions = Arc::new(SubscriptionService::new(
        pool.clone(),
        Arc::new(ProviderRegistry::default()),
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Reconciliation sweep (hourly at minute 10)
    // Cancels pending subscriptions whose checkout was never verified.
    let sweep_service = subscriptions.clone();
    scheduler
        .add(Job::new_async("0 10 * * * *", move |_uuid, _l| {
            let service = sweep_service.clone();
            Box::pin(async move {
                info!("Running orphaned pending subscription sweep");
                match service.expire_orphaned_pending(ORPHAN_CUTOFF_HOURS).await {
                    Ok(expired) => {
                        info!(expired = expired, "Reconciliation sweep complete");
                    }
                    Err(e) => error!(error = %e, "Reconciliation sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Orphaned pending subscription sweep (hourly)");

    // Job 2: Heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
