//! Cron trigger for the crawl daemon.
//!
//! Multiple replicas run the same schedule; the tick body only fires for
//! the replica that wins the job lock. The in-process lock covers
//! single-node runs - a distributed lock is a deployment concern behind
//! the same trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::twcommon::config::CrawlerConfig;
use crate::twcommon::error::{AppError, Result};
use crate::twcommon::models::Strategy;
use crate::twservice::service::CrawlerService;

pub const CRONJOB_LOCK: &str = "crawler-cronjob";

/// Crawl order: refresh the security master first, then the trade reports,
/// then the expensive concentration pages.
pub const SCHEDULED_STRATEGIES: [Strategy; 7] = [
    Strategy::TwseStockList,
    Strategy::TpexStockList,
    Strategy::TwseDailyClose,
    Strategy::TpexDailyClose,
    Strategy::TwseThreePrimary,
    Strategy::TpexThreePrimary,
    Strategy::StakeConcentration,
];

#[async_trait]
pub trait JobLock: Send + Sync {
    /// Take the named lock for `ttl`; `false` means another replica holds it.
    async fn try_obtain(&self, key: &str, ttl: Duration) -> bool;
}

/// Single-process lock table.
#[derive(Default)]
pub struct LocalJobLock {
    held: Mutex<HashMap<String, Instant>>,
}

impl LocalJobLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobLock for LocalJobLock {
    async fn try_obtain(&self, key: &str, ttl: Duration) -> bool {
        let mut held = self.held.lock().expect("lock table poisoned");
        let now = Instant::now();

        if let Some(until) = held.get(key) {
            if *until > now {
                return false;
            }
        }

        held.insert(key.to_string(), now + ttl);
        true
    }
}

/// Register the crawl job and start the scheduler. The returned handle
/// keeps the jobs alive; call `shutdown` on it when the daemon exits.
pub async fn start(
    config: &CrawlerConfig,
    service: Arc<CrawlerService>,
    cancel: CancellationToken,
    lock: Arc<dyn JobLock>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| AppError::SchedulerError(e.to_string()))?;

    let lock_ttl = Duration::from_secs(config.scheduler.lock_minutes * 60);

    let job = Job::new_async(config.scheduler.spec.as_str(), move |_uuid, _handle| {
        let service = Arc::clone(&service);
        let cancel = cancel.clone();
        let lock = Arc::clone(&lock);

        Box::pin(async move {
            if !lock.try_obtain(CRONJOB_LOCK, lock_ttl).await {
                tracing::info!("another replica holds the cron lock, skipping tick");
                return;
            }

            if let Err(err) = service.run_once(&cancel, &SCHEDULED_STRATEGIES).await {
                tracing::error!(error = %err, "scheduled crawl failed");
            }
        })
    })
    .map_err(|e| AppError::SchedulerError(e.to_string()))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| AppError::SchedulerError(e.to_string()))?;

    scheduler
        .start()
        .await
        .map_err(|e| AppError::SchedulerError(e.to_string()))?;

    tracing::info!(spec = %config.scheduler.spec, "cron trigger started");

    Ok(scheduler)
}
