use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use twstock_crawler::twcommon::{helper, logging, CrawlerConfig};
use twstock_crawler::twservice::{
    scheduler, CrawlerService, LocalJobLock, LogProducer, MemorySetStore, Producer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = CrawlerConfig::load()?;
    logging::init(&config.logging.level);

    info!(env = helper::current_env(), "starting twstock crawler daemon");

    let producer = Arc::new(LogProducer::new());
    let store = Arc::new(MemorySetStore::new());
    let service = Arc::new(CrawlerService::new(
        config.clone(),
        producer.clone(),
        store,
    )?);

    let cancel = CancellationToken::new();

    // 開發時設 IMMEDIATE=1 直接跑一輪，不等排程
    if std::env::var("IMMEDIATE").is_ok() {
        let count = service
            .run_once(&cancel, &scheduler::SCHEDULED_STRATEGIES)
            .await?;
        info!(payloads = count, "immediate crawl finished");

        return Ok(());
    }

    let mut handle = scheduler::start(
        &config,
        Arc::clone(&service),
        cancel.clone(),
        Arc::new(LocalJobLock::new()),
    )
    .await?;

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    cancel.cancel();

    if let Err(err) = handle.shutdown().await {
        error!(error = %err, "scheduler shutdown failed");
    }

    producer.close().await?;
    info!("daemon stopped");

    Ok(())
}

/// 等待關閉信號：Ctrl+C 或 SIGTERM（容器停止時送的是後者）
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C");
        },
        _ = terminate => {
            info!("received SIGTERM");
        },
    }
}
