//! Crawl orchestration: link collection, the intercept consumer, and the
//! hand-off to the bus producer and dedup store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::twcommon::config::CrawlerConfig;
use crate::twcommon::error::{AppError, Result};
use crate::twcommon::helper::date_from_offset;
use crate::twcommon::models::{InterceptData, Link, Record, Strategy};
use crate::twcrawler::crawler::{CrawlSettings, Crawler};
use crate::twservice::dedup::SetStore;
use crate::twservice::links;
use crate::twservice::producer::Producer;

/// Batches stop being consumed after this long, in case an invocation
/// never winds down on its own.
const CONSUMER_SAFETY_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

/// Published concentration ids stay deduplicated this long.
const DEDUP_EXPIRE: chrono::Duration = chrono::Duration::hours(6);

const INTERCEPT_BUFFER: usize = 64;

/// Everything one replica needs to run scheduled crawls.
pub struct CrawlerService {
    crawler: Crawler,
    producer: Arc<dyn Producer>,
    store: Arc<dyn SetStore>,
    config: CrawlerConfig,
    universe: Vec<String>,
}

impl CrawlerService {
    pub fn new(
        config: CrawlerConfig,
        producer: Arc<dyn Producer>,
        store: Arc<dyn SetStore>,
    ) -> Result<Self> {
        let crawler = Crawler::new(CrawlSettings::from_config(&config))?;
        let universe = load_stock_universe(&config.crawler.stock_list_path);

        Ok(Self {
            crawler,
            producer,
            store,
            config,
            universe,
        })
    }

    /// Run one crawl over `strategies`, publishing every parsed batch.
    /// Returns the payload count the sink consumed.
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
        strategies: &[Strategy],
    ) -> Result<usize> {
        let links = self.collect_links(strategies).await?;
        if links.is_empty() {
            tracing::info!("nothing to crawl for this tick");
            return Ok(0);
        }

        tracing::info!(links = links.len(), "starting crawl invocation");

        let (intercept_tx, intercept_rx) = mpsc::channel::<InterceptData>(INTERCEPT_BUFFER);

        let consumer = tokio::spawn(consume_intercept(
            cancel.clone(),
            intercept_rx,
            Arc::clone(&self.producer),
            Arc::clone(&self.store),
        ));

        let (count, outcome) = self
            .crawler
            .crawl(cancel, links, Some(intercept_tx))
            .await;

        // the crawl dropped its sender; the consumer drains what is left
        if let Err(err) = consumer.await {
            tracing::error!(error = %err, "intercept consumer panicked");
        }

        match outcome {
            Ok(()) => {
                tracing::info!(payloads = count, "crawl invocation finished");
                Ok(count)
            }
            Err(err) => {
                tracing::error!(payloads = count, error = %err, "crawl invocation failed");
                Err(err)
            }
        }
    }

    /// Assemble the full link set for one tick. Concentration targets are
    /// the configured universe minus the ids already published today.
    async fn collect_links(&self, strategies: &[Strategy]) -> Result<Vec<Link>> {
        let mut all = Vec::new();
        let rewind = self.config.crawler.rewind_days.max(0);

        for &strategy in strategies {
            match links::date_format(strategy) {
                None => all.extend(links::build_links(strategy, "", &[])),
                Some(format) => {
                    for offset in -rewind..=0 {
                        let Some(date) = date_from_offset(offset, format, None) else {
                            // weekend date, nothing published
                            continue;
                        };

                        if strategy == Strategy::StakeConcentration {
                            let key = date.replace('-', "");
                            let seen = self.store.smembers(&key).await?;
                            let pending: Vec<String> = self
                                .universe
                                .iter()
                                .filter(|id| !seen.contains(id))
                                .cloned()
                                .collect();

                            all.extend(links::build_links(strategy, &date, &pending));
                        } else {
                            all.extend(links::build_links(strategy, &date, &[]));
                        }
                    }
                }
            }
        }

        Ok(all)
    }
}

/// Drain the intercept channel until the crawl drops its sender, the
/// invocation is cancelled, or the safety timeout trips.
async fn consume_intercept(
    cancel: CancellationToken,
    mut intercept: mpsc::Receiver<InterceptData>,
    producer: Arc<dyn Producer>,
    store: Arc<dyn SetStore>,
) {
    let deadline = tokio::time::sleep(CONSUMER_SAFETY_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!("intercept consumer: cancelled");
                return;
            }
            _ = &mut deadline => {
                tracing::warn!("intercept consumer: safety timeout");
                return;
            }
            maybe = intercept.recv() => {
                let Some(batch) = maybe else { return };
                publish_batch(&*producer, &*store, batch).await;
            }
        }
    }
}

async fn publish_batch(producer: &dyn Producer, store: &dyn SetStore, batch: InterceptData) {
    let Some(topic) = batch.source.topic() else {
        tracing::error!(source = %batch.source, "batch with unroutable strategy");
        return;
    };

    for record in batch.records {
        if !record_matches_source(&record, batch.source) {
            tracing::error!(
                source = %batch.source,
                "record kind does not match its batch strategy"
            );
            continue;
        }

        let payload = match record.to_json() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "record serialisation failed");
                continue;
            }
        };

        if let Err(err) = producer.publish(topic, payload).await {
            tracing::error!(topic, error = %err, "publish failed");
            continue;
        }

        // 已發佈的集中度個股記到去重集合，避免重複抓取
        if let Record::Concentration(record) = &record {
            let key = record.date.replace('-', "");

            if let Err(err) = store.sadd(&key, &record.stock_id).await {
                tracing::error!(error = %err, "dedup sadd failed");
            } else if let Err(err) = store.set_expire(&key, Utc::now() + DEDUP_EXPIRE).await {
                tracing::error!(error = %err, "dedup expire failed");
            }
        }
    }
}

fn record_matches_source(record: &Record, source: Strategy) -> bool {
    matches!(
        (record, source),
        (
            Record::DailyClose(_),
            Strategy::TwseDailyClose | Strategy::TpexDailyClose
        ) | (
            Record::ThreePrimary(_),
            Strategy::TwseThreePrimary | Strategy::TpexThreePrimary
        ) | (
            Record::Stock(_),
            Strategy::TwseStockList | Strategy::TpexStockList
        ) | (Record::Concentration(_), Strategy::StakeConcentration)
    )
}

fn load_stock_universe(path: &str) -> Vec<String> {
    #[derive(serde::Deserialize)]
    struct StockList {
        #[serde(rename = "stockIds")]
        stock_ids: Vec<String>,
    }

    let read = std::fs::read_to_string(path)
        .map_err(AppError::from)
        .and_then(|content| serde_json::from_str::<StockList>(&content).map_err(AppError::from));

    match read {
        Ok(list) => {
            tracing::info!(path, count = list.stock_ids.len(), "loaded stock universe");
            list.stock_ids
        }
        Err(err) => {
            tracing::warn!(path, error = %err, "no stock universe, concentration crawls disabled");
            Vec::new()
        }
    }
}
