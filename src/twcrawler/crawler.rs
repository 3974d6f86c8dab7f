//! Crawl coordinator: builds the three-stage pipeline per invocation and
//! reports how many payloads reached the sink.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::twcommon::config::CrawlerConfig;
use crate::twcommon::error::{AppError, Result};
use crate::twcommon::models::{InterceptData, Link};
use crate::twcommon::proxy::Proxy;
use crate::twcrawler::broadcaster::Broadcaster;
use crate::twcrawler::extractor::TextExtractor;
use crate::twcrawler::fetcher::{build_http_client, LinkFetcher};
use crate::twcrawler::payload::Payload;
use crate::twcrawler::pipeline::{Pipeline, Sink, Source};
use crate::twcrawler::stage::{Broadcast, Fifo, RateLimitedPool, StageRunner};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Parallel fetch workers.
    pub fetch_workers: usize,
    /// Pause between request admissions.
    pub rate_limit_interval: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Optional proxy for the concentration pages.
    pub proxy: Option<Proxy>,
}

impl CrawlSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let proxy = config
            .proxy
            .use_proxy
            .then(|| Proxy::new(config.proxy.kind));

        Self {
            fetch_workers: config.crawler.fetch_workers,
            rate_limit_interval: Duration::from_millis(config.crawler.rate_limit_ms),
            http_timeout: Duration::from_secs(config.crawler.http_timeout_secs),
            proxy,
        }
    }
}

/// Stock-information crawler. One instance can run many invocations; each
/// `crawl` call assembles a fresh pipeline, since the previous one tore
/// itself down with its channels.
pub struct Crawler {
    settings: CrawlSettings,
    client: reqwest::Client,
}

impl Crawler {
    pub fn new(settings: CrawlSettings) -> Result<Self> {
        if settings.fetch_workers == 0 {
            return Err(AppError::ConfigError(
                "crawler requires at least one fetch worker".to_string(),
            ));
        }

        let client = build_http_client(settings.http_timeout.as_secs())?;

        Ok(Self { settings, client })
    }

    fn assemble(&self, intercept: Option<mpsc::Sender<InterceptData>>) -> Pipeline {
        let fetcher = LinkFetcher::new(self.client.clone(), self.settings.proxy);

        let stages: Vec<Box<dyn StageRunner>> = vec![
            Box::new(RateLimitedPool::new(
                Arc::new(fetcher),
                self.settings.fetch_workers,
                self.settings.rate_limit_interval,
            )),
            Box::new(Fifo::new(Arc::new(TextExtractor::new()))),
            Box::new(Broadcast::new(vec![Arc::new(Broadcaster::new(intercept))])),
        ];

        Pipeline::new(stages)
    }

    /// Send every link through fetch → extract → broadcast, emitting parsed
    /// batches on `intercept`. Returns the number of payloads the sink
    /// consumed together with the composed pipeline outcome; the two are
    /// independent, partial success is normal.
    pub async fn crawl(
        &self,
        cancel: &CancellationToken,
        links: Vec<Link>,
        intercept: Option<mpsc::Sender<InterceptData>>,
    ) -> (usize, Result<()>) {
        let pipeline = self.assemble(intercept);

        let count = Arc::new(AtomicUsize::new(0));
        let sink = CountingSink {
            count: Arc::clone(&count),
        };

        let outcome = pipeline
            .process(cancel, LinkSource::new(links), sink)
            .await;

        (count.load(Ordering::SeqCst), outcome)
    }
}

/// Feeds the enqueued links into the pipeline as pooled payloads.
pub struct LinkSource {
    links: std::vec::IntoIter<Link>,
}

impl LinkSource {
    pub fn new(links: Vec<Link>) -> Self {
        Self {
            links: links.into_iter(),
        }
    }
}

impl Source for LinkSource {
    fn next_payload(&mut self) -> Option<Payload> {
        self.links.next().map(|link| Payload::from_link(&link))
    }

    fn error(&self) -> Option<AppError> {
        None
    }
}

/// Counts consumed payloads and recycles them.
pub struct CountingSink {
    count: Arc<AtomicUsize>,
}

impl CountingSink {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        Self { count }
    }
}

#[async_trait]
impl Sink for CountingSink {
    async fn consume(&mut self, payload: Payload) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        payload.mark_processed();

        Ok(())
    }
}
