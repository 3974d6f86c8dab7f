//! Concurrency behaviour of the pipeline stages: admission rate limiting,
//! retry accounting, cancellation bounds and fan-out cloning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use twstock_crawler::twcommon::error::{AppError, Result};
use twstock_crawler::twcrawler::{
    Broadcast, CountingSink, Fifo, Flow, Payload, Pipeline, Processor, RateLimitedPool, Source,
    StageRunner,
};

struct VecSource {
    payloads: std::vec::IntoIter<Payload>,
}

impl VecSource {
    fn blanks(n: usize) -> Self {
        let payloads: Vec<Payload> = (0..n)
            .map(|i| {
                let mut payload = Payload::from_pool();
                payload.url.push_str(&format!("test://payload/{i}"));
                payload
            })
            .collect();

        Self {
            payloads: payloads.into_iter(),
        }
    }
}

impl Source for VecSource {
    fn next_payload(&mut self) -> Option<Payload> {
        self.payloads.next()
    }

    fn error(&self) -> Option<AppError> {
        None
    }
}

struct NoopProcessor;

#[async_trait]
impl Processor for NoopProcessor {
    async fn process(&self, _cancel: &CancellationToken, _payload: &mut Payload) -> Result<Flow> {
        Ok(Flow::Forward)
    }
}

struct FailingProcessor {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Processor for FailingProcessor {
    async fn process(&self, _cancel: &CancellationToken, _payload: &mut Payload) -> Result<Flow> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::ChannelError("always failing".to_string()))
    }
}

struct SlowProcessor;

#[async_trait]
impl Processor for SlowProcessor {
    async fn process(&self, cancel: &CancellationToken, _payload: &mut Payload) -> Result<Flow> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(Flow::Forward),
        }
    }
}

/// Records every raw buffer it sees; optionally vandalises the payload
/// afterwards to prove fan-out clones are independent.
struct RecordingProcessor {
    seen: Arc<Mutex<Vec<Vec<u8>>>>,
    mutate: bool,
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(&self, _cancel: &CancellationToken, payload: &mut Payload) -> Result<Flow> {
        self.seen
            .lock()
            .unwrap()
            .push(payload.raw_content.clone());

        if self.mutate {
            payload.raw_content.clear();
            payload.raw_content.extend_from_slice(b"vandalised");
        }

        Ok(Flow::Forward)
    }
}

#[tokio::test]
async fn test_rate_limit_floor() {
    let n = 8;
    let interval = Duration::from_millis(30);
    let cancel = CancellationToken::new();

    let stages: Vec<Box<dyn StageRunner>> = vec![Box::new(RateLimitedPool::new(
        Arc::new(NoopProcessor),
        4,
        interval,
    ))];

    let count = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    Pipeline::new(stages)
        .process(
            &cancel,
            VecSource::blanks(n),
            CountingSink::new(Arc::clone(&count)),
        )
        .await
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), n);
    // each admission pays the full interval, workers notwithstanding
    assert!(start.elapsed() >= interval * n as u32);
}

#[tokio::test]
async fn test_pool_retries_then_surfaces_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let stages: Vec<Box<dyn StageRunner>> = vec![Box::new(RateLimitedPool::new(
        Arc::new(FailingProcessor {
            attempts: Arc::clone(&attempts),
        }),
        2,
        Duration::from_millis(10),
    ))];

    let count = Arc::new(AtomicUsize::new(0));
    let outcome = Pipeline::new(stages)
        .process(
            &cancel,
            VecSource::blanks(1),
            CountingSink::new(Arc::clone(&count)),
        )
        .await;

    assert!(outcome.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_returns_within_bound() {
    let cancel = CancellationToken::new();

    let stages: Vec<Box<dyn StageRunner>> = vec![Box::new(RateLimitedPool::new(
        Arc::new(SlowProcessor),
        4,
        Duration::from_millis(100),
    ))];

    let count = Arc::new(AtomicUsize::new(0));

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        })
    };

    let start = Instant::now();
    let outcome = Pipeline::new(stages)
        .process(
            &cancel,
            VecSource::blanks(100),
            CountingSink::new(Arc::clone(&count)),
        )
        .await;
    let elapsed = start.elapsed();

    canceller.await.unwrap();

    assert!(outcome.is_err(), "a cancelled crawl must not report success");
    assert!(
        elapsed < Duration::from_millis(1300),
        "took {elapsed:?} to wind down"
    );
    assert!(count.load(Ordering::SeqCst) <= 100);
}

#[tokio::test]
async fn test_broadcast_clones_are_isolated() {
    let cancel = CancellationToken::new();

    let vandal_seen = Arc::new(Mutex::new(Vec::new()));
    let witness_seen = Arc::new(Mutex::new(Vec::new()));

    // destination 0 receives the original payload and vandalises it;
    // destination 1 receives a deep clone
    let stages: Vec<Box<dyn StageRunner>> = vec![Box::new(Broadcast::new(vec![
        Arc::new(RecordingProcessor {
            seen: Arc::clone(&vandal_seen),
            mutate: true,
        }),
        Arc::new(RecordingProcessor {
            seen: Arc::clone(&witness_seen),
            mutate: false,
        }),
    ]))];

    let mut payload = Payload::from_pool();
    payload.raw_content.extend_from_slice(b"original body");
    let source = VecSource {
        payloads: vec![payload].into_iter(),
    };

    let count = Arc::new(AtomicUsize::new(0));
    Pipeline::new(stages)
        .process(&cancel, source, CountingSink::new(Arc::clone(&count)))
        .await
        .unwrap();

    // both destinations forwarded into the shared sink
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(vandal_seen.lock().unwrap()[0], b"original body");
    assert_eq!(witness_seen.lock().unwrap()[0], b"original body");
}

#[tokio::test]
async fn test_fifo_preserves_order() {
    let cancel = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    struct OrderProcessor {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Processor for OrderProcessor {
        async fn process(&self, _c: &CancellationToken, payload: &mut Payload) -> Result<Flow> {
            self.seen.lock().unwrap().push(payload.url.clone());
            Ok(Flow::Forward)
        }
    }

    let stages: Vec<Box<dyn StageRunner>> = vec![Box::new(Fifo::new(Arc::new(OrderProcessor {
        seen: Arc::clone(&seen),
    })))];

    let count = Arc::new(AtomicUsize::new(0));
    Pipeline::new(stages)
        .process(
            &cancel,
            VecSource::blanks(5),
            CountingSink::new(Arc::clone(&count)),
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let expected: Vec<String> = (0..5).map(|i| format!("test://payload/{i}")).collect();
    assert_eq!(*seen, expected);
}
