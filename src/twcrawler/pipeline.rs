//! Pipeline driver: wires source → stages → sink and supervises the
//! workers until everything drains, something fails, or the crawl is
//! cancelled.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::twcommon::error::{AppError, Result};
use crate::twcrawler::payload::Payload;
use crate::twcrawler::stage::{maybe_emit_error, StageParams, StageRunner};

/// Extra error-channel slots beyond one per stage (source + sink).
const ERR_HEADROOM: usize = 2;

/// Produces the payloads a crawl invocation works through.
pub trait Source: Send {
    /// The next payload, or `None` when the source is exhausted.
    fn next_payload(&mut self) -> Option<Payload>;

    /// The error the source ran into, if any, checked after exhaustion.
    fn error(&self) -> Option<AppError>;
}

/// Consumes the payloads that made it through every stage. The sink takes
/// ownership and is responsible for recycling.
#[async_trait::async_trait]
pub trait Sink: Send {
    async fn consume(&mut self, payload: Payload) -> Result<()>;
}

/// A modular multi-stage pipeline. Built fresh per crawl invocation; all
/// state lives in the stage runners, so independent invocations can run
/// concurrently.
pub struct Pipeline {
    stages: Vec<Box<dyn StageRunner>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn StageRunner>>) -> Self {
        Self { stages }
    }

    /// Drive `source` through every stage into `sink`.
    ///
    /// Blocks until all payloads drained, an error occurred, or `cancel`
    /// fired. The first error cancels the child token so every in-flight
    /// worker winds down cooperatively; by the time this returns no worker
    /// is still executing. All collected errors come back composed.
    pub async fn process<S, K>(self, cancel: &CancellationToken, source: S, sink: K) -> Result<()>
    where
        S: Source + 'static,
        K: Sink + 'static,
    {
        let stage_count = self.stages.len();
        let child = cancel.child_token();

        // one channel more than stages, to wire the source and the sink
        let mut txs = Vec::with_capacity(stage_count + 1);
        let mut rxs = Vec::with_capacity(stage_count + 1);
        for _ in 0..=stage_count {
            let (tx, rx) = mpsc::channel::<Payload>(1);
            txs.push(tx);
            rxs.push(rx);
        }

        let (err_tx, mut err_rx) = mpsc::channel::<AppError>(stage_count + ERR_HEADROOM);

        let mut workers = JoinSet::new();
        let mut txs = txs.into_iter();
        let mut rxs = rxs.into_iter();

        let source_tx = txs.next().expect("missing source channel");
        workers.spawn(source_worker(
            child.clone(),
            source,
            source_tx,
            err_tx.clone(),
        ));

        for (index, stage) in self.stages.into_iter().enumerate() {
            let params = StageParams {
                stage: index,
                input: rxs.next().expect("missing stage input"),
                output: txs.next().expect("missing stage output"),
                errors: err_tx.clone(),
                cancel: child.clone(),
            };

            workers.spawn(async move { stage.run(params).await });
        }

        let sink_rx = rxs.next().expect("missing sink channel");
        workers.spawn(sink_worker(child.clone(), sink, sink_rx, err_tx.clone()));

        // the collector below must see the channel close once workers exit
        drop(err_tx);

        let mut errors = Vec::new();
        while let Some(err) = err_rx.recv().await {
            // first error tears the whole invocation down
            child.cancel();
            errors.push(err);
        }

        while workers.join_next().await.is_some() {}
        child.cancel();

        if errors.is_empty() && cancel.is_cancelled() {
            errors.push(AppError::Cancelled);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Pipeline(errors))
        }
    }
}

async fn source_worker<S: Source>(
    cancel: CancellationToken,
    mut source: S,
    output: mpsc::Sender<Payload>,
    errors: mpsc::Sender<AppError>,
) {
    while let Some(payload) = source.next_payload() {
        tokio::select! {
            _ = cancel.cancelled() => return,
            res = output.send(payload) => {
                if let Err(back) = res {
                    back.0.mark_processed();
                    return;
                }
            }
        }
    }

    if let Some(err) = source.error() {
        maybe_emit_error(err, &errors);
    }
}

async fn sink_worker<K: Sink>(
    cancel: CancellationToken,
    mut sink: K,
    mut input: mpsc::Receiver<Payload>,
    errors: mpsc::Sender<AppError>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            maybe = input.recv() => {
                let Some(payload) = maybe else { return };

                if let Err(err) = sink.consume(payload).await {
                    maybe_emit_error(err, &errors);
                    return;
                }
            }
        }
    }
}
