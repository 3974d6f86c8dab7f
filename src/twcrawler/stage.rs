//! 管線階段執行器
//!
//! 三種執行器涵蓋整條爬蟲管線的併發型態：
//! 1. **Fifo**: 單工處理，輸出順序等於輸入順序。
//! 2. **RateLimitedPool**: 受速率限制的動態工作池，每次派工後強制間隔。
//! 3. **Broadcast**: 深拷貝扇出到多個下游處理器。
//!
//! 所有 channel 等待點都同時監聽取消訊號。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::twcommon::error::{AppError, Result};
use crate::twcommon::retry::{RetryError, DEFAULT_RETRY_TIMES};
use crate::twcrawler::payload::Payload;

/// What a processor wants done with the payload it just handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Push the payload downstream.
    Forward,
    /// The payload is finished here; recycle it.
    Discard,
}

/// One processing step run by a stage. Implementations must be shareable
/// across the worker tasks of a pool stage.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, cancel: &CancellationToken, payload: &mut Payload) -> Result<Flow>;
}

/// Channel endpoints handed to a stage by the pipeline driver.
pub struct StageParams {
    pub stage: usize,
    pub input: mpsc::Receiver<Payload>,
    pub output: mpsc::Sender<Payload>,
    pub errors: mpsc::Sender<AppError>,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait StageRunner: Send {
    /// Drain the input channel until it closes or the crawl is cancelled.
    /// Dropping the output sender on return signals the next stage.
    async fn run(self: Box<Self>, params: StageParams);
}

/// Queue an error without blocking; when the buffered channel is already
/// full the newcomer is dropped (the earliest errors win).
pub(crate) fn maybe_emit_error(err: AppError, errors: &mpsc::Sender<AppError>) {
    let _ = errors.try_send(err);
}

// ---------------------------------------------------------------------------
// Fifo
// ---------------------------------------------------------------------------

/// Single-worker stage preserving input order.
pub struct Fifo {
    proc: Arc<dyn Processor>,
}

impl Fifo {
    pub fn new(proc: Arc<dyn Processor>) -> Self {
        Self { proc }
    }
}

#[async_trait]
impl StageRunner for Fifo {
    async fn run(self: Box<Self>, mut params: StageParams) {
        loop {
            tokio::select! {
                _ = params.cancel.cancelled() => return,
                maybe = params.input.recv() => {
                    let Some(mut payload) = maybe else { return };

                    match self.proc.process(&params.cancel, &mut payload).await {
                        Ok(Flow::Forward) => {
                            tokio::select! {
                                _ = params.cancel.cancelled() => return,
                                res = params.output.send(payload) => {
                                    if let Err(back) = res {
                                        back.0.mark_processed();
                                        return;
                                    }
                                }
                            }
                        }
                        Ok(Flow::Discard) => payload.mark_processed(),
                        Err(AppError::Cancelled) => {
                            payload.mark_processed();
                            return;
                        }
                        Err(err) => {
                            maybe_emit_error(err.at_stage(params.stage), &params.errors);
                            payload.mark_processed();
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitedPool
// ---------------------------------------------------------------------------

/// Dynamic worker pool bounded by `max_workers` permits, with a mandatory
/// pause after every admission so request spacing holds regardless of how
/// many workers are free. Each task runs its processor under bounded retry.
pub struct RateLimitedPool {
    proc: Arc<dyn Processor>,
    max_workers: usize,
    interval: Duration,
}

impl RateLimitedPool {
    /// Panics when `max_workers` is zero; config validation rejects that
    /// before a pipeline is ever assembled.
    pub fn new(proc: Arc<dyn Processor>, max_workers: usize, interval: Duration) -> Self {
        assert!(max_workers > 0, "RateLimitedPool: max_workers must be > 0");

        Self {
            proc,
            max_workers,
            interval,
        }
    }
}

#[async_trait]
impl StageRunner for RateLimitedPool {
    async fn run(self: Box<Self>, mut params: StageParams) {
        let permits = Arc::new(Semaphore::new(self.max_workers));

        'admission: loop {
            tokio::select! {
                _ = params.cancel.cancelled() => break 'admission,
                maybe = params.input.recv() => {
                    let Some(mut payload) = maybe else { break 'admission };

                    let permit = tokio::select! {
                        _ = params.cancel.cancelled() => {
                            payload.mark_processed();
                            break 'admission;
                        }
                        acquired = permits.clone().acquire_owned() => {
                            acquired.expect("worker pool semaphore closed")
                        }
                    };

                    let proc = Arc::clone(&self.proc);
                    let output = params.output.clone();
                    let errors = params.errors.clone();
                    let cancel = params.cancel.clone();
                    let interval = self.interval;
                    let stage = params.stage;

                    tokio::spawn(async move {
                        let _permit = permit;
                        let mut flow = Flow::Discard;

                        let result = {
                            let mut remaining = DEFAULT_RETRY_TIMES.max(1);
                            let mut pause = interval;

                            loop {
                                match proc.process(&cancel, &mut payload).await {
                                    Ok(out) => {
                                        flow = out;
                                        break Ok(());
                                    }
                                    Err(err) => match RetryError::from(err) {
                                        RetryError::Stop(err) => break Err(err),
                                        RetryError::Transient(err) => {
                                            remaining -= 1;
                                            if remaining == 0 {
                                                break Err(err);
                                            }

                                            tracing::warn!(
                                                attempts_left = remaining,
                                                pause_ms = pause.as_millis() as u64,
                                                error = %err,
                                                "retrying after failure"
                                            );

                                            tokio::select! {
                                                _ = cancel.cancelled() => break Err(AppError::Cancelled),
                                                _ = tokio::time::sleep(pause) => {}
                                            }

                                            pause *= 2;
                                        }
                                    },
                                }
                            }
                        };

                        match result {
                            Ok(()) => match flow {
                                Flow::Forward => {
                                    tokio::select! {
                                        _ = cancel.cancelled() => {}
                                        res = output.send(payload) => {
                                            if let Err(back) = res {
                                                back.0.mark_processed();
                                            }
                                        }
                                    }
                                }
                                Flow::Discard => payload.mark_processed(),
                            },
                            Err(AppError::Cancelled) => payload.mark_processed(),
                            Err(err) => {
                                maybe_emit_error(err.at_stage(stage), &errors);
                                payload.mark_processed();
                            }
                        }
                    });

                    // 派工後的固定間隔，與工作數無關
                    tokio::select! {
                        _ = params.cancel.cancelled() => break 'admission,
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
            }
        }

        // Wait for every in-flight worker by claiming the full permit set.
        let _ = permits.acquire_many(self.max_workers as u32).await;
    }
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// Fan-out stage: each processor runs in its own Fifo with a private input
/// channel; all share the downstream output. Every incoming payload is
/// deep-cloned for all destinations except the first, which receives the
/// original.
pub struct Broadcast {
    procs: Vec<Arc<dyn Processor>>,
}

impl Broadcast {
    /// Panics on an empty processor list; a broadcast stage without
    /// destinations cannot forward anything.
    pub fn new(procs: Vec<Arc<dyn Processor>>) -> Self {
        assert!(
            !procs.is_empty(),
            "Broadcast: at least one processor must be specified"
        );

        Self { procs }
    }
}

#[async_trait]
impl StageRunner for Broadcast {
    async fn run(self: Box<Self>, mut params: StageParams) {
        let mut inputs = Vec::with_capacity(self.procs.len());
        let mut workers = Vec::with_capacity(self.procs.len());

        for proc in self.procs {
            let (tx, rx) = mpsc::channel(1);
            inputs.push(tx);

            let fifo = Box::new(Fifo::new(proc));
            let fifo_params = StageParams {
                stage: params.stage,
                input: rx,
                output: params.output.clone(),
                errors: params.errors.clone(),
                cancel: params.cancel.clone(),
            };

            workers.push(tokio::spawn(async move { fifo.run(fifo_params).await }));
        }

        'fanout: loop {
            tokio::select! {
                _ = params.cancel.cancelled() => break 'fanout,
                maybe = params.input.recv() => {
                    let Some(payload) = maybe else { break 'fanout };

                    for idx in (1..inputs.len()).rev() {
                        let copy = payload.clone();
                        tokio::select! {
                            _ = params.cancel.cancelled() => break 'fanout,
                            res = inputs[idx].send(copy) => {
                                if let Err(back) = res {
                                    back.0.mark_processed();
                                }
                            }
                        }
                    }

                    // the first destination takes the original, last
                    tokio::select! {
                        _ = params.cancel.cancelled() => break 'fanout,
                        res = inputs[0].send(payload) => {
                            if let Err(back) = res {
                                back.0.mark_processed();
                            }
                        }
                    }
                }
            }
        }

        drop(inputs);
        join_all(workers).await;
    }
}
