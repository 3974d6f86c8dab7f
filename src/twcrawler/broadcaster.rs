//! 解析結果廣播與集中度分片聚合
//!
//! 一檔股票的集中度要靠 5 個時間窗分片湊齊才有意義。此處理器掛在
//! 廣播階段的單工 FIFO 之後，聚合表因此只有單一寫入者，不需再上鎖
//! 保護跨 worker 併發。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::twcommon::error::{AppError, Result};
use crate::twcommon::models::{
    map_reduce_concentration, InterceptData, Record, StakeConcentration, Strategy,
    CONCENTRATION_SHARD_COUNT,
};
use crate::twcrawler::payload::Payload;
use crate::twcrawler::stage::{Flow, Processor};

/// Terminal processor: pushes parsed batches out on the intercept channel.
/// Non-concentration batches pass straight through; concentration shards
/// are parked per security until all five windows arrived.
pub struct Broadcaster {
    intercept: Option<mpsc::Sender<InterceptData>>,
    shards: Mutex<HashMap<String, Vec<StakeConcentration>>>,
}

impl Broadcaster {
    pub fn new(intercept: Option<mpsc::Sender<InterceptData>>) -> Self {
        Self {
            intercept,
            shards: Mutex::new(HashMap::new()),
        }
    }

    /// Park the batch's shards; complete sets reduce to publishable
    /// records and leave the table.
    fn absorb_shards(&self, records: &[Record]) -> Vec<Record> {
        let mut reduced = Vec::new();
        let mut table = self.shards.lock().expect("shard table poisoned");

        for record in records {
            let Record::Concentration(shard) = record else {
                continue;
            };

            let entry = table.entry(shard.stock_id.clone()).or_default();
            entry.push(shard.clone());

            if entry.len() == CONCENTRATION_SHARD_COUNT {
                let complete = table.remove(&shard.stock_id).expect("entry just filled");

                match map_reduce_concentration(complete) {
                    Some(record) => reduced.push(Record::Concentration(record)),
                    None => tracing::warn!(
                        stock_id = %shard.stock_id,
                        "dropping malformed concentration shard set"
                    ),
                }
            }
        }

        reduced
    }
}

#[async_trait]
impl Processor for Broadcaster {
    async fn process(&self, cancel: &CancellationToken, payload: &mut Payload) -> Result<Flow> {
        let Some(parsed) = payload.parsed_content.as_ref() else {
            return Err(AppError::AggregationError(
                "payload reached the broadcaster without parsed content".to_string(),
            ));
        };

        let batch = if payload.strategy == Strategy::StakeConcentration {
            let reduced = self.absorb_shards(parsed);
            if reduced.is_empty() {
                None
            } else {
                Some(InterceptData {
                    records: reduced,
                    source: payload.strategy,
                })
            }
        } else {
            Some(InterceptData {
                records: parsed.as_ref().clone(),
                source: payload.strategy,
            })
        };

        if let (Some(channel), Some(batch)) = (&self.intercept, batch) {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                sent = channel.send(batch) => {
                    if sent.is_err() {
                        tracing::warn!("intercept consumer is gone, dropping batch");
                    }
                }
            }
        }

        Ok(Flow::Forward)
    }
}
