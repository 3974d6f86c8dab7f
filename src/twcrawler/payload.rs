//! Pooled carrier moving one crawl target through the pipeline stages.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::twcommon::models::{Link, Record, Strategy};

/// Upper bound on idle payloads kept around between invocations.
const MAX_POOLED: usize = 256;

static PAYLOAD_POOL: Lazy<Mutex<Vec<Payload>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Pipeline item. Owned by exactly one stage at a time; `raw_content` keeps
/// the body bytes exactly as received (Big5), so clones stay faithful and
/// decoding happens only at parse time.
#[derive(Debug, Default)]
pub struct Payload {
    pub url: String,
    pub date: String,
    pub strategy: Strategy,
    pub retrieved_at: Option<DateTime<Utc>>,
    pub raw_content: Vec<u8>,
    /// Set by the extractor stage; shared (not deep-copied) across clones,
    /// so no consumer may mutate it after fan-out.
    pub parsed_content: Option<Arc<Vec<Record>>>,
}

impl Payload {
    /// Take a recycled payload from the pool, or allocate a fresh one.
    pub fn from_pool() -> Payload {
        PAYLOAD_POOL
            .lock()
            .expect("payload pool poisoned")
            .pop()
            .unwrap_or_default()
    }

    pub fn from_link(link: &Link) -> Payload {
        let mut payload = Payload::from_pool();
        payload.url.push_str(&link.url);
        payload.date.push_str(&link.date);
        payload.strategy = link.strategy;
        payload.retrieved_at = Some(Utc::now());

        payload
    }

    /// Release the payload back to the pool. Every field is zeroed so a
    /// later `from_pool` can never observe stale state.
    pub fn mark_processed(mut self) {
        self.url.clear();
        self.date.clear();
        self.strategy = Strategy::Invalid;
        self.retrieved_at = None;
        self.raw_content.clear();
        self.parsed_content = None;

        let mut pool = PAYLOAD_POOL.lock().expect("payload pool poisoned");
        if pool.len() < MAX_POOLED {
            pool.push(self);
        }
    }
}

impl Clone for Payload {
    /// Deep copy for broadcast fan-out: the raw buffer is duplicated, the
    /// parsed-content pointer is shared.
    fn clone(&self) -> Self {
        let mut copy = Payload::from_pool();
        copy.url.push_str(&self.url);
        copy.date.push_str(&self.date);
        copy.strategy = self.strategy;
        copy.retrieved_at = self.retrieved_at;
        copy.raw_content.extend_from_slice(&self.raw_content);
        copy.parsed_content = self.parsed_content.clone();

        copy
    }
}
