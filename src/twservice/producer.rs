//! Message-bus producer interface.
//!
//! The pipeline emits records; the transport is a deployment concern. The
//! crate ships a logging implementation for development and tests, wired
//! the same way a broker-backed producer would be.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::twcommon::error::Result;

#[async_trait]
pub trait Producer: Send + Sync {
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Logs every message instead of shipping it anywhere.
#[derive(Default)]
pub struct LogProducer {
    published: AtomicUsize,
}

impl LogProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Producer for LogProducer {
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            topic,
            payload = %String::from_utf8_lossy(&message),
            "publish"
        );

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::info!(total = self.published(), "producer closed");
        Ok(())
    }
}
