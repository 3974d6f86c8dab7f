// 導出服務層模組
pub mod dedup;
pub mod links;
pub mod producer;
pub mod scheduler;
pub mod service;

pub use dedup::{MemorySetStore, SetStore};
pub use producer::{LogProducer, Producer};
pub use scheduler::{JobLock, LocalJobLock, SCHEDULED_STRATEGIES};
pub use service::CrawlerService;
