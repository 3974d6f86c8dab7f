// 導出共享模組
pub mod config;
pub mod error;
pub mod helper;
pub mod logging;
pub mod models;
pub mod proxy;
pub mod retry;

// 重新導出常用型別，方便使用
pub use config::CrawlerConfig;
pub use error::{AppError, Result};
pub use models::{
    map_reduce_concentration, DailyClose, InterceptData, Link, Record, Stock,
    StakeConcentration, Strategy, ThreePrimary, CONCENTRATION_SHARD_COUNT,
};
pub use proxy::{Proxy, ProxyKind};
pub use retry::{retry, RetryError, DEFAULT_RETRY_TIMES};
