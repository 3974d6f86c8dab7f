// 導出爬蟲管線模組
pub mod broadcaster;
pub mod crawler;
pub mod extractor;
pub mod fetcher;
pub mod payload;
pub mod pipeline;
pub mod stage;

pub use broadcaster::Broadcaster;
pub use crawler::{CountingSink, CrawlSettings, Crawler, LinkSource};
pub use extractor::TextExtractor;
pub use fetcher::{build_http_client, LinkFetcher};
pub use payload::Payload;
pub use pipeline::{Pipeline, Sink, Source};
pub use stage::{Broadcast, Fifo, Flow, Processor, RateLimitedPool, StageParams, StageRunner};
