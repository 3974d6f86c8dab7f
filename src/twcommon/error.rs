use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("invalid http status code: {0}")]
    FetchStatus(u16),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("time parsing error: {0}")]
    TimeParseError(#[from] chrono::ParseError),

    #[error("URL parsing error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("channel error: {0}")]
    ChannelError(String),

    #[error("aggregation error: {0}")]
    AggregationError(String),

    #[error("scheduler error: {0}")]
    SchedulerError(String),

    #[error("source error: {0}")]
    SourceError(String),

    #[error("crawl cancelled")]
    Cancelled,

    #[error("pipeline stage {stage} failed: {source}")]
    StageError {
        stage: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("pipeline failed: {}", format_multi(.0))]
    Pipeline(Vec<AppError>),
}

impl AppError {
    /// Whether the worker pool should retry the failed request. Non-2xx
    /// status codes are final answers from the remote site, and a cancelled
    /// crawl must not keep hammering it.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::FetchStatus(_) | AppError::Cancelled)
    }

    pub fn at_stage(self, stage: usize) -> AppError {
        AppError::StageError {
            stage,
            source: Box::new(self),
        }
    }
}

fn format_multi(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, AppError>;
