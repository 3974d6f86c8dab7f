//! 資料源解析策略
//!
//! 每個抓取目標依其 `Strategy` 走不同的解析流程：交易所 CSV 報表、
//! 證券編碼 HTML 清單、或券商分點集中度頁面。所有來源一律以 Big5
//! 回應，解析前先透明轉碼成 Unicode。

pub mod concentration;
pub mod convert;
pub mod csv;
pub mod stocks;

use thiserror::Error;

use crate::twcommon::error::AppError;
use crate::twcommon::models::{Record, Strategy};

/// Minimum cell count of a security-master row.
pub const STOCK_CAP: usize = 5;
/// Minimum field count of a daily-close CSV row (both exchanges).
pub const DAILY_CLOSE_CAP: usize = 17;
/// Minimum field count of a TWSE institutional-trades CSV row.
pub const TWSE_THREE_PRIMARY_CAP: usize = 19;
/// Minimum field count of a TPEX institutional-trades CSV row.
pub const TPEX_THREE_PRIMARY_CAP: usize = 24;
/// Accumulated field count of one concentration shard.
pub const CONCENTRATION_CAP: usize = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The body decoded fine but produced no rows. Common for holidays and
    /// dates the source has not published yet; treated as empty, not fatal.
    #[error("no parse results")]
    NoParseResults,

    /// Concentration page without the expected hyphenated title, usually a
    /// block page or an unlisted security.
    #[error("unexpected concentration page title")]
    WrongConcentrationTitle,

    /// CSV strategies cannot run without a query date.
    #[error("parse date missing")]
    MissingDate,

    #[error("{0}")]
    Malformed(String),
}

impl ParseError {
    /// Benign outcomes flow through the pipeline as an empty batch instead
    /// of failing the payload.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ParseError::NoParseResults | ParseError::WrongConcentrationTitle
        )
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::ParseError(err.to_string())
    }
}

/// Decode the Big5 body and run the strategy's parser over it.
///
/// `url` is only consulted by the concentration strategy, which recovers
/// the time-window ordinal from the page address.
pub fn parse(
    strategy: Strategy,
    date: &str,
    raw: &[u8],
    url: &str,
) -> Result<Vec<Record>, ParseError> {
    let (text, _, _) = encoding_rs::BIG5.decode(raw);

    match strategy {
        Strategy::TwseDailyClose
        | Strategy::TpexDailyClose
        | Strategy::TwseThreePrimary
        | Strategy::TpexThreePrimary => csv::parse(strategy, date, &text),
        Strategy::TwseStockList | Strategy::TpexStockList => stocks::parse(&text),
        Strategy::StakeConcentration => concentration::parse(date, &text, url),
        Strategy::Invalid => Err(ParseError::Malformed(
            "cannot parse with the invalid strategy".to_string(),
        )),
    }
}
