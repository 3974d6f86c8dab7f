//! 爬蟲領域模型：抓取目標、解析策略與發佈到訊息匯流排的紀錄型別

use serde::{Deserialize, Serialize};

/// Parsing strategy attached to each crawl target. Determines which parser
/// runs against the downloaded body and which topic the records go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strategy {
    TwseDailyClose,
    TpexDailyClose,
    TwseThreePrimary,
    TpexThreePrimary,
    TwseStockList,
    TpexStockList,
    StakeConcentration,
    /// Sentinel used by recycled payloads.
    #[default]
    Invalid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TwseDailyClose => "TwseDailyClose",
            Strategy::TpexDailyClose => "TpexDailyClose",
            Strategy::TwseThreePrimary => "TwseThreePrimary",
            Strategy::TpexThreePrimary => "TpexThreePrimary",
            Strategy::TwseStockList => "TwseStockList",
            Strategy::TpexStockList => "TpexStockList",
            Strategy::StakeConcentration => "StakeConcentration",
            Strategy::Invalid => "Invalid",
        }
    }

    /// Message bus topic the strategy's records are published onto.
    pub fn topic(&self) -> Option<&'static str> {
        match self {
            Strategy::TwseDailyClose | Strategy::TpexDailyClose => Some("dailycloses-v1"),
            Strategy::TwseThreePrimary | Strategy::TpexThreePrimary => Some("threeprimary-v1"),
            Strategy::TwseStockList | Strategy::TpexStockList => Some("stocks-v1"),
            Strategy::StakeConcentration => Some("stakeconcentration-v1"),
            Strategy::Invalid => None,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single crawl target. Immutable once enqueued into a crawl invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    /// Query date in the source's own format (may be empty for stock lists).
    pub date: String,
    pub strategy: Strategy,
}

/// End-of-day OHLC and volume for one security.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyClose {
    pub stock_id: String,
    pub date: String,
    pub traded_shares: u64,
    pub transactions: u64,
    pub turnover: u64,
    pub open: f32,
    pub close: f32,
    pub high: f32,
    pub low: f32,
    pub price_diff: f32,
}

/// Daily net trading volume of the three institutional classes plus the
/// dealer hedging book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreePrimary {
    pub stock_id: String,
    pub date: String,
    pub foreign_trade_shares: i64,
    pub trust_trade_shares: i64,
    pub dealer_trade_shares: i64,
    pub hedging_trade_shares: i64,
}

/// One security-master row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub stock_id: String,
    pub name: String,
    pub country: String,
    /// "tse" or "otc".
    pub market: String,
    pub category: String,
}

/// Broker-level stake concentration of one security over one time window.
///
/// A complete record for a security is assembled from 5 window shards
/// (1/5/10/20/60 trading days); until then `diff` stays empty and
/// `hidden_field` carries the shard's window ordinal ("0".."4").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeConcentration {
    pub stock_id: String,
    #[serde(rename = "exchangeDate")]
    pub date: String,
    #[serde(skip)]
    pub hidden_field: String,
    pub diff: Vec<i32>,
    pub sum_buy_shares: u64,
    pub sum_sell_shares: u64,
    pub avg_buy_price: f32,
    pub avg_sell_price: f32,
}

/// Number of window shards that make up one complete concentration record.
pub const CONCENTRATION_SHARD_COUNT: usize = 5;

/// Reduce a complete shard set into the single record that gets published.
///
/// The shard with ordinal 0 (the 1-day window) is the latest source of truth
/// for everything except `diff`, whose slot `i` is the buy/sell share
/// difference of window `i`. Returns `None` when the set has no ordinal-0
/// shard or carries an out-of-range ordinal; callers log and drop.
pub fn map_reduce_concentration(shards: Vec<StakeConcentration>) -> Option<StakeConcentration> {
    let mut volume_diff = vec![0i32; CONCENTRATION_SHARD_COUNT];
    let mut base: Option<StakeConcentration> = None;

    for shard in shards {
        let idx: usize = shard.hidden_field.parse().ok()?;
        if idx >= CONCENTRATION_SHARD_COUNT {
            return None;
        }

        volume_diff[idx] = (shard.sum_buy_shares as i64 - shard.sum_sell_shares as i64) as i32;

        if idx == 0 {
            base = Some(shard);
        }
    }

    let mut reduced = base?;
    reduced.diff = volume_diff;

    Some(reduced)
}

/// A parsed domain record, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    DailyClose(DailyClose),
    ThreePrimary(ThreePrimary),
    Stock(Stock),
    Concentration(StakeConcentration),
}

impl Record {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Record::DailyClose(r) => serde_json::to_vec(r),
            Record::ThreePrimary(r) => serde_json::to_vec(r),
            Record::Stock(r) => serde_json::to_vec(r),
            Record::Concentration(r) => serde_json::to_vec(r),
        }
    }
}

/// Batch of parsed records handed to the intercept channel consumer.
#[derive(Debug, Clone)]
pub struct InterceptData {
    pub records: Vec<Record>,
    pub source: Strategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(id: &str, hidden: &str, buy: u64, sell: u64) -> StakeConcentration {
        StakeConcentration {
            stock_id: id.to_string(),
            date: "20220525".to_string(),
            hidden_field: hidden.to_string(),
            sum_buy_shares: buy,
            sum_sell_shares: sell,
            avg_buy_price: 523.0,
            avg_sell_price: 518.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_map_reduce_five_shards() {
        let shards = vec![
            shard("2330", "0", 100, 50),
            shard("2330", "1", 200, 120),
            shard("2330", "2", 300, 210),
            shard("2330", "3", 400, 360),
            shard("2330", "4", 500, 480),
        ];

        let reduced = map_reduce_concentration(shards).unwrap();
        assert_eq!(reduced.diff, vec![50, 80, 90, 40, 20]);
        // ordinal-0 shard is the base for the remaining fields
        assert_eq!(reduced.sum_buy_shares, 100);
        assert_eq!(reduced.sum_sell_shares, 50);
        assert_eq!(reduced.stock_id, "2330");
    }

    #[test]
    fn test_map_reduce_negative_diff() {
        let mut shards = vec![
            shard("2330", "0", 10, 40),
            shard("2330", "1", 1, 2),
            shard("2330", "2", 0, 0),
            shard("2330", "3", 0, 0),
            shard("2330", "4", 0, 0),
        ];
        shards.rotate_left(2);

        let reduced = map_reduce_concentration(shards).unwrap();
        assert_eq!(reduced.diff[0], -30);
        assert_eq!(reduced.diff[1], -1);
    }

    #[test]
    fn test_map_reduce_without_base_shard() {
        let shards = vec![
            shard("2330", "1", 1, 0),
            shard("2330", "1", 2, 0),
            shard("2330", "2", 3, 0),
            shard("2330", "3", 4, 0),
            shard("2330", "4", 5, 0),
        ];
        assert!(map_reduce_concentration(shards).is_none());
    }

    #[test]
    fn test_map_reduce_bad_ordinal() {
        let shards = vec![shard("2330", "9", 1, 0)];
        assert!(map_reduce_concentration(shards).is_none());
    }

    #[test]
    fn test_concentration_wire_format() {
        let mut record = shard("2330", "0", 100, 50);
        record.diff = vec![50, 0, 0, 0, 0];

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stockId"], "2330");
        assert_eq!(json["exchangeDate"], "20220525");
        assert_eq!(json["sumBuyShares"], 100);
        // shard ordinal is internal state, never published
        assert!(json.get("hiddenField").is_none());
    }
}
