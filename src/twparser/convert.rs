//! Raw field sequences → typed domain records.
//!
//! Field positions are fixed per source; see the per-target tables below.
//! Converters never panic on short rows - a malformed row converts to
//! `None` and is skipped upstream.

use crate::twcommon::helper::{to_f32, to_i64, to_u64};
use crate::twcommon::models::{
    DailyClose, Record, StakeConcentration, Stock, ThreePrimary, Strategy,
};

/// Ideographic space separating id and name inside one security-master cell.
const WIDE_SPACE: char = '\u{3000}';

const TDR_CATEGORY: &str = "臺灣存託憑證(TDR)";

/// A parsed row on its way into a converter.
pub struct RawRecord<'a> {
    /// Already normalised to the TWSE form `YYYYMMDD`.
    pub parse_date: &'a str,
    pub fields: &'a [String],
    pub target: Strategy,
}

/// Daily-close field positions.
///
/// TWSE: shares 2 / transactions 3 / turnover 4 / OHLC 5..=8, price diff is
/// the sign column 9 concatenated with the magnitude column 10.
/// TPEX: close 2 / diff 3 / open 4 / high 5 / low 6 / shares 8 / turnover 9
/// / transactions 10.
pub fn daily_close(data: &RawRecord) -> Option<Record> {
    let fields = data.fields;

    match data.target {
        Strategy::TwseDailyClose => {
            if fields.len() < 11 {
                return None;
            }

            Some(Record::DailyClose(DailyClose {
                stock_id: fields[0].clone(),
                date: data.parse_date.to_string(),
                traded_shares: to_u64(&fields[2]),
                transactions: to_u64(&fields[3]),
                turnover: to_u64(&fields[4]),
                open: to_f32(&fields[5]),
                high: to_f32(&fields[6]),
                low: to_f32(&fields[7]),
                close: to_f32(&fields[8]),
                price_diff: to_f32(&format!("{}{}", fields[9], fields[10])),
            }))
        }
        Strategy::TpexDailyClose => {
            if fields.len() < 11 {
                return None;
            }

            Some(Record::DailyClose(DailyClose {
                stock_id: fields[0].clone(),
                date: data.parse_date.to_string(),
                traded_shares: to_u64(&fields[8]),
                transactions: to_u64(&fields[10]),
                turnover: to_u64(&fields[9]),
                open: to_f32(&fields[4]),
                high: to_f32(&fields[5]),
                low: to_f32(&fields[6]),
                close: to_f32(&fields[2]),
                price_diff: to_f32(&fields[3]),
            }))
        }
        _ => None,
    }
}

/// Institutional-trades field positions: TWSE foreign 4 / trust 10 /
/// dealer 14 / hedging 17; TPEX foreign 10 / trust 13 / dealer 16 /
/// hedging 19.
pub fn three_primary(data: &RawRecord) -> Option<Record> {
    let fields = data.fields;

    match data.target {
        Strategy::TwseThreePrimary => {
            if fields.len() < 18 {
                return None;
            }

            Some(Record::ThreePrimary(ThreePrimary {
                stock_id: fields[0].clone(),
                date: data.parse_date.to_string(),
                foreign_trade_shares: to_i64(&fields[4]),
                trust_trade_shares: to_i64(&fields[10]),
                dealer_trade_shares: to_i64(&fields[14]),
                hedging_trade_shares: to_i64(&fields[17]),
            }))
        }
        Strategy::TpexThreePrimary => {
            if fields.len() < 20 {
                return None;
            }

            Some(Record::ThreePrimary(ThreePrimary {
                stock_id: fields[0].clone(),
                date: data.parse_date.to_string(),
                foreign_trade_shares: to_i64(&fields[10]),
                trust_trade_shares: to_i64(&fields[13]),
                dealer_trade_shares: to_i64(&fields[16]),
                hedging_trade_shares: to_i64(&fields[19]),
            }))
        }
        _ => None,
    }
}

/// Security-master row: cell 0 is "id　name" split on the ideographic
/// space, cell 3 names the market, cell 4 the category. A row of exactly
/// [`super::STOCK_CAP`] cells is a TDR listing, whose category column holds
/// something else entirely.
pub fn stock(data: &RawRecord) -> Option<Record> {
    let fields = data.fields;
    if fields.len() < super::STOCK_CAP {
        return None;
    }

    let (id, name) = fields[0].split_once(WIDE_SPACE)?;

    let market = if fields[3].contains("上櫃") {
        "otc"
    } else {
        "tse"
    };

    let category = if fields.len() == super::STOCK_CAP {
        TDR_CATEGORY.to_string()
    } else {
        fields[4].trim().to_string()
    };

    Some(Record::Stock(Stock {
        stock_id: id.trim().to_string(),
        name: name.trim().to_string(),
        country: "TW".to_string(),
        market: market.to_string(),
        category,
    }))
}

/// Concentration accumulator: ordinal / date / stock id / buy shares /
/// sell shares / avg buy price / avg sell price.
pub fn concentration(fields: &[String]) -> Option<Record> {
    if fields.len() < super::CONCENTRATION_CAP {
        return None;
    }

    let Some(hidden) = convert_hidden_index(&fields[0]) else {
        return Some(Record::Concentration(StakeConcentration::default()));
    };

    Some(Record::Concentration(StakeConcentration {
        hidden_field: hidden,
        date: fields[1].clone(),
        stock_id: fields[2].clone(),
        sum_buy_shares: to_u64(&fields[3]),
        sum_sell_shares: to_u64(&fields[4]),
        avg_buy_price: to_f32(&fields[5]),
        avg_sell_price: to_f32(&fields[6]),
        ..Default::default()
    }))
}

/// Upstream window suffixes are 1/2/3/4/6 for the 1/5/10/20/60-day
/// rollups; stored ordinals are the contiguous 0..=4, with the skipped
/// "5" collapsed away.
fn convert_hidden_index(raw: &str) -> Option<String> {
    match raw {
        "6" => Some("4".to_string()),
        _ => {
            let idx: u32 = raw.parse().ok()?;
            if !(1..=4).contains(&idx) {
                return None;
            }

            Some((idx - 1).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_concentration_ordinal_remap() {
        let raw = fields(&["6", "20220525", "2330", "1000", "2000", "523", "518"]);
        let Some(Record::Concentration(record)) = concentration(&raw) else {
            panic!("expected a concentration record");
        };
        assert_eq!(record.hidden_field, "4");
        assert_eq!(record.sum_buy_shares, 1000);
        assert_eq!(record.sum_sell_shares, 2000);

        let raw = fields(&["1", "20220525", "2330", "1000", "2000", "523", "518"]);
        let Some(Record::Concentration(record)) = concentration(&raw) else {
            panic!("expected a concentration record");
        };
        assert_eq!(record.hidden_field, "0");
    }

    #[test]
    fn test_concentration_unparseable_ordinal_is_zero_record() {
        let raw = fields(&["x", "20220525", "2330", "1000", "2000", "523", "518"]);
        let Some(Record::Concentration(record)) = concentration(&raw) else {
            panic!("expected a record");
        };
        assert_eq!(record, StakeConcentration::default());

        // "5" is not a valid upstream window suffix
        let raw = fields(&["5", "20220525", "2330", "1000", "2000", "523", "518"]);
        let Some(Record::Concentration(record)) = concentration(&raw) else {
            panic!("expected a record");
        };
        assert_eq!(record, StakeConcentration::default());
    }

    #[test]
    fn test_converters_reject_short_rows() {
        let short = fields(&["2330", "x"]);

        assert!(daily_close(&RawRecord {
            parse_date: "20220525",
            fields: &short,
            target: Strategy::TwseDailyClose,
        })
        .is_none());

        assert!(three_primary(&RawRecord {
            parse_date: "20220525",
            fields: &short,
            target: Strategy::TpexThreePrimary,
        })
        .is_none());

        assert!(stock(&RawRecord {
            parse_date: "",
            fields: &short,
            target: Strategy::TwseStockList,
        })
        .is_none());

        assert!(concentration(&short).is_none());
    }

    #[test]
    fn test_stock_row_with_category() {
        let raw = fields(&["2330　ABC", "", "", "上櫃", "XXX", "", ""]);
        let Some(Record::Stock(stock)) = stock(&RawRecord {
            parse_date: "",
            fields: &raw,
            target: Strategy::TwseStockList,
        }) else {
            panic!("expected a stock record");
        };

        assert_eq!(stock.stock_id, "2330");
        assert_eq!(stock.name, "ABC");
        assert_eq!(stock.country, "TW");
        assert_eq!(stock.market, "otc");
        assert_eq!(stock.category, "XXX");
    }

    #[test]
    fn test_stock_without_wide_space_is_skipped() {
        let raw = fields(&["2330 ABC", "", "", "上市", "半導體", ""]);
        assert!(stock(&RawRecord {
            parse_date: "",
            fields: &raw,
            target: Strategy::TwseStockList,
        })
        .is_none());
    }
}
