//! CSV strategy for the daily-close and institutional-trades reports.

use csv::ReaderBuilder;

use crate::twcommon::helper::{is_integer, to_twse_date};
use crate::twcommon::models::{Record, Strategy};
use crate::twparser::convert::{self, RawRecord};
use crate::twparser::ParseError;

/// Parse one exchange CSV body.
///
/// The reports pad real data rows with headers, section titles and
/// legalese, so a row only counts when it is wide enough for its source
/// and its first field looks like a stock id. `date` arrives in the
/// source's own dialect and is normalised to `YYYYMMDD` once, up front.
pub fn parse(strategy: Strategy, date: &str, text: &str) -> Result<Vec<Record>, ParseError> {
    if date.is_empty() {
        return Err(ParseError::MissingDate);
    }

    let capacity = match strategy {
        Strategy::TwseDailyClose | Strategy::TpexDailyClose => super::DAILY_CLOSE_CAP,
        Strategy::TwseThreePrimary => super::TWSE_THREE_PRIMARY_CAP,
        Strategy::TpexThreePrimary => super::TPEX_THREE_PRIMARY_CAP,
        other => {
            return Err(ParseError::Malformed(format!(
                "{other} is not a csv strategy"
            )))
        }
    };

    let parse_date = to_twse_date(date);
    let mut output = Vec::new();

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    for row in reader.records() {
        // 引號不平衡的裝飾列直接略過
        let Ok(row) = row else { continue };
        if row.len() < capacity {
            continue;
        }

        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        fields[0] = fields[0].trim().to_string();

        if !accepts_stock_id(&fields[0]) {
            continue;
        }

        let data = RawRecord {
            parse_date: &parse_date,
            fields: &fields,
            target: strategy,
        };

        let converted = match strategy {
            Strategy::TwseDailyClose | Strategy::TpexDailyClose => convert::daily_close(&data),
            _ => convert::three_primary(&data),
        };

        if let Some(record) = converted {
            output.push(record);
        }
    }

    if output.is_empty() {
        return Err(ParseError::NoParseResults);
    }

    Ok(output)
}

/// Stock ids are 1 to 5 characters with an integer prefix; everything else
/// in the first column is report decoration.
fn accepts_stock_id(id: &str) -> bool {
    if id.is_empty() || id.chars().count() > 5 {
        return false;
    }

    let prefix: String = id.chars().take(2).collect();
    is_integer(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twcommon::models::DailyClose;

    const TWSE_ROW: &str = r#""2330","","1,000","1,000","1,000","100","101","1,005","98","-","12","","","","","","""#;
    const TPEX_ROW: &str = r#""2330","","98","-12","100","101","105","","1,000","1,000","1,000","","","","","","""#;

    fn single_daily_close(strategy: Strategy, date: &str, body: &str) -> DailyClose {
        let records = parse(strategy, date, body).unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::DailyClose(r) => r.clone(),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_twse_daily_close_row() {
        let record = single_daily_close(Strategy::TwseDailyClose, "20220525", TWSE_ROW);

        assert_eq!(record.stock_id, "2330");
        assert_eq!(record.date, "20220525");
        assert_eq!(record.traded_shares, 1000);
        assert_eq!(record.transactions, 1000);
        assert_eq!(record.turnover, 1000);
        assert_eq!(record.open, 100.0);
        assert_eq!(record.high, 101.0);
        assert_eq!(record.low, 1005.0);
        assert_eq!(record.close, 98.0);
        assert_eq!(record.price_diff, -12.0);
    }

    #[test]
    fn test_tpex_daily_close_row() {
        let record = single_daily_close(Strategy::TpexDailyClose, "111/05/25", TPEX_ROW);

        assert_eq!(record.date, "20220525");
        assert_eq!(record.open, 100.0);
        assert_eq!(record.high, 101.0);
        assert_eq!(record.low, 105.0);
        assert_eq!(record.close, 98.0);
        assert_eq!(record.price_diff, -12.0);
        assert_eq!(record.traded_shares, 1000);
        assert_eq!(record.turnover, 1000);
        assert_eq!(record.transactions, 1000);
    }

    #[test]
    fn test_price_diff_sign_concatenation() {
        for (sign, magnitude, expected) in [("+", "3.5", 3.5f32), ("-", "12", -12.0), ("X", "9", 0.0)]
        {
            let body = format!(
                r#""2330","","1,000","1,000","1,000","100","101","105","98","{sign}","{magnitude}","","","","","","""#
            );
            let record = single_daily_close(Strategy::TwseDailyClose, "20220525", &body);
            assert_eq!(record.price_diff, expected);
        }
    }

    #[test]
    fn test_stock_id_filter() {
        for id in ["合計", "2330A6", "", "ABC", "x1"] {
            let body = format!(
                r#""{id}","","1,000","1,000","1,000","100","101","105","98","-","12","","","","","","""#
            );
            assert_eq!(
                parse(Strategy::TwseDailyClose, "20220525", &body),
                Err(ParseError::NoParseResults),
                "id {id:?} must be filtered"
            );
        }

        // short all-numeric ids pass
        for id in ["5", "50", "0050", "12345"] {
            let body = format!(
                r#""{id}","","1,000","1,000","1,000","100","101","105","98","-","12","","","","","","""#
            );
            assert!(parse(Strategy::TwseDailyClose, "20220525", &body).is_ok());
        }
    }

    #[test]
    fn test_narrow_rows_are_skipped() {
        let body = "\"2330\",\"only\",\"three\"\n";
        assert_eq!(
            parse(Strategy::TwseDailyClose, "20220525", body),
            Err(ParseError::NoParseResults)
        );
    }

    #[test]
    fn test_missing_date_is_an_error() {
        assert_eq!(
            parse(Strategy::TwseDailyClose, "", TWSE_ROW),
            Err(ParseError::MissingDate)
        );
    }

    #[test]
    fn test_twse_three_primary_row() {
        let body = r#""2330","台積電","1,000","2,000","3,000","400","5,000","6,000","7,000","8,000","900","1,000","1,100","1,200","-250","1,400","1,500","300","1,700","1,800""#;
        let records = parse(Strategy::TwseThreePrimary, "20220525", body).unwrap();
        let Record::ThreePrimary(record) = &records[0] else {
            panic!("unexpected record kind");
        };

        assert_eq!(record.stock_id, "2330");
        assert_eq!(record.foreign_trade_shares, 3000);
        assert_eq!(record.trust_trade_shares, 900);
        assert_eq!(record.dealer_trade_shares, -250);
        assert_eq!(record.hedging_trade_shares, 300);
    }

    #[test]
    fn test_tpex_three_primary_row() {
        let body = r#""2330","台積電","0","1","2","3","4","5","6","7","8,000","9","10","-1,100","12","13","1,400","15","16","1,700","18","19","20","21","22""#;
        let records = parse(Strategy::TpexThreePrimary, "111/05/25", body).unwrap();
        let Record::ThreePrimary(record) = &records[0] else {
            panic!("unexpected record kind");
        };

        assert_eq!(record.date, "20220525");
        assert_eq!(record.foreign_trade_shares, 8000);
        assert_eq!(record.trust_trade_shares, -1100);
        assert_eq!(record.dealer_trade_shares, 1400);
        assert_eq!(record.hedging_trade_shares, 1700);
    }
}
