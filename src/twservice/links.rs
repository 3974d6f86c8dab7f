//! Link-set generation: turns a strategy and a query date into the exact
//! URLs a crawl invocation downloads.

use crate::twcommon::helper::DateFormat;
use crate::twcommon::models::{Link, Strategy};

pub const TWSE_DAILY_CLOSE: &str =
    "https://www.twse.com.tw/exchangeReport/MI_INDEX?response=csv&date={date}&type=ALLBUT0999";
pub const TWSE_THREE_PRIMARY: &str =
    "https://www.twse.com.tw/rwd/zh/fund/T86?response=csv&date={date}&selectType=ALLBUT0999";
pub const TPEX_DAILY_CLOSE: &str =
    "https://www.tpex.org.tw/web/stock/aftertrading/daily_close_quotes/stk_quote_download.php?l=zh-tw&d={date}&s=0,asc,0";
pub const TPEX_THREE_PRIMARY: &str =
    "https://www.tpex.org.tw/web/stock/3insti/daily_trade/3itrade_hedge_result.php?l=zh-tw&o=csv&se=EW&t=D&d={date}";
pub const TWSE_STOCKS: &str = "https://isin.twse.com.tw/isin/C_public.jsp?strMode=2";
pub const TPEX_STOCKS: &str = "https://isin.twse.com.tw/isin/C_public.jsp?strMode=4";
// 各時間窗的分點頁，一檔股票五頁
pub const CONCENTRATION_PAGE: &str =
    "https://fubon-ebrokerdj.fbs.com.tw/z/zc/zco/zco_{stock_id}_{window}.djhtm";

/// Upstream window suffixes of the five concentration pages
/// (1/5/10/20/60 trading days).
pub const CONCENTRATION_WINDOWS: [u8; 5] = [1, 2, 3, 4, 6];

/// The date dialect a strategy's source expects, `None` when the source is
/// dateless (security-master lists).
pub fn date_format(strategy: Strategy) -> Option<DateFormat> {
    match strategy {
        Strategy::TwseDailyClose | Strategy::TwseThreePrimary => Some(DateFormat::Twse),
        Strategy::TpexDailyClose | Strategy::TpexThreePrimary => Some(DateFormat::Tpex),
        Strategy::StakeConcentration => Some(DateFormat::Concentration),
        Strategy::TwseStockList | Strategy::TpexStockList | Strategy::Invalid => None,
    }
}

/// Build the link set of one strategy for one query date.
///
/// `concentration_ids` is only consulted by the concentration strategy:
/// one security expands to five window pages. Every other strategy yields
/// a single link.
pub fn build_links(strategy: Strategy, date: &str, concentration_ids: &[String]) -> Vec<Link> {
    match strategy {
        Strategy::TwseStockList => vec![Link {
            url: TWSE_STOCKS.to_string(),
            date: date.to_string(),
            strategy,
        }],
        Strategy::TpexStockList => vec![Link {
            url: TPEX_STOCKS.to_string(),
            date: date.to_string(),
            strategy,
        }],
        Strategy::TwseDailyClose => vec![dated_link(TWSE_DAILY_CLOSE, date, strategy)],
        Strategy::TpexDailyClose => vec![dated_link(TPEX_DAILY_CLOSE, date, strategy)],
        Strategy::TwseThreePrimary => vec![dated_link(TWSE_THREE_PRIMARY, date, strategy)],
        Strategy::TpexThreePrimary => vec![dated_link(TPEX_THREE_PRIMARY, date, strategy)],
        Strategy::StakeConcentration => concentration_ids
            .iter()
            .flat_map(|stock_id| {
                CONCENTRATION_WINDOWS.iter().map(move |window| Link {
                    url: CONCENTRATION_PAGE
                        .replace("{stock_id}", stock_id)
                        .replace("{window}", &window.to_string()),
                    date: date.to_string(),
                    strategy,
                })
            })
            .collect(),
        Strategy::Invalid => Vec::new(),
    }
}

fn dated_link(template: &str, date: &str, strategy: Strategy) -> Link {
    Link {
        url: template.replace("{date}", date),
        date: date.to_string(),
        strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dated_templates() {
        let links = build_links(Strategy::TwseDailyClose, "20220525", &[]);
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].url,
            "https://www.twse.com.tw/exchangeReport/MI_INDEX?response=csv&date=20220525&type=ALLBUT0999"
        );

        let links = build_links(Strategy::TpexDailyClose, "111/05/25", &[]);
        assert!(links[0].url.contains("d=111/05/25"));
    }

    #[test]
    fn test_stock_lists_are_fixed_urls() {
        let links = build_links(Strategy::TpexStockList, "", &[]);
        assert_eq!(links[0].url, TPEX_STOCKS);
        assert_eq!(links[0].date, "");
    }

    #[test]
    fn test_concentration_expands_five_windows_per_security() {
        let ids = vec!["2330".to_string(), "3704".to_string()];
        let links = build_links(Strategy::StakeConcentration, "2022-05-25", &ids);

        assert_eq!(links.len(), 10);
        assert_eq!(
            links[0].url,
            "https://fubon-ebrokerdj.fbs.com.tw/z/zc/zco/zco_2330_1.djhtm"
        );
        assert_eq!(
            links[4].url,
            "https://fubon-ebrokerdj.fbs.com.tw/z/zc/zco/zco_2330_6.djhtm"
        );
        assert!(links.iter().all(|l| l.date == "2022-05-25"));
    }
}
