//! Broker stake-concentration HTML strategy.
//!
//! Each page covers ONE security and ONE time window. The window ordinal
//! is not in the page body at all - it is recovered from the page URL -
//! and the stock id hides in the `<title>`. The four numeric fields sit in
//! the `oScrollFoot` footer rows.

use scraper::{Html, Selector};

use crate::twcommon::models::Record;
use crate::twparser::convert;
use crate::twparser::ParseError;

const PAGE_SUFFIX: &str = ".djhtm";

/// Pull the window ordinal out of a page address such as
/// `.../zco_2330_6.djhtm` (the character just before the suffix).
fn hidden_index(url: &str) -> String {
    if url.len() > PAGE_SUFFIX.len() + 1 && url.ends_with(PAGE_SUFFIX) {
        let position = url.len() - PAGE_SUFFIX.len() - 1;
        if url.is_char_boundary(position) && url.is_char_boundary(position + 1) {
            return url[position..position + 1].to_string();
        }
    }

    String::new()
}

pub fn parse(date: &str, text: &str, url: &str) -> Result<Vec<Record>, ParseError> {
    let document = Html::parse_document(text);

    let title_sel = Selector::parse("title").expect("static selector");
    let footer_sel = Selector::parse("tr#oScrollFoot").expect("static selector");
    let cell_sel = Selector::parse("td").expect("static selector");

    let title = document
        .select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default();

    // the id sits between the first and second dash of the page title,
    // e.g. "主力進出-2330-近一日"
    let mut parts = title.split('-');
    let stock_id = match (parts.next(), parts.next()) {
        (Some(_), Some(id)) => id.trim().to_string(),
        _ => return Err(ParseError::WrongConcentrationTitle),
    };

    let mut fields: Vec<String> = vec![
        hidden_index(url),
        date.replace('-', ""),
        stock_id,
    ];

    // 頁尾兩列依序是買賣超張數與平均成本，逐格收集正數直到補滿
    'collect: for row in document.select(&footer_sel) {
        for cell in row.select(&cell_sel) {
            if fields.len() >= super::CONCENTRATION_CAP {
                break 'collect;
            }

            let text = cell.text().collect::<String>().trim().replace(',', "");
            if text.is_empty() {
                continue;
            }

            let positive_int = text.parse::<u64>().map(|v| v > 0).unwrap_or(false);
            let positive_float = text.parse::<f32>().map(|v| v > 0.0).unwrap_or(false);

            if positive_int || positive_float {
                fields.push(text);
            }
        }
    }

    let mut output = Vec::new();
    if fields.len() == super::CONCENTRATION_CAP {
        if let Some(record) = convert::concentration(&fields) {
            output.push(record);
        }
    }

    if output.is_empty() {
        return Err(ParseError::NoParseResults);
    }

    Ok(output)
}
