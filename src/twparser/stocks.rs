//! Security-master HTML strategy.
//!
//! The ISIN pages are one giant table where `<b>` header rows split the
//! listing into sections. Only the common-stock and TDR sections carry
//! securities this crawler cares about; any other header ends the section.

use scraper::{Html, Selector};

use crate::twcommon::models::{Record, Strategy};
use crate::twparser::convert::{self, RawRecord};
use crate::twparser::ParseError;

fn section_starts(title: &str) -> bool {
    title == "股票" || title == "臺灣存託憑證(TDR)"
}

pub fn parse(text: &str) -> Result<Vec<Record>, ParseError> {
    let document = Html::parse_document(text);

    let row_sel = Selector::parse("tr").expect("static selector");
    let cell_sel = Selector::parse("td").expect("static selector");
    let bold_sel = Selector::parse("b").expect("static selector");

    let mut in_section = false;
    let mut output = Vec::new();

    for row in document.select(&row_sel) {
        if let Some(bold) = row.select(&bold_sel).next() {
            let title = bold.text().collect::<String>();
            in_section = section_starts(title.trim());
            continue;
        }

        if !in_section {
            continue;
        }

        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if cells.len() < super::STOCK_CAP {
            continue;
        }

        let data = RawRecord {
            parse_date: "",
            fields: &cells,
            target: Strategy::TwseStockList,
        };

        if let Some(record) = convert::stock(&data) {
            output.push(record);
        }
    }

    if output.is_empty() {
        return Err(ParseError::NoParseResults);
    }

    Ok(output)
}
