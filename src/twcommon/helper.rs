//! Date and number helpers shared by the parsers and the link generator.
//!
//! Upstream sites speak three date dialects: TWSE `YYYYMMDD`, TPEX ROC
//! calendar `yyy/MM/dd` (year = Gregorian - 1911) and the concentration
//! pages' `YYYY-MM-DD`. Everything is normalised to the TWSE form before a
//! record leaves the pipeline.

use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::Asia::Taipei;

const ROC_YEAR_OFFSET: i32 = 1911;

/// Date dialect used when rendering a query date for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// 20220525
    Twse,
    /// 111/05/25
    Tpex,
    /// 2022-05-25
    Concentration,
}

/// Parse with thousand separators stripped; unparseable input is 0.
pub fn to_u64(value: &str) -> u64 {
    value.trim().replace(',', "").parse().unwrap_or(0)
}

/// Parse with thousand separators stripped; unparseable input is 0.
pub fn to_i64(value: &str) -> i64 {
    value.trim().replace(',', "").parse().unwrap_or(0)
}

/// Parse with thousand separators stripped; unparseable input is 0.
pub fn to_f32(value: &str) -> f32 {
    value.trim().replace(',', "").parse().unwrap_or(0.0)
}

pub fn is_integer(value: &str) -> bool {
    !value.is_empty() && value.parse::<i64>().is_ok()
}

/// Normalise any supported date dialect to the TWSE form `YYYYMMDD`.
///
/// ROC `yyy/MM/dd` gets 1911 added back to the year; dashed dates just lose
/// their dashes. Unrecognised input comes back empty.
pub fn to_twse_date(input: &str) -> String {
    if input.contains('/') {
        let parts: Vec<&str> = input.split('/').collect();
        if parts.len() != 3 {
            return String::new();
        }

        let Ok(year) = parts[0].parse::<i32>() else {
            return String::new();
        };

        return format!("{}{}{}", year + ROC_YEAR_OFFSET, parts[1], parts[2]);
    }

    input.replace('-', "")
}

/// Render a TWSE `YYYYMMDD` (or slashed Gregorian) date in the ROC form
/// `yyy/MM/dd` the TPEX endpoints expect.
pub fn to_tpex_date(input: &str) -> String {
    if input.contains('/') {
        let parts: Vec<&str> = input.split('/').collect();
        if parts.len() != 3 {
            return String::new();
        }

        let Ok(year) = parts[0].parse::<i32>() else {
            return String::new();
        };

        return format!("{}/{}/{}", year - ROC_YEAR_OFFSET, parts[1], parts[2]);
    }

    if input.len() != 8 {
        return String::new();
    }

    let Ok(year) = input[0..4].parse::<i32>() else {
        return String::new();
    };

    format!("{}/{}/{}", year - ROC_YEAR_OFFSET, &input[4..6], &input[6..8])
}

/// deployment environment 簡名（dev/staging/prod）
pub fn current_env() -> &'static str {
    match std::env::var("ENVIRONMENT").as_deref() {
        Ok("production") => "prod",
        Ok("staging") => "staging",
        _ => "dev",
    }
}

pub fn include_weekend() -> bool {
    std::env::var("INCLUDE_WEEKEND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

/// Render the crawl query date `offset` days from `base` (now when `None`)
/// in exchange-local time. Returns `None` for weekend dates unless
/// `INCLUDE_WEEKEND` is set - there is nothing to download on those days.
pub fn date_from_offset(
    offset: i64,
    format: DateFormat,
    base: Option<DateTime<Utc>>,
) -> Option<String> {
    let local = base.unwrap_or_else(Utc::now).with_timezone(&Taipei)
        + chrono::Duration::days(offset);

    if !include_weekend() && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return None;
    }

    let out = match format {
        DateFormat::Twse => local.format("%Y%m%d").to_string(),
        DateFormat::Tpex => to_tpex_date(&local.format("%Y/%m/%d").to_string()),
        DateFormat::Concentration => local.format("%Y-%m-%d").to_string(),
    };

    Some(out)
}
