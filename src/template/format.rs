//! Per-layer display transforms applied after content resolution.
//!
//! Order is fixed: upper-casing first, then date normalization. A date that
//! gets rewritten is emitted in ISO form, so upper-casing never shows on it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::TextLayer;

/// Date layouts accepted for normalization, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Apply the layer's `uppercase` and `dateFormat` transforms to `value`.
pub fn format(value: &str, layer: &TextLayer) -> String {
    let mut result = if layer.uppercase {
        value.to_uppercase()
    } else {
        value.to_string()
    };

    if layer.normalize_dates
        && let Some(date) = parse_date(&result)
    {
        result = date.format("%Y-%m-%d").to_string();
    }

    result
}

/// Parse a calendar date from the common spreadsheet representations.
///
/// Zoned timestamps are converted to UTC before taking the date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc().date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_utc().date());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}
