//! Typed parsing of raw parameter strings and range expansion.
//!
//! Parsing never fails: a value that does not fit the declared type falls
//! back to the raw (trimmed) string and a warning is logged.

use super::ParamType;
use crate::db::Value;
use chrono::NaiveDate;
use tracing::warn;

/// Formats tried, in order, when a date does not match the declared format.
pub const FALLBACK_DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d-%m-%Y", "%m-%d-%Y", "%Y/%m/%d", "%d/%m/%Y", "%Y.%m.%d",
];

/// Longest range `date_range` and `number_range` will expand.
pub const MAX_RANGE_LEN: usize = 1_000_000;

/// Parses a raw string into a typed value for the given parameter type.
pub fn parse_value(raw: &str, param_type: ParamType, date_format: &str) -> Value {
    let value = raw.trim();

    match param_type {
        ParamType::Text => Value::String(value.to_string()),
        ParamType::Number => parse_number(value),
        ParamType::Date => parse_date(value, date_format)
            .map(Value::Date)
            .unwrap_or_else(|| {
                warn!("'{value}' is not a date in any known format; keeping it as text");
                Value::String(value.to_string())
            }),
    }
}

fn parse_number(value: &str) -> Value {
    let parsed = if value.contains('.') {
        value.parse::<f64>().ok().map(Value::Float)
    } else {
        value.parse::<i64>().ok().map(Value::Int)
    };

    parsed.unwrap_or_else(|| {
        warn!("'{value}' is not a number; keeping it as text");
        Value::String(value.to_string())
    })
}

/// Parses a date with `date_format`, then each fallback format in turn.
pub fn parse_date(value: &str, date_format: &str) -> Option<NaiveDate> {
    std::iter::once(date_format)
        .chain(FALLBACK_DATE_FORMATS)
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Every calendar day from `start` to `end` inclusive.
///
/// Both bounds must match `date_format` exactly; otherwise the range is empty.
pub fn date_range(start: &str, end: &str, date_format: &str) -> Vec<NaiveDate> {
    let (Ok(first), Ok(last)) = (
        NaiveDate::parse_from_str(start.trim(), date_format),
        NaiveDate::parse_from_str(end.trim(), date_format),
    ) else {
        warn!("Invalid date range '{start}'..'{end}' for format '{date_format}'");
        return Vec::new();
    };

    let span = (last - first).num_days();
    if span >= MAX_RANGE_LEN as i64 {
        warn!("Date range '{start}'..'{end}' spans {span} days; the limit is {MAX_RANGE_LEN}");
        return Vec::new();
    }

    first.iter_days().take_while(|day| *day <= last).collect()
}

/// Every integer from `start` to `end` inclusive, or `None` if a bound is not an integer.
pub fn number_range(start: &str, end: &str) -> Option<Vec<i64>> {
    match (start.trim().parse::<i64>(), end.trim().parse::<i64>()) {
        (Ok(first), Ok(last)) => {
            let span = last as i128 - first as i128;
            if span >= MAX_RANGE_LEN as i128 {
                warn!("Number range '{start}'..'{end}' is longer than {MAX_RANGE_LEN} values");
                return None;
            }
            Some((first..=last).collect())
        }
        _ => {
            warn!("Invalid number range '{start}'..'{end}'");
            None
        }
    }
}
