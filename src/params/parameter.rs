//! A single named placeholder and its value set.

use super::parse::{date_range, number_range, parse_value};
use super::{ParamSource, ParamType, DEFAULT_DATE_FORMAT};
use crate::db::{self, Connector, Value};
use crate::error::Result;
use chrono::NaiveDate;
use std::fmt::Write;

/// A query parameter with its candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,

    /// Declared type; decides how raw strings are parsed.
    pub param_type: ParamType,

    /// strftime-style format used to parse and display date values.
    pub date_format: String,

    /// Candidate values, in order.
    pub values: Vec<Value>,

    /// Where the values came from.
    pub source: ParamSource,

    /// The query the values were loaded from, when `source` is `Query`.
    pub source_query: Option<String>,
}

impl Parameter {
    /// Creates a parameter with no values.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            values: Vec::new(),
            source: ParamSource::Manual,
            source_query: None,
        }
    }

    /// Sets the date format, builder-style.
    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    /// The parameter name, without the leading colon.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parses and appends a value unless an equal value is already present.
    pub fn add_value(&mut self, raw: &str) {
        let parsed = self.parse(raw);
        if !self.values.contains(&parsed) {
            self.values.push(parsed);
        }
    }

    /// Removes the first value equal to `value`.
    pub fn remove_value(&mut self, value: &Value) {
        if let Some(pos) = self.values.iter().position(|v| v == value) {
            self.values.remove(pos);
        }
    }

    pub fn clear_values(&mut self) {
        self.values.clear();
    }

    /// Replaces all values, parsing each raw string. Duplicates are kept.
    pub fn set_values<S: AsRef<str>>(&mut self, raw: &[S]) {
        self.values = raw.iter().map(|r| self.parse(r.as_ref())).collect();
    }

    /// Replaces all values with already-typed values. Duplicates are kept.
    pub fn set_values_raw(&mut self, values: Vec<Value>) {
        self.values = values;
    }

    /// Fills the values from an inclusive range.
    ///
    /// Dates step by one day using `date_format`; numbers step by one. Text
    /// parameters are left untouched.
    pub fn set_from_range(&mut self, start: &str, end: &str) {
        match self.param_type {
            ParamType::Date => {
                self.values = date_range(start, end, &self.date_format)
                    .into_iter()
                    .map(Value::Date)
                    .collect();
                self.source = ParamSource::Range;
            }
            ParamType::Number => {
                if let Some(numbers) = number_range(start, end) {
                    self.values = numbers.into_iter().map(Value::Int).collect();
                    self.source = ParamSource::Range;
                }
            }
            ParamType::Text => {}
        }
    }

    /// Loads the values from the first column of `sql`.
    ///
    /// Text cells are parsed like `set_values`; typed cells are kept.
    pub async fn set_from_query(&mut self, connector: &dyn Connector, sql: &str) -> Result<usize> {
        let values: Vec<Value> = db::values_from_query(connector, sql)
            .await?
            .into_iter()
            .map(|value| match value {
                Value::String(raw) => self.parse(&raw),
                typed => typed,
            })
            .collect();
        let count = values.len();
        self.set_values_raw(values);
        self.source = ParamSource::Query;
        self.source_query = Some(sql.to_string());
        Ok(count)
    }

    /// Renders up to `max_count` values for display.
    pub fn display_values(&self, max_count: usize) -> String {
        if self.values.is_empty() {
            return "(none)".to_string();
        }

        let shown: Vec<String> = self
            .values
            .iter()
            .take(max_count)
            .map(|v| match v {
                Value::Date(d) => format_date(d, &self.date_format),
                other => other.to_display_string(),
            })
            .collect();

        let mut result = shown.join(", ");
        if self.values.len() > max_count {
            result.push_str(&format!("... (+{} more)", self.values.len() - max_count));
        }
        result
    }

    fn parse(&self, raw: &str) -> Value {
        parse_value(raw, self.param_type, &self.date_format)
    }
}

/// Formats a date, falling back to ISO-8601 when `date_format` is not a valid format string.
fn format_date(date: &NaiveDate, date_format: &str) -> String {
    let mut out = String::new();
    match write!(out, "{}", date.format(date_format)) {
        Ok(()) => out,
        Err(_) => date.to_string(),
    }
}
