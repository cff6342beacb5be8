//! Parameters, their value sets, and the combinations they expand into.

mod parameter;
mod parse;
mod space;

pub use parameter::Parameter;
pub use parse::{date_range, number_range, parse_date, parse_value, FALLBACK_DATE_FORMATS};
pub use space::ParameterSpace;

use crate::db::Value;
use crate::error::{FanoutError, Result};
use std::fmt;
use std::str::FromStr;

/// Date format used when a parameter does not declare one.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamType {
    #[default]
    Text,
    Number,
    Date,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
        }
    }
}

impl FromStr for ParamType {
    type Err = FanoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Ok(Self::Text),
            "number" | "int" | "num" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            other => Err(FanoutError::parameter(format!(
                "Unknown parameter type '{other}'. Expected text, number or date"
            ))),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a parameter's values. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamSource {
    #[default]
    Manual,
    Range,
    Query,
}

/// One concrete assignment of values to the active parameters.
///
/// Entries keep the declaration order of the parameter space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Combination {
    entries: Vec<(String, Value)>,
}

impl Combination {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// The combination that binds nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("(no parameters)");
        }
        let rendered: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}
