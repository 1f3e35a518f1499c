//! The closed set of values a spreadsheet cell can carry once it left its container format.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

/// A row keyed by column name. Column order carries no meaning.
pub type Row = BTreeMap<String, CellValue>;

static DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day]");
static DATE_TIME_FORMAT: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    Date(time::Date),
    DateTime(time::PrimitiveDateTime),
}

impl CellValue {
    /// Absent, or a string with nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Text(_) => "string",
            CellValue::Integer(_) => "int",
            CellValue::Float(_) => "float",
            CellValue::Decimal(_) => "decimal",
            CellValue::Bool(_) => "bool",
            CellValue::Date(_) => "date",
            CellValue::DateTime(_) => "datetime",
        }
    }

    /// Interpret the value as an exact decimal, parsing strings and never going through
    /// binary floating point for them. Booleans are not numbers.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Integer(n) => Some(Decimal::from(*n)),
            CellValue::Float(n) => parse_decimal(&n.to_string()),
            CellValue::Decimal(n) => Some(*n),
            CellValue::Text(text) => parse_decimal(text),
            CellValue::Empty | CellValue::Bool(_) | CellValue::Date(_) | CellValue::DateTime(_) => {
                None
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Convert a JSON configuration scalar, as used for fixed values.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(CellValue::Integer)
                .or_else(|| n.as_f64().map(CellValue::Float))
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// Parse a decimal the way a human would type it: surrounding whitespace is allowed, and so is
/// scientific notation.
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    Decimal::from_str(input)
        .or_else(|_| Decimal::from_scientific(input))
        .ok()
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Integer(n) => write!(f, "{n}"),
            CellValue::Float(n) => write!(f, "{n}"),
            CellValue::Decimal(n) => write!(f, "{n}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(date) => f.write_str(&date.format(DATE_FORMAT).map_err(|_| std::fmt::Error)?),
            CellValue::DateTime(date_time) => {
                f.write_str(&date_time.format(DATE_TIME_FORMAT).map_err(|_| std::fmt::Error)?)
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.into())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        CellValue::Decimal(value)
    }
}

impl From<time::Date> for CellValue {
    fn from(value: time::Date) -> Self {
        CellValue::Date(value)
    }
}
