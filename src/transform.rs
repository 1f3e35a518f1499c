//! Normalization of dates, amounts and bank card numbers.

use crate::value::CellValue;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Date value is empty")]
    EmptyDate,
    #[error("Date output format '{format}' is not supported, only YYYY-MM-DD is")]
    UnsupportedDateFormat { format: String },
    #[error("Cannot parse date '{value}', none of the supported input patterns matched")]
    UnparsableDate { value: String },
    #[error("Amount value is empty")]
    EmptyAmount,
    #[error("Cannot convert '{value}' to an amount")]
    InvalidAmount { value: String },
    #[error("Card number is empty")]
    EmptyCardNumber,
    #[error("Card number '{value}' does not contain any digits")]
    CardNumberWithoutDigits { value: String },
    #[error("Card number has {length} digits, expected between 13 and 19")]
    CardNumberLength { length: usize },
    #[error("Card number {digits} fails the Luhn checksum")]
    Luhn { digits: String },
}

/// The transformation a field binding asks for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    #[default]
    None,
    AmountDecimal,
    CardNumber,
    DateFormat,
}

/// Parameters of the transformations, as found in a rule group's `transformations` table.
#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub amount_decimal: AmountSettings,
    #[serde(default)]
    pub date_format: DateSettings,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AmountSettings {
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

impl Default for AmountSettings {
    fn default() -> Self {
        AmountSettings {
            decimal_places: default_decimal_places(),
        }
    }
}

fn default_decimal_places() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct DateSettings {
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

impl Default for DateSettings {
    fn default() -> Self {
        DateSettings {
            output_format: default_output_format(),
        }
    }
}

fn default_output_format() -> String {
    DEFAULT_DATE_FORMAT.into()
}

pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";

/// The accepted textual date layouts, in the order they are tried.
#[derive(Debug, Clone, Copy)]
enum DateLayout {
    /// `2024-01-15`, `2024-1-5`
    YearMonthDay,
    /// `15/01/2024`
    DayMonthYear,
    /// `01/15/2024`
    MonthDayYear,
    /// `2024年01月15日`
    Chinese,
}

const DATE_LAYOUTS: [DateLayout; 4] = [
    DateLayout::YearMonthDay,
    DateLayout::DayMonthYear,
    DateLayout::MonthDayYear,
    DateLayout::Chinese,
];

/// Parse `text` with the first matching layout. Month and day may have one or two digits,
/// the year always has four.
pub fn parse_date(text: &str) -> Option<time::Date> {
    let text = text.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| parse_with_layout(*layout, text))
}

fn parse_with_layout(layout: DateLayout, text: &str) -> Option<time::Date> {
    let parts: Vec<&str> = match layout {
        DateLayout::YearMonthDay => text.split('-').collect(),
        DateLayout::DayMonthYear | DateLayout::MonthDayYear => text.split('/').collect(),
        DateLayout::Chinese => {
            let rest = text.strip_suffix('日')?;
            let (year, rest) = rest.split_once('年')?;
            let (month, day) = rest.split_once('月')?;
            vec![year, month, day]
        }
    };
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    let (year, month, day) = match layout {
        DateLayout::YearMonthDay | DateLayout::Chinese => (a, b, c),
        DateLayout::DayMonthYear => (c, b, a),
        DateLayout::MonthDayYear => (c, a, b),
    };
    let year: i32 = digits(year, 4..=4)?;
    let month: u8 = digits(month, 1..=2)?;
    let day: u8 = digits(day, 1..=2)?;
    time::Date::from_calendar_date(year, time::Month::try_from(month).ok()?, day).ok()
}

fn digits<T: std::str::FromStr>(part: &str, len: std::ops::RangeInclusive<usize>) -> Option<T> {
    (len.contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit()))
        .then(|| part.parse().ok())
        .flatten()
}

/// Reformat a date value as `output_format`, which currently must be `YYYY-MM-DD`.
pub fn transform_date(value: &CellValue, output_format: &str) -> Result<String, Error> {
    if value.is_blank() {
        return Err(Error::EmptyDate);
    }
    if output_format != DEFAULT_DATE_FORMAT {
        return Err(Error::UnsupportedDateFormat {
            format: output_format.into(),
        });
    }
    let date = match value {
        CellValue::Date(date) => *date,
        CellValue::DateTime(date_time) => date_time.date(),
        other => {
            let text = other.to_string();
            parse_date(&text).ok_or(Error::UnparsableDate { value: text })?
        }
    };
    let formatted = CellValue::Date(date).to_string();
    tracing::debug!(%value, %formatted, "transformed date");
    Ok(formatted)
}

/// Round `value` half-up (away from zero) to `decimal_places` using decimal arithmetic.
pub fn transform_amount(value: &CellValue, decimal_places: u32) -> Result<f64, Error> {
    match value {
        CellValue::Empty => return Err(Error::EmptyAmount),
        CellValue::Text(text) if text.is_empty() => return Err(Error::EmptyAmount),
        _ => {}
    }
    let invalid = || Error::InvalidAmount {
        value: value.to_string(),
    };
    let rounded = value
        .to_decimal()
        .ok_or_else(invalid)?
        .round_dp_with_strategy(
            decimal_places,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        );
    // The shortest decimal string parses to the nearest double.
    let amount = rounded.to_string().parse::<f64>().map_err(|_| invalid())?;
    tracing::debug!(%value, amount, "transformed amount");
    Ok(amount)
}

/// Strip everything but digits from `value` and verify length and Luhn checksum.
pub fn transform_card_number(value: &CellValue) -> Result<String, Error> {
    let raw = match value {
        CellValue::Empty | CellValue::Bool(false) | CellValue::Integer(0) => {
            return Err(Error::EmptyCardNumber)
        }
        CellValue::Text(text) if text.is_empty() => return Err(Error::EmptyCardNumber),
        CellValue::Float(n) if *n == 0.0 => return Err(Error::EmptyCardNumber),
        CellValue::Decimal(n) if n.fract().is_zero() => n.trunc().to_string(),
        CellValue::Float(n) if n.fract() == 0.0 => format!("{n:.0}"),
        other => other.to_string(),
    };
    let digits: String = raw
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            // full-width digits as typed by Chinese input methods
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            _ => None,
        })
        .collect();
    if digits.is_empty() {
        return Err(Error::CardNumberWithoutDigits { value: raw });
    }
    if !(13..=19).contains(&digits.len()) {
        return Err(Error::CardNumberLength {
            length: digits.len(),
        });
    }
    if !luhn_check(&digits) {
        return Err(Error::Luhn { digits });
    }
    tracing::debug!(%value, %digits, "transformed card number");
    Ok(digits)
}

/// Every second digit counting from the rightmost one (index 0) is doubled, minus 9 if
/// above 9. The number is valid if the digit sum is divisible by 10.
/// `digits` must contain ASCII digits only.
pub fn luhn_check(digits: &str) -> bool {
    let total: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(index, b)| {
            let digit = u32::from(b - b'0');
            if index % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();
    total % 10 == 0
}

/// Apply the transformation of each binding to the bound source value of every row, in place.
/// Absent or blank values are left alone.
pub fn apply(
    rows: &mut [crate::value::Row],
    bindings: &[crate::config::FieldBinding],
    settings: &Settings,
) -> Result<(), Error> {
    for row in rows.iter_mut() {
        for binding in bindings {
            if binding.transform == TransformKind::None {
                continue;
            }
            let Some(value) = row.get_mut(&binding.source_column) else {
                continue;
            };
            if value.is_blank() {
                continue;
            }
            *value = match binding.transform {
                TransformKind::None => continue,
                TransformKind::AmountDecimal => CellValue::Float(transform_amount(
                    value,
                    settings.amount_decimal.decimal_places,
                )?),
                TransformKind::CardNumber => CellValue::Text(transform_card_number(value)?),
                TransformKind::DateFormat => CellValue::Text(transform_date(
                    value,
                    &settings.date_format.output_format,
                )?),
            };
        }
    }
    Ok(())
}

/// True if any binding asks for a transformation.
pub fn needs_transformations(bindings: &[crate::config::FieldBinding]) -> bool {
    bindings
        .iter()
        .any(|binding| binding.transform != TransformKind::None)
}
