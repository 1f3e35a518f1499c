//! Declarative row validation: required fields, data types and value ranges.
//!
//! None of the checks mutate the row. Type coercion is only used to compare values.

use crate::transform::parse_date;
use crate::value::{CellValue, Row};
use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Required field '{field}' does not exist")]
    RequiredFieldMissing { field: String },
    #[error("Required field '{field}' has no value")]
    RequiredFieldEmpty { field: String },
    #[error("Required field '{field}' is an empty string")]
    RequiredFieldBlank { field: String },
    #[error("Field '{field}' value '{value}' is not a valid number")]
    NotNumeric { field: String, value: String },
    #[error("Field '{field}' value '{value}' is not a valid integer")]
    NotInteger { field: String, value: String },
    #[error("Field '{field}' value '{value}' is not a valid date")]
    NotDate { field: String, value: String },
    #[error("Field '{field}' should be of type {expected}, found {actual}")]
    WrongType {
        field: String,
        expected: DataType,
        actual: &'static str,
    },
    #[error("Field '{field}' value {value} is less than the minimum {min}")]
    BelowMinimum {
        field: String,
        value: String,
        min: String,
    },
    #[error("Field '{field}' value {value} is greater than the maximum {max}")]
    AboveMaximum {
        field: String,
        value: String,
        max: String,
    },
    #[error("Field '{field}' has length {length} which is less than the minimum length {min_length}")]
    TooShort {
        field: String,
        length: usize,
        min_length: usize,
    },
    #[error("Field '{field}' has length {length} which is greater than the maximum length {max_length}")]
    TooLong {
        field: String,
        length: usize,
        max_length: usize,
    },
    #[error("Field '{field}' value {value} is not one of the allowed values: {allowed}")]
    NotAllowed {
        field: String,
        value: String,
        allowed: String,
    },
    #[error("Column '{column}' is missing")]
    MissingColumn { column: String },
    #[error("Row {row} has no value in column '{column}'")]
    BlankValue { row: usize, column: String },
    #[error("Row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<Error>,
    },
}

/// The type tags a field can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Numeric,
    Date,
    DateTime,
    String,
    Int,
    Float,
    Bool,
    List,
    Dict,
}

impl std::str::FromStr for DataType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "numeric" => DataType::Numeric,
            "date" => DataType::Date,
            "datetime" => DataType::DateTime,
            "string" | "str" => DataType::String,
            "int" | "integer" => DataType::Int,
            "float" => DataType::Float,
            "bool" | "boolean" => DataType::Bool,
            "list" => DataType::List,
            "dict" => DataType::Dict,
            _ => return Err(()),
        })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::Numeric => "numeric",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::List => "list",
            DataType::Dict => "dict",
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RangeRule {
    pub min: Option<CellValue>,
    pub max: Option<CellValue>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub allowed_values: Option<Vec<CellValue>>,
}

/// The validation rules of one rule group.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Rules {
    pub required_fields: Vec<String>,
    pub data_types: Vec<(String, DataType)>,
    pub value_ranges: Vec<(String, RangeRule)>,
}

impl Rules {
    pub fn is_empty(&self) -> bool {
        self.required_fields.is_empty() && self.data_types.is_empty() && self.value_ranges.is_empty()
    }
}

/// Run all checks on all rows, stopping at the first failure which names its 1-based row.
pub fn validate_rows(rows: &[Row], rules: &Rules) -> Result<(), Error> {
    for (index, row) in rows.iter().enumerate() {
        validate_required(row, &rules.required_fields)
            .and_then(|()| validate_data_types(row, &rules.data_types))
            .and_then(|()| validate_value_ranges(row, &rules.value_ranges))
            .map_err(|err| Error::Row {
                row: index + 1,
                source: Box::new(err),
            })?;
    }
    Ok(())
}

pub fn validate_required(row: &Row, required_fields: &[String]) -> Result<(), Error> {
    for field in required_fields {
        match row.get(field) {
            None => {
                return Err(Error::RequiredFieldMissing {
                    field: field.clone(),
                })
            }
            Some(CellValue::Empty) => {
                return Err(Error::RequiredFieldEmpty {
                    field: field.clone(),
                })
            }
            Some(value) if value.is_blank() => {
                return Err(Error::RequiredFieldBlank {
                    field: field.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Absent and blank fields are not checked.
pub fn validate_data_types(row: &Row, data_types: &[(String, DataType)]) -> Result<(), Error> {
    for (field, expected) in data_types {
        let Some(value) = row.get(field) else {
            tracing::debug!(%field, "field absent, skipping type check");
            continue;
        };
        if value.is_blank() {
            continue;
        }
        check_type(field, value, *expected)?;
    }
    Ok(())
}

fn check_type(field: &str, value: &CellValue, expected: DataType) -> Result<(), Error> {
    let ok = match expected {
        DataType::Numeric => {
            let numeric = match value {
                CellValue::Integer(_) | CellValue::Float(_) | CellValue::Decimal(_) => true,
                CellValue::Text(text) => crate::value::parse_decimal(text).is_some(),
                _ => false,
            };
            if !numeric {
                return Err(Error::NotNumeric {
                    field: field.into(),
                    value: value.to_string(),
                });
            }
            true
        }
        DataType::Int => {
            let integral = match value {
                CellValue::Bool(_) => false,
                other => other.to_decimal().is_some_and(|n| n.fract().is_zero()),
            };
            if !integral {
                return Err(Error::NotInteger {
                    field: field.into(),
                    value: value.to_string(),
                });
            }
            true
        }
        DataType::Date | DataType::DateTime => match value {
            CellValue::Date(_) | CellValue::DateTime(_) => true,
            CellValue::Text(text) => {
                if parse_date(text).is_none() {
                    return Err(Error::NotDate {
                        field: field.into(),
                        value: text.clone(),
                    });
                }
                true
            }
            _ => false,
        },
        DataType::String => matches!(value, CellValue::Text(_)),
        DataType::Float => matches!(value, CellValue::Float(_)),
        DataType::Bool => matches!(value, CellValue::Bool(_)),
        DataType::List | DataType::Dict => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::WrongType {
            field: field.into(),
            expected,
            actual: value.type_name(),
        })
    }
}

/// A value coerced into a domain where ordering is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Comparable {
    Number(Decimal),
    Date(time::PrimitiveDateTime),
}

fn looks_like_date(value: &CellValue) -> bool {
    as_date(value).is_some()
}

fn as_date(value: &CellValue) -> Option<time::PrimitiveDateTime> {
    match value {
        CellValue::Date(date) => Some(date.midnight()),
        CellValue::DateTime(date_time) => Some(*date_time),
        CellValue::Text(text) => parse_date(text).map(|date| date.midnight()),
        _ => None,
    }
}

fn as_number(value: &CellValue) -> Option<Decimal> {
    match value {
        CellValue::Bool(_) => None,
        other => other.to_decimal(),
    }
}

/// Coerce `value` and `bound` into one domain: dates if either looks like a date, numbers
/// otherwise. `None` means they are not comparable.
fn coerce_pair(value: &CellValue, bound: &CellValue) -> Option<(Comparable, Comparable)> {
    if looks_like_date(value) || looks_like_date(bound) {
        Some((
            Comparable::Date(as_date(value)?),
            Comparable::Date(as_date(bound)?),
        ))
    } else {
        Some((
            Comparable::Number(as_number(value)?),
            Comparable::Number(as_number(bound)?),
        ))
    }
}

fn normalized(value: &CellValue) -> Option<Comparable> {
    as_date(value)
        .map(Comparable::Date)
        .or_else(|| as_number(value).map(Comparable::Number))
}

/// Absent and blank fields are not checked. Values that cannot be brought into the domain
/// of a bound skip that comparison with a warning, they do not fail the row.
pub fn validate_value_ranges(row: &Row, value_ranges: &[(String, RangeRule)]) -> Result<(), Error> {
    for (field, rule) in value_ranges {
        let Some(value) = row.get(field) else {
            tracing::debug!(%field, "field absent, skipping range check");
            continue;
        };
        if value.is_blank() {
            continue;
        }

        if let Some(min) = &rule.min {
            match coerce_pair(value, min) {
                Some((actual, bound)) if actual < bound => {
                    return Err(Error::BelowMinimum {
                        field: field.clone(),
                        value: value.to_string(),
                        min: min.to_string(),
                    })
                }
                Some(_) => {}
                None => {
                    tracing::warn!(%field, %value, %min, "value is not comparable with minimum, skipping check")
                }
            }
        }
        if let Some(max) = &rule.max {
            match coerce_pair(value, max) {
                Some((actual, bound)) if actual > bound => {
                    return Err(Error::AboveMaximum {
                        field: field.clone(),
                        value: value.to_string(),
                        max: max.to_string(),
                    })
                }
                Some(_) => {}
                None => {
                    tracing::warn!(%field, %value, %max, "value is not comparable with maximum, skipping check")
                }
            }
        }

        if rule.min_length.is_some() || rule.max_length.is_some() {
            match value {
                CellValue::Text(text) => {
                    let length = text.chars().count();
                    if let Some(min_length) = rule.min_length.filter(|min| length < *min) {
                        return Err(Error::TooShort {
                            field: field.clone(),
                            length,
                            min_length,
                        });
                    }
                    if let Some(max_length) = rule.max_length.filter(|max| length > *max) {
                        return Err(Error::TooLong {
                            field: field.clone(),
                            length,
                            max_length,
                        });
                    }
                }
                other => {
                    tracing::warn!(%field, kind = other.type_name(), "value has no length, skipping length check")
                }
            }
        }

        if let Some(allowed) = &rule.allowed_values {
            let wanted = normalized(value);
            let is_allowed = allowed.iter().any(|candidate| {
                candidate == value || (wanted.is_some() && normalized(candidate) == wanted)
            });
            if !is_allowed {
                return Err(Error::NotAllowed {
                    field: field.clone(),
                    value: value.to_string(),
                    allowed: allowed
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
    }
    Ok(())
}
