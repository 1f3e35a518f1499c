use crate::config::RuleGroup;
use crate::validate;
use crate::value::{parse_decimal, CellValue, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// What a generated file name records about its rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub amount: f64,
}

/// Count `rows` and sum the amount column of `group`. Values that are not numbers, or
/// strings that don't parse as one, are ignored.
pub fn calculate(rows: &[Row], group: &RuleGroup) -> Stats {
    let amount = group.amount_column().map_or(Decimal::ZERO, |column| {
        rows.iter()
            .filter_map(|row| match row.get(column)? {
                CellValue::Bool(_) => None,
                value => value.to_decimal(),
            })
            .sum()
    });
    Stats {
        count: rows.len(),
        amount: amount.to_f64().unwrap_or_default(),
    }
}

/// True for numeric zero and for strings denoting zero, also with thousands separators.
pub fn is_zero_amount(value: &CellValue) -> bool {
    match value {
        CellValue::Integer(n) => *n == 0,
        CellValue::Float(n) => *n == 0.0,
        CellValue::Decimal(n) => n.is_zero(),
        CellValue::Text(text) => {
            let text: String = text.trim().chars().filter(|c| !matches!(c, ',' | '，')).collect();
            parse_decimal(&text).is_some_and(|n| n.is_zero())
        }
        CellValue::Empty | CellValue::Bool(_) | CellValue::Date(_) | CellValue::DateTime(_) => false,
    }
}

/// Remove the rows with a zero amount in `column`. If there are rows, at least one of them
/// must have that column.
pub fn filter_zero_amounts(rows: Vec<Row>, column: &str) -> Result<Vec<Row>, validate::Error> {
    if !rows.is_empty() && !rows.iter().any(|row| row.contains_key(column)) {
        return Err(validate::Error::MissingColumn {
            column: column.into(),
        });
    }
    let before = rows.len();
    let rows: Vec<Row> = rows
        .into_iter()
        .filter(|row| !row.get(column).is_some_and(is_zero_amount))
        .collect();
    tracing::info!(%column, removed = before - rows.len(), kept = rows.len(), "filtered zero amounts");
    Ok(rows)
}
