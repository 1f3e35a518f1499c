//! Resolve a configured column target to a 1-based column position within a template.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot resolve column '{target}': it is neither a known header, a column letter nor a column number")]
    Unresolvable { target: String },
    #[error("Column '{target}' resolves to index {index}, beyond the {max_columns} columns of the template")]
    OutOfBounds {
        target: String,
        index: usize,
        max_columns: usize,
    },
}

/// The widest worksheet a spreadsheet application supports, column `XFD`.
pub const MAX_COLUMNS: usize = 16_384;

/// Header names and their 1-based column positions.
pub type Headers = HashMap<String, usize>;

/// A column as written in configuration: a name or letter, or a plain number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(untagged)]
pub enum ColumnTarget {
    Index(i64),
    Label(String),
}

impl std::fmt::Display for ColumnTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnTarget::Index(index) => write!(f, "{index}"),
            ColumnTarget::Label(label) => f.write_str(label),
        }
    }
}

impl From<&str> for ColumnTarget {
    fn from(value: &str) -> Self {
        ColumnTarget::Label(value.into())
    }
}

impl From<i64> for ColumnTarget {
    fn from(value: i64) -> Self {
        ColumnTarget::Index(value)
    }
}

/// Resolve `target` in this order: an exact header name, a pure ASCII column label like `AA`,
/// an integer. Anything else is an error, so a human readable name that isn't a registered
/// header never turns into a spurious base-26 number. The result must not exceed
/// `max_columns` if given.
pub fn resolve_column_index(
    target: &ColumnTarget,
    headers: Option<&Headers>,
    max_columns: Option<usize>,
) -> Result<usize, Error> {
    let unresolvable = || Error::Unresolvable {
        target: target.to_string(),
    };
    let index = match target {
        ColumnTarget::Label(label) => {
            if let Some(index) = headers.and_then(|headers| headers.get(label)) {
                *index
            } else if let Some(index) = letters_to_index(label) {
                index
            } else {
                positive(label.trim().parse::<i64>().map_err(|_| unresolvable())?)
                    .ok_or_else(unresolvable)?
            }
        }
        ColumnTarget::Index(index) => positive(*index).ok_or_else(unresolvable)?,
    };
    if let Some(max_columns) = max_columns {
        if index > max_columns {
            return Err(Error::OutOfBounds {
                target: target.to_string(),
                index,
                max_columns,
            });
        }
    }
    Ok(index)
}

fn positive(index: i64) -> Option<usize> {
    usize::try_from(index)
        .ok()
        .filter(|index| (1..=MAX_COLUMNS).contains(index))
}

/// `A` is 1, `Z` is 26, `AA` is 27. Case-insensitive, `None` unless `label` is made of ASCII
/// letters only and names a column up to `XFD`, so words like `Remark` are not column labels.
pub fn letters_to_index(label: &str) -> Option<usize> {
    if label.is_empty() || label.len() > 3 || !label.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let index = label
        .bytes()
        .fold(0, |acc, b| acc * 26 + usize::from(b.to_ascii_uppercase() - b'A' + 1));
    (index <= MAX_COLUMNS).then_some(index)
}

/// The inverse of [`letters_to_index()`], `index` is 1-based.
pub fn index_to_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
