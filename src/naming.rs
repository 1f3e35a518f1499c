//! Output filenames double as a record of what a file contains, and merge mode reads them back.
//!
//! The grammar of a generated file name is
//!
//! ```text
//! <unit>_<template>_<count>人_金额<amount>元<ext>
//! ```
//!
//! where `count` is a non-negative integer, `amount` a decimal with two places (possibly
//! negative) and `ext` one of `.xlsx`, `.xls` or `.csv`. `unit` and `template` may contain
//! underscores themselves, so the unit is found by matching the longest configured unit name.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown placeholder '{{{name}}}' in output filename template, supported are {{unit_name}}, {{template_name}}, {{month}}, {{count}}, {{amount}}, {{amount:.2f}} and {{ext}}")]
    UnknownPlaceholder { name: String },
    #[error("Unbalanced braces in output filename template '{template}'")]
    UnbalancedBraces { template: String },
    #[error("File '{file}' does not have a supported extension (.xlsx, .xls, .csv)")]
    UnsupportedExtension { file: String },
    #[error("File name '{file}' does not follow the pattern <unit>_<template>_<count>人_金额<amount>元")]
    Pattern { file: String },
    #[error("The prefix '{prefix}' does not start with any configured unit name")]
    UnknownUnit { prefix: String },
    #[error("The prefix '{prefix}' has no template name after the unit name")]
    MissingTemplateName { prefix: String },
}

/// The wire format, also used by default for single runs.
pub const DEFAULT_TEMPLATE: &str = "{unit_name}_{template_name}_{count}人_金额{amount:.2f}元{ext}";
pub const SUPPORTED_EXTENSIONS: [&str; 3] = [".xlsx", ".xls", ".csv"];

/// The values available to an output filename template.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    pub unit_name: &'a str,
    pub template_name: &'a str,
    pub month: &'a str,
    pub count: usize,
    pub amount: f64,
    /// Includes the leading dot.
    pub ext: &'a str,
}

/// What a generated file name says about its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub unit_name: String,
    pub template_name: String,
    pub count: usize,
    pub amount: f64,
}

/// Render `template`, with `{{` and `}}` standing for literal braces.
pub fn format(template: &str, fields: &Fields<'_>) -> Result<String, Error> {
    let unbalanced = || Error::UnbalancedBraces {
        template: template.into(),
    };
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(unbalanced()),
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(unbalanced()),
                        Some(c) => name.push(c),
                    }
                }
                match name.as_str() {
                    "unit_name" => out.push_str(fields.unit_name),
                    "template_name" => out.push_str(fields.template_name),
                    "month" => out.push_str(fields.month),
                    "count" => out.push_str(&fields.count.to_string()),
                    "amount" if fields.amount.fract() == 0.0 => {
                        out.push_str(&format!("{:.1}", fields.amount))
                    }
                    "amount" => out.push_str(&fields.amount.to_string()),
                    "amount:.2f" => out.push_str(&format!("{:.2}", fields.amount)),
                    "ext" => out.push_str(fields.ext),
                    _ => return Err(Error::UnknownPlaceholder { name }),
                }
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// The file name in wire format.
pub fn output_filename(fields: &Fields<'_>) -> String {
    format!(
        "{}_{}_{}人_金额{:.2}元{}",
        fields.unit_name, fields.template_name, fields.count, fields.amount, fields.ext
    )
}

/// Parse the name of `path` which must have been produced in wire format for one of
/// `unit_names`.
pub fn parse<'a>(path: &Path, unit_names: impl IntoIterator<Item = &'a str>) -> Result<Parsed, Error> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(Error::UnsupportedExtension { file });
    }
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<prefix>.+)_(?P<count>\d+)人_金额(?P<amount>-?\d+(?:\.\d+)?)元$")
            .expect("valid regex")
    });
    let caps = pattern
        .captures(&stem)
        .ok_or_else(|| Error::Pattern { file: file.clone() })?;
    let count = caps["count"]
        .parse()
        .map_err(|_| Error::Pattern { file: file.clone() })?;
    let amount = caps["amount"]
        .parse()
        .map_err(|_| Error::Pattern { file: file.clone() })?;
    let prefix = &caps["prefix"];

    let mut unit_names: Vec<&str> = unit_names.into_iter().collect();
    unit_names.sort_by_key(|name| std::cmp::Reverse(name.chars().count()));
    for unit_name in unit_names {
        let Some(template_name) = prefix
            .strip_prefix(unit_name)
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            continue;
        };
        if template_name.is_empty() {
            return Err(Error::MissingTemplateName {
                prefix: prefix.into(),
            });
        }
        return Ok(Parsed {
            unit_name: unit_name.into(),
            template_name: template_name.into(),
            count,
            amount,
        });
    }
    Err(Error::UnknownUnit {
        prefix: prefix.into(),
    })
}
