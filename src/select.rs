//! Route rows to the default or the special template by the bank of their account.

use crate::value::Row;
use std::path::PathBuf;

/// Rows routed to one template.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// The key of the rule group used to write these rows.
    pub rule_group: String,
    /// Used in place of the template name in the output filename.
    pub name: String,
    pub template: PathBuf,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Groups {
    pub default: Group,
    pub special: Group,
}

pub(crate) mod function {
    use super::{Group, Groups};
    use crate::config::{self, UnitConfig};
    use crate::validate::Error;
    use crate::value::{CellValue, Row};

    /// Split `rows` into those whose bank value equals `default_bank` exactly and all others,
    /// keeping their order. Every row must carry a bank value in `bank_column`.
    pub fn partition(
        rows: Vec<Row>,
        default_bank: &str,
        bank_column: &str,
    ) -> Result<(Vec<Row>, Vec<Row>), Error> {
        let mut default = Vec::new();
        let mut special = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let value = row.get(bank_column).ok_or_else(|| Error::MissingColumn {
                column: bank_column.into(),
            })?;
            if value.is_blank() {
                return Err(Error::BlankValue {
                    row: index + 1,
                    column: bank_column.into(),
                });
            }
            if matches!(value, CellValue::Text(bank) if bank == default_bank) {
                default.push(row);
            } else {
                special.push(row);
            }
        }
        Ok((default, special))
    }

    /// Partition `rows` with the template selector of `unit` and attach to each part the
    /// template and name it is written with.
    pub fn group_data(rows: Vec<Row>, unit: &UnitConfig) -> Result<Groups, Error> {
        let selector = &unit.selector;
        tracing::info!(unit = %unit.name, default_bank = %selector.default_bank, bank_column = %selector.bank_column, "grouping rows by bank");
        let (default, special) = partition(rows, &selector.default_bank, &selector.bank_column)?;

        let group = |key: &str, template: Option<&std::path::PathBuf>, name: Option<&String>, rows| {
            let template = template
                .cloned()
                .unwrap_or_else(|| unit.rule_group(key).template_path.clone());
            Group {
                rule_group: key.into(),
                name: name
                    .cloned()
                    .unwrap_or_else(|| config::file_stem(&template)),
                template,
                rows,
            }
        };
        let groups = Groups {
            default: group(
                config::DEFAULT_RULE_GROUP,
                selector.default_template.as_ref(),
                selector.default_group_name.as_ref(),
                default,
            ),
            special: group(
                config::SPECIAL_RULE_GROUP,
                selector.special_template.as_ref(),
                selector.special_group_name.as_ref(),
                special,
            ),
        };
        tracing::info!(
            default = groups.default.rows.len(),
            special = groups.special.rows.len(),
            "grouped rows"
        );
        Ok(groups)
    }
}
