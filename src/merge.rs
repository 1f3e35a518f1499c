use crate::config::{self, MonthTypeMapping, RuleGroup, UnitConfig};
use crate::naming;
use crate::stats::Stats;
use crate::value::Row;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Merge folder '{}' does not exist", path.display())]
    FolderNotFound { path: PathBuf },
    #[error("Merge path '{}' is not a directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("No .xlsx, .xls or .csv files to merge were found in '{}'", path.display())]
    NoInputFiles { path: PathBuf },
    #[error("Could not list merge folder '{}'", path.display())]
    ListFolder {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot merge '{}'", path.display())]
    FileName {
        path: PathBuf,
        source: naming::Error,
    },
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("Template name '{template}' of unit '{unit}' matches no rule group, check the group names and template paths in the configuration")]
    NoRuleGroup { unit: String, template: String },
    #[error("Template name '{template}' of unit '{unit}' matches several rule groups: {candidates}")]
    AmbiguousRuleGroup {
        unit: String,
        template: String,
        candidates: String,
    },
    #[error("header_row {header_row} of '{}' is beyond its {rows} rows", path.display())]
    HeaderRowOutOfRange {
        path: PathBuf,
        header_row: usize,
        rows: usize,
    },
    #[error("Cannot resolve the column '{target}' for '{field}' in '{}'", path.display())]
    Column {
        path: PathBuf,
        field: String,
        target: String,
        source: crate::column::Error,
    },
    #[error(transparent)]
    Read(#[from] crate::read::Error),
    #[error("Group '{group}' failed validation")]
    Validate {
        group: String,
        source: crate::validate::Error,
    },
    #[error("Group '{group}' failed transformation")]
    Transform {
        group: String,
        source: crate::transform::Error,
    },
    #[error("Group '{group}' count check failed: file names add up to {from_names}, the data has {from_data}")]
    CountMismatch {
        group: String,
        from_names: usize,
        from_data: usize,
    },
    #[error("Group '{group}' amount check failed: file names add up to {from_names:.2}, the data sums to {from_data:.2}")]
    AmountMismatch {
        group: String,
        from_names: f64,
        from_data: f64,
    },
    #[error("Group '{group}' maps months, but none of its files has a month value")]
    NoMonthValues { group: String },
    #[error("Group '{group}' has conflicting month values {values}, pass --allow-mixed-months to keep them as they are")]
    MixedMonths { group: String, values: String },
    #[error("Cannot infer a month from the value '{value}'")]
    UnknownMonthLabel { value: String },
    #[error("The value '{value}' matches several months: {months}")]
    AmbiguousMonthLabel { value: String, months: String },
    #[error(transparent)]
    Write(#[from] crate::write::Error),
    #[error("Could not create the result directory '{}'", path.display())]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    /// Keep differing month labels of a group row by row instead of failing.
    pub allow_mixed_months: bool,
}

/// A previously generated file and what its name says about it.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    pub path: PathBuf,
    pub name: naming::Parsed,
}

/// The month labels written into a merged file.
#[derive(Debug, Clone, PartialEq)]
pub enum MonthLabels {
    None,
    /// A month parameter like `03` or `年终奖`.
    Param(String),
    /// Verbatim labels, one per row.
    PerRow(Vec<String>),
}

/// All rows of one `(unit, template)` group, checked against their file names.
#[derive(Debug, Clone)]
pub struct Task {
    pub unit_name: String,
    pub template_name: String,
    pub rule_group: String,
    pub template: PathBuf,
    pub rows: Vec<Row>,
    pub month: MonthLabels,
    pub stats: Stats,
}

pub struct Outcome {
    /// The written files and their stats, in group order.
    pub outputs: Vec<(PathBuf, Stats)>,
}

/// Find the rule group of `unit` a file named with `template` was written with. Configured
/// group names take precedence over template file stems, and either must match exactly one
/// rule group.
pub fn resolve_rule_group<'a>(
    unit: &'a UnitConfig,
    template: &str,
) -> Result<(&'a str, &'a RuleGroup), Error> {
    let selector = &unit.selector;
    let mut by_name = BTreeSet::new();
    if selector.default_group_name.as_deref() == Some(template) {
        by_name.insert(config::DEFAULT_RULE_GROUP);
    }
    if selector.special_group_name.as_deref() == Some(template) {
        by_name.insert(config::SPECIAL_RULE_GROUP);
    }
    let candidates: Vec<&str> = if by_name.is_empty() {
        unit.groups
            .iter()
            .filter(|(_, group)| group.template_stem() == template)
            .map(|(key, _)| key.as_str())
            .collect()
    } else {
        by_name.into_iter().collect()
    };
    match candidates.as_slice() {
        [] => Err(Error::NoRuleGroup {
            unit: unit.name.clone(),
            template: template.into(),
        }),
        [key] => Ok((*key, unit.rule_group(key))),
        many => Err(Error::AmbiguousRuleGroup {
            unit: unit.name.clone(),
            template: template.into(),
            candidates: many.join(", "),
        }),
    }
}

/// Map a month label back to the month parameter it was written for.
pub fn infer_month(value: &str, mapping: &MonthTypeMapping) -> Result<String, Error> {
    let value = value.trim();
    if value == mapping.bonus_value {
        return Ok(config::BONUS_MONTH.into());
    }
    if value == mapping.compensation_value {
        return Ok(config::COMPENSATION_MONTH.into());
    }
    let months: Vec<String> = (1..=12u8)
        .map(|month| format!("{month:02}"))
        .filter(|month| mapping.month_format.replace("{month}", month) == value)
        .collect();
    match months.as_slice() {
        [month] => Ok(month.clone()),
        [] => Err(Error::UnknownMonthLabel {
            value: value.into(),
        }),
        many => Err(Error::AmbiguousMonthLabel {
            value: value.into(),
            months: many.join(", "),
        }),
    }
}

pub(crate) mod function {
    use super::{infer_month, resolve_rule_group, Error, InputFile, MonthLabels, Options, Outcome, Task};
    use crate::column::{resolve_column_index, Headers};
    use crate::config::{Config, RuleGroup};
    use crate::value::{CellValue, Row};
    use crate::{naming, read, stats, transform, validate, write};
    use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
    use rust_decimal::Decimal;
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::Path;

    /// Merge all generated files in `folder` into one file per `(unit, template)` group,
    /// written into `folder/result`.
    pub fn merge(folder: &Path, config: &Config, options: Options) -> Result<Outcome, Error> {
        let tasks = prepare(folder, config, &options)?;
        let result_dir = folder.join("result");
        std::fs::create_dir_all(&result_dir).map_err(|source| Error::CreateOutputDir {
            path: result_dir.clone(),
            source,
        })?;

        let mut outputs = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let unit = config.unit(&task.unit_name)?;
            let group = unit.rule_group(&task.rule_group);
            let ext = task
                .template
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            let month = match &task.month {
                MonthLabels::Param(param) => param.as_str(),
                _ => "",
            };
            let path = result_dir.join(naming::output_filename(&naming::Fields {
                unit_name: &task.unit_name,
                template_name: &task.template_name,
                month,
                count: task.stats.count,
                amount: task.stats.amount,
                ext: &ext,
            }));
            crate::write(write::Request {
                template: &task.template,
                output: &path,
                rows: &task.rows,
                group,
                month: match &task.month {
                    MonthLabels::None => write::Month::None,
                    MonthLabels::Param(param) => write::Month::Param(param),
                    MonthLabels::PerRow(labels) => write::Month::PerRow(labels),
                },
            })?;
            tracing::info!(output = %path.display(), count = task.stats.count, amount = task.stats.amount, "merged group written");
            outputs.push((path, task.stats));
        }
        Ok(Outcome { outputs })
    }

    /// Scan `folder`, read and verify every group without writing anything.
    pub fn prepare(folder: &Path, config: &Config, options: &Options) -> Result<Vec<Task>, Error> {
        let files = scan(folder, config)?;
        tracing::info!(folder = %folder.display(), files = files.len(), "scanned merge folder");

        let mut groups = BTreeMap::<(String, String), Vec<InputFile>>::new();
        for file in files {
            groups
                .entry((file.name.unit_name.clone(), file.name.template_name.clone()))
                .or_default()
                .push(file);
        }
        tracing::info!(groups = groups.len(), "grouped files by unit and template");

        let mut tasks = Vec::with_capacity(groups.len());
        for ((unit_name, template_name), files) in groups {
            let label = format!("{unit_name}_{template_name}");
            tracing::info!(group = %label, files = files.len(), "processing merge group");
            let unit = config.unit(&unit_name)?;
            let (rule_group, group) = resolve_rule_group(unit, &template_name)?;

            let mut rows = Vec::new();
            let mut months = Vec::new();
            let mut count_from_names = 0;
            let mut amount_from_names = Decimal::ZERO;
            for file in &files {
                let (file_rows, file_months) = read_generated_rows(&file.path, group)?;
                tracing::info!(file = %file.path.display(), rows = file_rows.len(), count = file.name.count, amount = file.name.amount, "read generated file");
                rows.extend(file_rows);
                months.extend(file_months);
                count_from_names += file.name.count;
                amount_from_names += Decimal::from_f64(file.name.amount)
                    .unwrap_or_default()
                    .round_dp(2);
            }

            if !group.validation_rules.is_empty() {
                validate::validate_rows(&rows, &group.validation_rules).map_err(|source| {
                    Error::Validate {
                        group: label.clone(),
                        source,
                    }
                })?;
            }
            if transform::needs_transformations(&group.field_mappings) {
                transform::apply(&mut rows, &group.field_mappings, &group.transformations).map_err(
                    |source| Error::Transform {
                        group: label.clone(),
                        source,
                    },
                )?;
            }

            let stats = stats::calculate(&rows, group);
            if stats.count != count_from_names {
                return Err(Error::CountMismatch {
                    group: label,
                    from_names: count_from_names,
                    from_data: stats.count,
                });
            }
            let from_data = Decimal::from_f64(stats.amount).unwrap_or_default();
            if (from_data - amount_from_names).abs() > Decimal::new(1, 2) {
                return Err(Error::AmountMismatch {
                    group: label,
                    from_names: amount_from_names.to_f64().unwrap_or_default(),
                    from_data: stats.amount,
                });
            }

            let month = match &group.month_type_mapping {
                None => MonthLabels::None,
                Some(mapping) => {
                    let observed: BTreeSet<&str> = months
                        .iter()
                        .filter_map(|month| month.as_deref())
                        .collect();
                    if observed.is_empty() {
                        return Err(Error::NoMonthValues { group: label });
                    }
                    let inferred = if observed.len() > 1 && options.allow_mixed_months {
                        None
                    } else {
                        Some(
                            observed
                                .iter()
                                .map(|value| infer_month(value, mapping))
                                .collect::<Result<BTreeSet<_>, _>>()?,
                        )
                    };
                    match inferred {
                        Some(params) if params.len() == 1 => {
                            MonthLabels::Param(params.into_iter().next().unwrap_or_default())
                        }
                        Some(_) if !options.allow_mixed_months => {
                            return Err(Error::MixedMonths {
                                group: label,
                                values: observed.into_iter().collect::<Vec<_>>().join(", "),
                            })
                        }
                        _ => {
                            tracing::warn!(group = %label, values = ?observed, "keeping mixed month values row by row");
                            MonthLabels::PerRow(months.into_iter().map(Option::unwrap_or_default).collect())
                        }
                    }
                }
            };
            tracing::info!(group = %label, count = stats.count, amount = stats.amount, ?month, "merge group verified");

            tasks.push(Task {
                unit_name,
                template_name,
                rule_group: rule_group.to_owned(),
                template: group.template_path.clone(),
                rows,
                month,
                stats,
            });
        }
        Ok(tasks)
    }

    fn scan(folder: &Path, config: &Config) -> Result<Vec<InputFile>, Error> {
        if !folder.exists() {
            return Err(Error::FolderNotFound {
                path: folder.to_owned(),
            });
        }
        if !folder.is_dir() {
            return Err(Error::NotADirectory {
                path: folder.to_owned(),
            });
        }
        let list_err = |source| Error::ListFolder {
            path: folder.to_owned(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(folder).map_err(list_err)? {
            let path = entry.map_err(list_err)?.path();
            let supported = read::Format::from_path(&path).is_some();
            if path.is_file() && supported {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(Error::NoInputFiles {
                path: folder.to_owned(),
            });
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        paths
            .into_iter()
            .map(|path| {
                naming::parse(&path, config.unit_names())
                    .map(|name| InputFile {
                        path: path.clone(),
                        name,
                    })
                    .map_err(|source| Error::FileName { path, source })
            })
            .collect()
    }

    /// Read the data region of a file written with `group`. Rows without any bound value
    /// are skipped. Returns the rows and, per row, the trimmed month label if there is one.
    fn read_generated_rows(
        path: &Path,
        group: &RuleGroup,
    ) -> Result<(Vec<Row>, Vec<Option<String>>), Error> {
        let grid = crate::read_grid(path, true)?;
        let max_columns = grid.iter().map(Vec::len).max().unwrap_or(0);
        let headers = match group.header_row {
            0 => None,
            header_row if header_row > grid.len() => {
                return Err(Error::HeaderRowOutOfRange {
                    path: path.to_owned(),
                    header_row,
                    rows: grid.len(),
                })
            }
            header_row => Some(
                grid[header_row - 1]
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| !value.is_blank())
                    .map(|(index, value)| (value.to_string().trim().to_owned(), index + 1))
                    .collect::<Headers>(),
            ),
        };
        let bindings = write::resolve_bindings(path, group, headers.as_ref(), max_columns)?;
        let month_col = group
            .month_type_mapping
            .as_ref()
            .map(|mapping| {
                resolve_column_index(&mapping.target_column, headers.as_ref(), Some(max_columns))
                    .map_err(|source| Error::Column {
                        path: path.to_owned(),
                        field: "month_type_mapping".into(),
                        target: mapping.target_column.to_string(),
                        source,
                    })
            })
            .transpose()?;

        let cell = |cells: &[CellValue], col: usize| cells.get(col - 1).cloned().unwrap_or(CellValue::Empty);
        let mut rows = Vec::new();
        let mut months = Vec::new();
        for cells in grid.iter().skip(group.start_row.saturating_sub(1)) {
            let row: Row = bindings
                .iter()
                .map(|(binding, col)| (binding.source_column.clone(), cell(cells, *col)))
                .collect();
            if row.values().all(CellValue::is_blank) {
                continue;
            }
            months.push(
                month_col
                    .map(|col| cell(cells, col))
                    .filter(|value| !value.is_blank())
                    .map(|value| value.to_string().trim().to_owned()),
            );
            rows.push(row);
        }
        Ok((rows, months))
    }
}
