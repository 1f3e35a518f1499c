use crate::column::{self, resolve_column_index, Headers};
use crate::config::{self, FieldBinding, MappingMode, MonthTypeMapping, RuleGroup};
use crate::value::Row;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("Template '{}' does not exist", path.display())]
    TemplateNotFound { path: PathBuf },
    #[error("Template '{}' has unsupported format '{extension}', expected .xlsx or .csv", path.display())]
    Unsupported { path: PathBuf, extension: String },
    #[error("Template '{}' is an .xls workbook which can be read but not written, please convert it to .xlsx", path.display())]
    XlsUnsupported { path: PathBuf },
    #[error("Could not resolve the column of '{field}' in '{}'", path.display())]
    Column {
        path: PathBuf,
        field: String,
        source: column::Error,
    },
    #[error("Could not fill template '{}'", path.display())]
    Xlsx {
        path: PathBuf,
        source: crate::xlsx::Error,
    },
    #[error("Could not process CSV template '{}'", path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

/// The month-derived value written into each row, if the rule group maps months.
#[derive(Debug, Clone, Copy)]
pub enum Month<'a> {
    /// Nothing is written.
    None,
    /// A month parameter like `3`, `03` or `年终奖`, formatted through the month type mapping.
    Param(&'a str),
    /// One verbatim label per row.
    PerRow(&'a [String]),
}

/// Everything needed to produce one output file.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub template: &'a Path,
    pub output: &'a Path,
    pub rows: &'a [Row],
    pub group: &'a RuleGroup,
    pub month: Month<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub rows_written: usize,
    /// Rows added after an explicit data region because the data did not fit into it.
    pub inserted_rows: usize,
}

/// Compute the label written for the month parameter `month`: `1`-`12` become
/// `month_format` with the two-digit month, the bonus and compensation labels map to their
/// configured values. Anything else yields `None`.
pub fn month_value(month: &str, mapping: &MonthTypeMapping) -> Option<String> {
    let month = month.trim();
    if month == config::BONUS_MONTH {
        return Some(mapping.bonus_value.clone());
    }
    if month == config::COMPENSATION_MONTH {
        return Some(mapping.compensation_value.clone());
    }
    let number: u8 = month.parse().ok()?;
    (1..=12)
        .contains(&number)
        .then(|| mapping.month_format.replace("{month}", &format!("{number:02}")))
}

/// Resolve the field bindings of `group` to columns of the sheet at `path`, which has
/// `max_columns` columns or no known width if 0.
///
/// In `column_name` mode targets are looked up in `headers` first, and a target that is neither
/// a header nor a column label or number is skipped with a warning. In `column_index` mode
/// headers are ignored and every target must resolve.
pub fn resolve_bindings<'g>(
    path: &Path,
    group: &'g RuleGroup,
    headers: Option<&Headers>,
    max_columns: usize,
) -> Result<Vec<(&'g FieldBinding, usize)>, Error> {
    let max = (max_columns > 0).then_some(max_columns);
    let mut bindings = Vec::with_capacity(group.field_mappings.len());
    for binding in &group.field_mappings {
        let resolved = match group.mapping_mode {
            MappingMode::ColumnName => match resolve_column_index(&binding.target, headers, max) {
                Err(column::Error::Unresolvable { target }) => {
                    tracing::warn!(%target, field = %binding.key, source = %binding.source_column, "target column not found in template, field is not written");
                    continue;
                }
                resolved => resolved,
            },
            MappingMode::ColumnIndex => resolve_column_index(&binding.target, None, max),
        };
        let col = resolved.map_err(|source| Error::Column {
            path: path.to_owned(),
            field: binding.key.clone(),
            source,
        })?;
        bindings.push((binding, col));
    }
    Ok(bindings)
}

pub(crate) mod function {
    use super::{Error, Month, Outcome, Request};
    use crate::column::{resolve_column_index, ColumnTarget, Headers};
    use crate::config;
    use crate::read::Format;
    use crate::value::CellValue;
    use crate::xlsx::Workbook;
    use std::path::Path;

    /// Fill the template of `request` with its rows and save the result to its output path.
    pub fn write(request: Request<'_>) -> Result<Outcome, Error> {
        let Request {
            template,
            output,
            rows,
            group,
            ..
        } = request;
        tracing::info!(template = %template.display(), output = %output.display(), rows = rows.len(), "writing output");
        if group.start_row <= group.header_row {
            return Err(config::Error::StartRowNotAfterHeader {
                header_row: group.header_row,
                start_row: group.start_row,
            }
            .into());
        }
        let window = clear_window(request)?;
        if !template.exists() {
            return Err(Error::TemplateNotFound {
                path: template.to_owned(),
            });
        }

        let outcome = match Format::from_path(template) {
            Some(Format::Xlsx) => write_xlsx(request, window)?,
            Some(Format::Csv) => write_csv(request, window)?,
            Some(Format::Xls) => {
                if let Some(window) = window.filter(|window| window.overflow > 0) {
                    return Err(config::Error::ClearWindowTooSmall {
                        rows: rows.len(),
                        capacity: window.capacity,
                        format: ".xls".into(),
                    }
                    .into());
                }
                return Err(Error::XlsUnsupported {
                    path: template.to_owned(),
                });
            }
            None => {
                return Err(Error::Unsupported {
                    path: template.to_owned(),
                    extension: template
                        .extension()
                        .map(|ext| ext.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                })
            }
        };
        tracing::info!(output = %output.display(), rows = outcome.rows_written, inserted = outcome.inserted_rows, "output written");
        Ok(outcome)
    }

    /// An explicit data region, all rows 1-based and inclusive.
    #[derive(Debug, Clone, Copy)]
    struct Window {
        first_row: usize,
        last_row: usize,
        capacity: usize,
        overflow: usize,
    }

    fn clear_window(request: Request<'_>) -> Result<Option<Window>, Error> {
        let group = request.group;
        let Some(clear_rows) = group.clear_rows else {
            return Ok(None);
        };
        let first_row = clear_rows.start_row.unwrap_or(group.start_row);
        let last_row = clear_rows.end_row;
        if !(first_row <= group.start_row && group.start_row <= last_row) {
            return Err(config::Error::ClearWindowMisplaced {
                start_row: first_row,
                end_row: last_row,
                data_start_row: group.start_row,
            }
            .into());
        }
        let capacity = last_row - group.start_row + 1;
        Ok(Some(Window {
            first_row,
            last_row,
            capacity,
            overflow: request.rows.len().saturating_sub(capacity),
        }))
    }

    /// A cell-addressable target, rows and columns are 1-based.
    trait Sheet {
        fn set(&mut self, row: usize, col: usize, value: &CellValue);
    }

    impl Sheet for Workbook {
        fn set(&mut self, row: usize, col: usize, value: &CellValue) {
            self.set_value(row, col, value)
        }
    }

    impl Sheet for Vec<Vec<String>> {
        fn set(&mut self, row: usize, col: usize, value: &CellValue) {
            if self.len() < row {
                self.resize_with(row, Vec::new);
            }
            let cells = &mut self[row - 1];
            if cells.len() < col {
                cells.resize(col, String::new());
            }
            cells[col - 1] = value.to_string();
        }
    }

    fn write_xlsx(request: Request<'_>, window: Option<Window>) -> Result<Outcome, Error> {
        let xlsx_err = |source| Error::Xlsx {
            path: request.template.to_owned(),
            source,
        };
        let mut book = Workbook::open(request.template).map_err(xlsx_err)?;
        let max_columns = book.max_column();
        let headers = (request.group.header_row > 0).then(|| {
            (1..=max_columns)
                .filter_map(|col| {
                    book.cell_text(request.group.header_row, col)
                        .map(|name| name.trim().to_owned())
                        .filter(|name| !name.is_empty())
                        .map(|name| (name, col))
                })
                .collect::<Headers>()
        });

        let inserted_rows = match window {
            None => {
                book.delete_rows_from(request.group.start_row);
                0
            }
            Some(window) => {
                book.clear_values(window.first_row..=window.last_row);
                book.insert_rows(window.last_row + 1, window.overflow);
                window.overflow
            }
        };

        fill(&mut book, request, headers.as_ref(), max_columns)?;
        book.save(request.output).map_err(xlsx_err)?;
        Ok(Outcome {
            rows_written: request.rows.len(),
            inserted_rows,
        })
    }

    fn write_csv(request: Request<'_>, window: Option<Window>) -> Result<Outcome, Error> {
        let mut grid = read_csv_template(request.template)?;
        let max_columns = grid.iter().map(Vec::len).max().unwrap_or(0);
        let header_row = request.group.header_row;
        let headers = (header_row > 0).then(|| {
            grid.get(header_row - 1)
                .into_iter()
                .flatten()
                .enumerate()
                .filter(|(_, name)| !name.trim().is_empty())
                .map(|(index, name)| (name.trim().to_owned(), index + 1))
                .collect::<Headers>()
        });

        let start_row = request.group.start_row;
        let inserted_rows = match window {
            None => {
                grid.truncate(start_row - 1);
                0
            }
            Some(window) => {
                for cells in grid
                    .iter_mut()
                    .take(window.last_row)
                    .skip(window.first_row - 1)
                {
                    cells.iter_mut().for_each(String::clear);
                }
                if window.overflow > 0 && grid.len() > window.last_row {
                    let at = window.last_row;
                    grid.splice(at..at, std::iter::repeat_with(Vec::new).take(window.overflow));
                }
                window.overflow
            }
        };

        fill(&mut grid, request, headers.as_ref(), max_columns)?;
        for cells in grid.iter_mut() {
            if cells.len() < max_columns {
                cells.resize(max_columns, String::new());
            }
        }

        let csv_err = |source| Error::Csv {
            path: request.output.to_owned(),
            source,
        };
        let mut out = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(request.output)
            .map_err(csv_err)?;
        for cells in &grid {
            out.write_record(cells).map_err(csv_err)?;
        }
        out.flush()
            .map_err(|err| csv_err(csv::Error::from(err)))?;
        Ok(Outcome {
            rows_written: request.rows.len(),
            inserted_rows,
        })
    }

    fn read_csv_template(path: &Path) -> Result<Vec<Vec<String>>, Error> {
        let csv_err = |source| Error::Csv {
            path: path.to_owned(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;
        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            grid.push(record.iter().map(ToOwned::to_owned).collect::<Vec<_>>());
        }
        if let Some(first) = grid.first_mut().and_then(|cells| cells.first_mut()) {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_owned();
            }
        }
        Ok(grid)
    }

    /// Write every row of `request` starting at its start row.
    fn fill(
        sheet: &mut impl Sheet,
        request: Request<'_>,
        headers: Option<&Headers>,
        max_columns: usize,
    ) -> Result<(), Error> {
        let group = request.group;
        let max = (max_columns > 0).then_some(max_columns);
        let resolve = |field: &str, target: &ColumnTarget| {
            resolve_column_index(target, headers, max).map_err(|source| Error::Column {
                path: request.template.to_owned(),
                field: field.to_owned(),
                source,
            })
        };

        let bindings = super::resolve_bindings(request.template, group, headers, max_columns)?;
        let fixed_values = group
            .fixed_values
            .iter()
            .map(|(target, value)| resolve("fixed_values", target).map(|col| (col, value)))
            .collect::<Result<Vec<_>, _>>()?;
        let auto_number = group
            .auto_number
            .as_ref()
            .map(|auto| resolve("auto_number", &auto.column).map(|col| (col, auto.start_from)))
            .transpose()?;
        let branch = group
            .bank_branch_mapping
            .as_ref()
            .map(|branch| {
                resolve("bank_branch_mapping", &branch.target_column)
                    .map(|col| (col, branch.source_column.as_str()))
            })
            .transpose()?;
        let month_col = match (&group.month_type_mapping, request.month) {
            (Some(mapping), Month::Param(_) | Month::PerRow(_)) => {
                Some(resolve("month_type_mapping", &mapping.target_column)?)
            }
            _ => None,
        };
        let month_param = match (&group.month_type_mapping, request.month) {
            (Some(mapping), Month::Param(param)) => {
                let value = super::month_value(param, mapping);
                if value.is_none() {
                    tracing::warn!(month = %param, "month parameter has no month label");
                }
                value
            }
            _ => None,
        };

        for (index, row) in request.rows.iter().enumerate() {
            let out_row = group.start_row + index;
            for (binding, col) in &bindings {
                let value = row.get(&binding.source_column).unwrap_or(&CellValue::Empty);
                sheet.set(out_row, *col, value);
            }
            for (col, value) in &fixed_values {
                sheet.set(out_row, *col, value);
            }
            if let Some((col, start_from)) = auto_number {
                sheet.set(out_row, col, &CellValue::Integer(start_from + index as i64));
            }
            if let Some((col, source)) = branch {
                if let Some(value) = row.get(source).filter(|value| !value.is_blank()) {
                    sheet.set(out_row, col, value);
                }
            }
            if let Some(col) = month_col {
                let label = match request.month {
                    Month::PerRow(labels) => labels.get(index).filter(|l| !l.is_empty()).cloned(),
                    _ => month_param.clone(),
                };
                if let Some(label) = label {
                    sheet.set(out_row, col, &CellValue::Text(label));
                }
            }
        }
        Ok(())
    }
}
