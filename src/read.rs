use crate::value::CellValue;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Input file '{}' does not exist", path.display())]
    NotFound { path: PathBuf },
    #[error("Input file '{}' has unsupported format '{extension}', expected .xlsx, .xls or .csv", path.display())]
    Unsupported { path: PathBuf, extension: String },
    #[error("Could not open workbook at '{}'", path.display())]
    Open {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("Workbook at '{}' does not contain any sheet", path.display())]
    NoSheets { path: PathBuf },
    #[error("Could not read CSV file at '{}'", path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

/// The cells of the first sheet by absolute position, `grid[row][column]`, both 0-based.
/// Rows may have different lengths.
pub type Grid = Vec<Vec<CellValue>>;

#[derive(Debug, Clone)]
pub struct Options {
    /// 1-based row holding the column names.
    pub header_row: usize,
    /// Read the cached results of formulas. If `false`, formula cells yield their formula
    /// text prefixed with `=`.
    pub data_only: bool,
    /// Rows with any value equal to one of these are dropped.
    pub exclude_keywords: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            header_row: 1,
            data_only: true,
            exclude_keywords: Vec::new(),
        }
    }
}

impl From<&crate::config::RuleGroup> for Options {
    fn from(group: &crate::config::RuleGroup) -> Self {
        Options {
            header_row: group.reader.header_row,
            data_only: group.reader.data_only,
            exclude_keywords: group.exclude_keywords.clone(),
        }
    }
}

/// The kinds of files we know how to read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xlsx,
    Xls,
    Csv,
}

impl Format {
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Some(match extension.as_str() {
            "xlsx" => Format::Xlsx,
            "xls" => Format::Xls,
            "csv" => Format::Csv,
            _ => return None,
        })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Xlsx => ".xlsx",
            Format::Xls => ".xls",
            Format::Csv => ".csv",
        }
    }
}

pub(crate) mod function {
    use super::{Error, Format, Grid, Options};
    use crate::value::{CellValue, Row};
    use calamine::{open_workbook_auto, Data, Reader};
    use std::path::Path;

    /// Read the first sheet of the workbook or CSV file at `path` into rows keyed by the names
    /// found in the header row. Rows without any value are skipped, and so are columns without
    /// a name.
    pub fn read_rows(path: &Path, options: &Options) -> Result<Vec<Row>, Error> {
        let grid = read_grid(path, options.data_only)?;
        let header_index = options.header_row.saturating_sub(1);
        let Some(header) = grid.get(header_index) else {
            tracing::warn!(path = %path.display(), header_row = options.header_row, "input has no header row, no data was read");
            return Ok(Vec::new());
        };
        let columns: Vec<(usize, String)> = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_blank())
            .map(|(index, name)| (index, name.to_string().trim().to_owned()))
            .collect();

        let mut rows = Vec::new();
        let mut excluded = 0;
        for cells in grid.iter().skip(header_index + 1) {
            if cells.iter().all(CellValue::is_blank) {
                continue;
            }
            let row: Row = columns
                .iter()
                .map(|(index, name)| {
                    (
                        name.clone(),
                        cells.get(*index).cloned().unwrap_or(CellValue::Empty),
                    )
                })
                .collect();
            if row.values().all(CellValue::is_blank) {
                continue;
            }
            if !options.exclude_keywords.is_empty()
                && row.values().any(|value| {
                    let text = value.to_string();
                    options
                        .exclude_keywords
                        .iter()
                        .any(|keyword| text.trim() == keyword)
                })
            {
                excluded += 1;
                continue;
            }
            rows.push(row);
        }
        tracing::info!(path = %path.display(), rows = rows.len(), excluded, "read input");
        Ok(rows)
    }

    /// Read the first sheet of the file at `path` by position.
    pub fn read_grid(path: &Path, data_only: bool) -> Result<Grid, Error> {
        if !path.exists() {
            return Err(Error::NotFound {
                path: path.to_owned(),
            });
        }
        match Format::from_path(path) {
            Some(Format::Csv) => read_csv(path),
            Some(Format::Xlsx | Format::Xls) => read_workbook(path, data_only),
            None => Err(Error::Unsupported {
                path: path.to_owned(),
                extension: path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
        }
    }

    fn read_workbook(path: &Path, data_only: bool) -> Result<Grid, Error> {
        let open_err = |source| Error::Open {
            path: path.to_owned(),
            source,
        };
        let mut workbook = open_workbook_auto(path).map_err(open_err)?;
        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::NoSheets {
                path: path.to_owned(),
            })?;
        let range = workbook.worksheet_range(&sheet).map_err(open_err)?;

        let mut grid = Grid::new();
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        for (row_offset, row) in range.rows().enumerate() {
            let cells = place(&mut grid, start_row as usize + row_offset);
            for (col_offset, data) in row.iter().enumerate() {
                set(cells, start_col as usize + col_offset, convert(data));
            }
        }

        if !data_only {
            // Formula ranges have their own origin.
            match workbook.worksheet_formula(&sheet) {
                Ok(formulas) => {
                    let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
                    for (row_offset, row) in formulas.rows().enumerate() {
                        for (col_offset, formula) in row.iter().enumerate() {
                            if formula.is_empty() {
                                continue;
                            }
                            let cells = place(&mut grid, start_row as usize + row_offset);
                            set(
                                cells,
                                start_col as usize + col_offset,
                                CellValue::Text(format!("={formula}")),
                            );
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "could not read formulas, using cached values")
                }
            }
        }
        Ok(grid)
    }

    fn place(grid: &mut Grid, row: usize) -> &mut Vec<CellValue> {
        if grid.len() <= row {
            grid.resize_with(row + 1, Vec::new);
        }
        &mut grid[row]
    }

    fn set(cells: &mut Vec<CellValue>, column: usize, value: CellValue) {
        if cells.len() <= column {
            cells.resize(column + 1, CellValue::Empty);
        }
        cells[column] = value;
    }

    fn convert(data: &Data) -> CellValue {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(text) => CellValue::Text(text.clone()),
            Data::Int(n) => CellValue::Integer(*n),
            Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => CellValue::Integer(*n as i64),
            Data::Float(n) => CellValue::Float(*n),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::Error(err) => CellValue::Text(err.to_string()),
            Data::DateTime(date_time) => from_serial(date_time.as_f64()),
            Data::DateTimeIso(text) => parse_iso(text).unwrap_or_else(|| CellValue::Text(text.clone())),
            Data::DurationIso(text) => CellValue::Text(text.clone()),
        }
    }

    /// Serial day numbers count from 1899-12-30, the fraction is the time of day.
    pub(crate) fn from_serial(serial: f64) -> CellValue {
        let epoch = time::macros::datetime!(1899-12-30 0:00);
        let seconds = (serial * 86_400.0).round() as i64;
        match epoch.checked_add(time::Duration::seconds(seconds)) {
            Some(date_time) if date_time.time() == time::Time::MIDNIGHT => {
                CellValue::Date(date_time.date())
            }
            Some(date_time) => CellValue::DateTime(date_time),
            None => CellValue::Float(serial),
        }
    }

    fn parse_iso(text: &str) -> Option<CellValue> {
        let date_time = time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        if let Ok(date_time) = time::PrimitiveDateTime::parse(text, &date_time) {
            return Some(CellValue::DateTime(date_time));
        }
        crate::transform::parse_date(text).map(CellValue::Date)
    }

    fn read_csv(path: &Path) -> Result<Grid, Error> {
        let csv_err = |source| Error::Csv {
            path: path.to_owned(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;
        let mut grid = Grid::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let cells = record
                .iter()
                .enumerate()
                .map(|(index, field)| {
                    let field = if grid.is_empty() && index == 0 {
                        field.trim_start_matches('\u{feff}')
                    } else {
                        field
                    };
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_owned())
                    }
                })
                .collect();
            grid.push(cells);
        }
        Ok(grid)
    }
}
