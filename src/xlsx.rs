//! Editing the first worksheet of an `.xlsx` template without touching anything else.
//!
//! Every part of the package is copied verbatim, except the first worksheet which is
//! re-serialized, and the calculation chain which is dropped so spreadsheet applications
//! rebuild it. Within the worksheet, rows and cells are kept as raw XML unless they are
//! written to, so styles and formulas of untouched cells survive unchanged.
//!
//! Formulas referencing shifted rows are not rewritten.

use crate::column::{index_to_letters, letters_to_index};
use crate::value::CellValue;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not access '{}'", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'{}' is not a valid xlsx package", path.display())]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("Could not parse '{part}'")]
    Xml {
        part: String,
        source: quick_xml::Error,
    },
    #[error("The package part '{part}' is missing")]
    MissingPart { part: String },
    #[error("The workbook does not declare any worksheet")]
    NoWorksheet,
    #[error("Worksheet '{part}' has no sheetData element")]
    MissingSheetData { part: String },
}

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const CALC_CHAIN: &str = "xl/calcChain.xml";
const CONTENT_TYPES: &str = "[Content_Types].xml";

type Attrs = Vec<(String, String)>;

#[derive(Debug, Clone, Default)]
struct Cell {
    attrs: Attrs,
    /// Everything between `<c …>` and `</c>`, as found in the file or as written.
    inner: String,
}

#[derive(Debug, Clone, Default)]
struct SheetRow {
    attrs: Attrs,
    cells: BTreeMap<u32, Cell>,
}

/// An inclusive cell range as used by merged cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Area {
    first_col: u32,
    first_row: u32,
    last_col: u32,
    last_row: u32,
}

/// The first worksheet of a template, ready to be edited and saved to a new path.
#[derive(Debug)]
pub struct Workbook {
    path: PathBuf,
    package: Vec<u8>,
    sheet_part: String,
    shared_strings: Vec<String>,
    head: String,
    rows: BTreeMap<u32, SheetRow>,
    /// Worksheet XML after the sheet data, split where merged cells go.
    tail: (String, String),
    merges: Option<Vec<Area>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let package = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(&package)).map_err(|source| {
            Error::Zip {
                path: path.to_owned(),
                source,
            }
        })?;

        let workbook = read_part(&mut archive, path, WORKBOOK)?
            .ok_or_else(|| Error::MissingPart {
                part: WORKBOOK.into(),
            })?;
        let rels = read_part(&mut archive, path, WORKBOOK_RELS)?.unwrap_or_default();
        let sheet_part = first_worksheet(&workbook, &rels)?;
        let sheet = read_part(&mut archive, path, &sheet_part)?.ok_or_else(|| Error::MissingPart {
            part: sheet_part.clone(),
        })?;
        let shared_strings = match read_part(&mut archive, path, SHARED_STRINGS)? {
            Some(xml) => parse_shared_strings(&xml).map_err(|source| Error::Xml {
                part: SHARED_STRINGS.into(),
                source,
            })?,
            None => Vec::new(),
        };

        let (head, body, tail) = split_sheet_data(&sheet).ok_or_else(|| Error::MissingSheetData {
            part: sheet_part.clone(),
        })?;
        let rows = parse_rows(body).map_err(|source| Error::Xml {
            part: sheet_part.clone(),
            source,
        })?;
        let (tail, merges) = split_merges(tail);
        tracing::debug!(template = %path.display(), %sheet_part, rows = rows.len(), "opened xlsx template");

        Ok(Workbook {
            path: path.to_owned(),
            package,
            sheet_part,
            shared_strings,
            head: head.to_owned(),
            rows,
            tail,
            merges,
        })
    }

    /// The rightmost column holding a cell, 1-based, or 0 for an empty sheet.
    pub fn max_column(&self) -> usize {
        self.rows
            .values()
            .filter_map(|row| row.cells.keys().next_back())
            .max()
            .map_or(0, |col| *col as usize)
    }

    /// The bottom row holding any row element, 1-based, or 0.
    pub fn max_row(&self) -> usize {
        self.rows.keys().next_back().map_or(0, |row| *row as usize)
    }

    /// The displayed text of a cell, if it has a value.
    pub fn cell_text(&self, row: usize, col: usize) -> Option<String> {
        let cell = self.rows.get(&(row as u32))?.cells.get(&(col as u32))?;
        let kind = attr(&cell.attrs, "t");
        let text = match kind {
            Some("inlineStr") => element_texts(&cell.inner, "t").join(""),
            Some("s") => {
                let index: usize = element_texts(&cell.inner, "v").first()?.trim().parse().ok()?;
                self.shared_strings.get(index)?.clone()
            }
            Some("b") => match element_texts(&cell.inner, "v").first()?.trim() {
                "1" => "TRUE".into(),
                _ => "FALSE".into(),
            },
            _ => element_texts(&cell.inner, "v").into_iter().next()?,
        };
        Some(text)
    }

    /// Remove all rows from `first_row` downwards, together with merged cells starting there.
    pub fn delete_rows_from(&mut self, first_row: usize) {
        let first_row = first_row as u32;
        let removed = self.rows.split_off(&first_row).len();
        if let Some(merges) = &mut self.merges {
            merges.retain(|area| area.first_row < first_row);
            for area in merges.iter_mut() {
                area.last_row = area.last_row.min(first_row.saturating_sub(1));
            }
        }
        tracing::debug!(first_row, removed, "deleted template rows");
    }

    /// Remove the values of all cells in `rows`, keeping the cells and their styles.
    pub fn clear_values(&mut self, rows: std::ops::RangeInclusive<usize>) {
        let rows = (*rows.start() as u32)..=(*rows.end() as u32);
        for (_, row) in self.rows.range_mut(rows) {
            for cell in row.cells.values_mut() {
                remove_attr(&mut cell.attrs, "t");
                cell.inner.clear();
            }
        }
    }

    /// Insert `count` empty rows before `at`, moving that row and everything below it down.
    pub fn insert_rows(&mut self, at: usize, count: usize) {
        if count == 0 {
            return;
        }
        let (at, count) = (at as u32, count as u32);
        let moved = self.rows.split_off(&at);
        self.rows
            .extend(moved.into_iter().map(|(row, data)| (row + count, data)));
        if let Some(merges) = &mut self.merges {
            for area in merges.iter_mut() {
                if area.first_row >= at {
                    area.first_row += count;
                    area.last_row += count;
                } else if area.last_row >= at {
                    area.last_row += count;
                }
            }
        }
        tracing::debug!(at, count, "inserted template rows");
    }

    /// Write `value` into the cell at 1-based `row` and `col`, keeping its style.
    pub fn set_value(&mut self, row: usize, col: usize, value: &CellValue) {
        let cell = self
            .rows
            .entry(row as u32)
            .or_default()
            .cells
            .entry(col as u32)
            .or_default();
        remove_attr(&mut cell.attrs, "t");
        cell.inner = match value {
            CellValue::Empty => String::new(),
            CellValue::Integer(n) => format!("<v>{n}</v>"),
            CellValue::Float(n) if n.is_finite() => format!("<v>{n}</v>"),
            CellValue::Decimal(n) => format!("<v>{}</v>", n.normalize()),
            CellValue::Bool(b) => {
                cell.attrs.push(("t".into(), "b".into()));
                format!("<v>{}</v>", u8::from(*b))
            }
            other => {
                cell.attrs.push(("t".into(), "inlineStr".into()));
                format!(
                    r#"<is><t xml:space="preserve">{}</t></is>"#,
                    quick_xml::escape::escape(other.to_string().as_str())
                )
            }
        };
    }

    fn sheet_xml(&self) -> String {
        let mut xml = String::with_capacity(self.head.len() + self.tail.0.len() + self.tail.1.len());
        xml.push_str(&update_dimension(&self.head, self.dimension()));
        xml.push_str("<sheetData>");
        for (row_index, row) in &self.rows {
            xml.push_str(&format!(r#"<row r="{row_index}""#));
            push_attrs(&mut xml, &row.attrs, &["r", "spans"]);
            if row.cells.is_empty() {
                xml.push_str("/>");
                continue;
            }
            xml.push('>');
            for (col_index, cell) in &row.cells {
                xml.push_str(&format!(r#"<c r="{}{row_index}""#, index_to_letters(*col_index as usize)));
                push_attrs(&mut xml, &cell.attrs, &["r"]);
                if cell.inner.is_empty() {
                    xml.push_str("/>");
                } else {
                    xml.push('>');
                    xml.push_str(&cell.inner);
                    xml.push_str("</c>");
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
        xml.push_str(&self.tail.0);
        if let Some(merges) = self.merges.as_ref().filter(|merges| !merges.is_empty()) {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, merges.len()));
            for area in merges {
                xml.push_str(&format!(r#"<mergeCell ref="{}"/>"#, area_ref(area)));
            }
            xml.push_str("</mergeCells>");
        }
        xml.push_str(&self.tail.1);
        xml
    }

    fn dimension(&self) -> String {
        let mut bounds: Option<Area> = None;
        for (row, data) in &self.rows {
            let (Some(first), Some(last)) = (data.cells.keys().next(), data.cells.keys().next_back()) else {
                continue;
            };
            let area = bounds.get_or_insert(Area {
                first_col: *first,
                first_row: *row,
                last_col: *last,
                last_row: *row,
            });
            area.first_col = area.first_col.min(*first);
            area.last_col = area.last_col.max(*last);
            area.last_row = *row;
        }
        bounds.map_or_else(|| "A1".to_string(), |area| area_ref(&area))
    }

    /// Write the edited workbook to `path`. The template itself is never modified.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let zip_err = |source| Error::Zip {
            path: self.path.clone(),
            source,
        };
        let io_err = |source| Error::Io {
            path: path.to_owned(),
            source,
        };
        let mut archive =
            zip::ZipArchive::new(std::io::Cursor::new(&self.package)).map_err(zip_err)?;
        let has_calc_chain = archive.index_for_name(CALC_CHAIN).is_some();
        let file = std::fs::File::create(path).map_err(io_err)?;
        let mut out = zip::ZipWriter::new(std::io::BufWriter::new(file));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for index in 0..archive.len() {
            let name = archive.by_index_raw(index).map_err(zip_err)?.name().to_owned();
            let rewritten = if name == self.sheet_part {
                Some(self.sheet_xml())
            } else if name == CALC_CHAIN {
                continue;
            } else if has_calc_chain && (name == CONTENT_TYPES || name == WORKBOOK_RELS) {
                let mut xml = String::new();
                archive
                    .by_index(index)
                    .map_err(zip_err)?
                    .read_to_string(&mut xml)
                    .map_err(io_err)?;
                Some(without_calc_chain(&xml))
            } else {
                None
            };
            match rewritten {
                Some(xml) => {
                    out.start_file(name, options).map_err(zip_err)?;
                    out.write_all(xml.as_bytes()).map_err(io_err)?;
                }
                None => out
                    .raw_copy_file(archive.by_index_raw(index).map_err(zip_err)?)
                    .map_err(zip_err)?,
            }
        }
        out.finish()
            .map_err(zip_err)?
            .flush()
            .map_err(io_err)?;
        tracing::debug!(output = %path.display(), "saved xlsx workbook");
        Ok(())
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &Path,
    part: &str,
) -> Result<Option<String>, Error> {
    let mut file = match archive.by_name(part) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(source) => {
            return Err(Error::Zip {
                path: path.to_owned(),
                source,
            })
        }
    };
    let mut content = String::new();
    file.read_to_string(&mut content).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(Some(content))
}

fn collect_attrs(e: &BytesStart<'_>) -> Attrs {
    e.attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&a.value).into_owned(),
            )
        })
        .collect()
}

fn attr<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find_map(|(k, v)| (k == key).then_some(v.as_str()))
}

fn remove_attr(attrs: &mut Attrs, key: &str) {
    attrs.retain(|(k, _)| k != key);
}

fn push_attrs(xml: &mut String, attrs: &Attrs, skip: &[&str]) {
    for (key, value) in attrs {
        if skip.contains(&key.as_str()) {
            continue;
        }
        // values are kept escaped as read
        xml.push_str(&format!(r#" {key}="{}""#, value.replace('"', "&quot;")));
    }
}

/// Resolve the part name of the first `<sheet>` of the workbook through its relationships.
fn first_worksheet(workbook: &str, rels: &str) -> Result<String, Error> {
    let xml_err = |part: &str| {
        let part = part.to_owned();
        move |source| Error::Xml { part, source }
    };
    let mut rid = None;
    let mut reader = quick_xml::Reader::from_str(workbook);
    loop {
        match reader.read_event().map_err(xml_err(WORKBOOK))? {
            Event::Empty(ref e) | Event::Start(ref e) if e.name().as_ref() == b"sheet" => {
                rid = attr(&collect_attrs(e), "r:id").map(ToOwned::to_owned);
                break;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    let rid = rid.ok_or(Error::NoWorksheet)?;

    let mut reader = quick_xml::Reader::from_str(rels);
    loop {
        match reader.read_event().map_err(xml_err(WORKBOOK_RELS))? {
            Event::Empty(ref e) | Event::Start(ref e) if e.name().as_ref() == b"Relationship" => {
                let attrs = collect_attrs(e);
                if attr(&attrs, "Id") == Some(rid.as_str()) {
                    let target = attr(&attrs, "Target").ok_or(Error::NoWorksheet)?;
                    return Ok(match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_owned(),
                        None => format!("xl/{target}"),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(Error::NoWorksheet)
}

/// The unescaped text content of every `<name>` element in `xml`, skipping phonetic runs.
fn element_texts(xml: &str, name: &str) -> Vec<String> {
    let mut texts = Vec::new();
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut phonetic = 0usize;
    let mut start = None;
    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"rPh" => phonetic += 1,
            Ok(Event::End(e)) if e.name().as_ref() == b"rPh" => phonetic = phonetic.saturating_sub(1),
            Ok(Event::Start(e)) if e.name().as_ref() == name.as_bytes() && phonetic == 0 => {
                start = Some(reader.buffer_position() as usize);
            }
            Ok(Event::End(e)) if e.name().as_ref() == name.as_bytes() => {
                if let Some(start) = start.take() {
                    let raw = &xml[start..before];
                    texts.push(
                        quick_xml::escape::unescape(raw)
                            .map(|text| text.into_owned())
                            .unwrap_or_else(|_| raw.to_owned()),
                    );
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == name.as_bytes() && phonetic == 0 => {
                texts.push(String::new())
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }
    texts
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut start = None;
    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"si" => {
                start = Some(reader.buffer_position() as usize)
            }
            Event::Empty(e) if e.name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) if e.name().as_ref() == b"si" => {
                if let Some(start) = start.take() {
                    strings.push(element_texts(&xml[start..before], "t").join(""));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// Split a worksheet into the XML before `<sheetData>`, its content, and the XML after it.
fn split_sheet_data(xml: &str) -> Option<(&str, &str, &str)> {
    let open = xml.find("<sheetData")?;
    let open_end = open + xml[open..].find('>')?;
    if xml[..open_end].ends_with('/') {
        return Some((&xml[..open], "", &xml[open_end + 1..]));
    }
    const CLOSE: &str = "</sheetData>";
    let close = open_end + xml[open_end..].find(CLOSE)?;
    Some((&xml[..open], &xml[open_end + 1..close], &xml[close + CLOSE.len()..]))
}

fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let col = letters_to_index(&reference[..split])?;
    let row = reference[split..].parse().ok()?;
    Some((u32::try_from(col).ok()?, row))
}

fn parse_rows(body: &str) -> Result<BTreeMap<u32, SheetRow>, quick_xml::Error> {
    let mut rows = BTreeMap::new();
    let mut reader = quick_xml::Reader::from_str(body);
    let mut last_row = 0u32;
    let mut current: Option<(u32, SheetRow)> = None;
    let mut last_col = 0u32;
    let mut open_cell: Option<(u32, Attrs, usize)> = None;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(ref e) if e.name().as_ref() == b"row" => {
                let (index, row) = new_row(e, last_row);
                last_row = index;
                last_col = 0;
                current = Some((index, row));
            }
            Event::Empty(ref e) if e.name().as_ref() == b"row" => {
                let (index, row) = new_row(e, last_row);
                last_row = index;
                rows.insert(index, row);
            }
            Event::End(ref e) if e.name().as_ref() == b"row" => {
                if let Some((index, row)) = current.take() {
                    rows.insert(index, row);
                }
            }
            Event::Start(ref e) if e.name().as_ref() == b"c" => {
                let attrs = collect_attrs(e);
                let col = cell_column(&attrs, last_col);
                last_col = col;
                open_cell = Some((col, attrs, reader.buffer_position() as usize));
            }
            Event::Empty(ref e) if e.name().as_ref() == b"c" => {
                let attrs = collect_attrs(e);
                let col = cell_column(&attrs, last_col);
                last_col = col;
                if let Some((_, row)) = &mut current {
                    row.cells.insert(
                        col,
                        Cell {
                            attrs,
                            inner: String::new(),
                        },
                    );
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"c" => {
                if let (Some((col, attrs, start)), Some((_, row))) = (open_cell.take(), &mut current) {
                    row.cells.insert(
                        col,
                        Cell {
                            attrs,
                            inner: body[start..before].to_owned(),
                        },
                    );
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

fn new_row(e: &BytesStart<'_>, last_row: u32) -> (u32, SheetRow) {
    let attrs = collect_attrs(e);
    let index = attr(&attrs, "r")
        .and_then(|r| r.parse().ok())
        .unwrap_or(last_row + 1);
    (
        index,
        SheetRow {
            attrs,
            cells: BTreeMap::new(),
        },
    )
}

fn cell_column(attrs: &Attrs, last_col: u32) -> u32 {
    attr(attrs, "r")
        .and_then(parse_cell_ref)
        .map_or(last_col + 1, |(col, _)| col)
}

fn parse_area(reference: &str) -> Option<Area> {
    let (first, last) = reference.split_once(':').unwrap_or((reference, reference));
    let (first_col, first_row) = parse_cell_ref(first)?;
    let (last_col, last_row) = parse_cell_ref(last)?;
    Some(Area {
        first_col,
        first_row,
        last_col,
        last_row,
    })
}

fn area_ref(area: &Area) -> String {
    let first = format!("{}{}", index_to_letters(area.first_col as usize), area.first_row);
    let last = format!("{}{}", index_to_letters(area.last_col as usize), area.last_row);
    if first == last {
        first
    } else {
        format!("{first}:{last}")
    }
}

/// Take the `<mergeCells>` block out of the worksheet tail.
fn split_merges(tail: &str) -> ((String, String), Option<Vec<Area>>) {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    static AREA: OnceLock<Regex> = OnceLock::new();
    let block = BLOCK.get_or_init(|| {
        Regex::new(r"(?s)<mergeCells\b[^>]*?(?:/>|>.*?</mergeCells>)").expect("valid regex")
    });
    let Some(block) = block.find(tail) else {
        return ((tail.to_owned(), String::new()), None);
    };
    let areas = AREA
        .get_or_init(|| Regex::new(r#"<mergeCell\s+ref="([^"]+)""#).expect("valid regex"))
        .captures_iter(block.as_str())
        .filter_map(|caps| parse_area(&caps[1]))
        .collect();
    (
        (
            tail[..block.start()].to_owned(),
            tail[block.end()..].to_owned(),
        ),
        Some(areas),
    )
}

fn update_dimension(head: &str, dimension: String) -> String {
    static DIMENSION: OnceLock<Regex> = OnceLock::new();
    DIMENSION
        .get_or_init(|| Regex::new(r#"<dimension\s+ref="[^"]*""#).expect("valid regex"))
        .replace(head, format!(r#"<dimension ref="{dimension}""#).as_str())
        .into_owned()
}

fn without_calc_chain(xml: &str) -> String {
    static CALC_CHAIN_REF: OnceLock<Regex> = OnceLock::new();
    CALC_CHAIN_REF
        .get_or_init(|| {
            Regex::new(r#"<(?:Override|Relationship)\b[^>]*(?:PartName|Target)="[^"]*calcChain\.xml"[^>]*/>"#)
                .expect("valid regex")
        })
        .replace_all(xml, "")
        .into_owned()
}
