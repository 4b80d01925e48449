//! Input file loading with format, encoding and delimiter auto-detection.
//!
//! Every input file becomes a text-typed [`Table`]: cells are kept as the
//! strings they were written as, with no numeric or date coercion. Workbooks
//! (`.xlsx`, `.xls`, `.ods`) are recognised by their container signature and
//! read from their first worksheet; everything else is treated as delimited
//! text.

use calamine::{open_workbook_auto_from_rs, DataType, Reader};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::models::Table;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Text form of workbook date cells.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a loaded file was interpreted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceFormat {
    Csv { encoding: String, delimiter: char },
    Excel { sheet: String },
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Csv { encoding, delimiter: '\t' } => write!(f, "csv ({}, tab)", encoding),
            SourceFormat::Csv { encoding, delimiter } => {
                write!(f, "csv ({}, '{}')", encoding, delimiter)
            }
            SourceFormat::Excel { sheet } => write!(f, "workbook (sheet {})", sheet),
        }
    }
}

/// A loaded table with its detection metadata.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    pub format: SourceFormat,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
///
/// Unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        // Windows-1252 agrees with Latin-1 on every printable byte
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Load a file from disk, auto-detecting its format.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> LoadResult<LoadedTable> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Load raw bytes, auto-detecting workbook vs delimited text.
pub fn parse_bytes_auto(bytes: &[u8]) -> LoadResult<LoadedTable> {
    if bytes.is_empty() {
        return Err(LoadError::EmptyFile);
    }

    if bytes.starts_with(ZIP_SIGNATURE) || bytes.starts_with(OLE_SIGNATURE) {
        return parse_workbook(bytes);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let table = parse_delimited(&content, delimiter)?;

    Ok(LoadedTable {
        table,
        format: SourceFormat::Csv {
            encoding,
            delimiter,
        },
    })
}

/// Parse delimited text with an explicit delimiter.
///
/// Quoting is honoured, short rows are padded, extra cells dropped and
/// rows with no content skipped.
pub fn parse_delimited(content: &str, delimiter: char) -> LoadResult<Table> {
    if content.trim().is_empty() {
        return Err(LoadError::EmptyFile);
    }

    let delimiter = u8::try_from(delimiter)
        .map_err(|_| LoadError::Encoding(format!("unsupported delimiter '{}'", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(clean_cell).collect();
    let headers = unique_headers(headers)?;

    let mut table = Table::new(headers);
    for record in reader.records() {
        let record = record?;
        let row: Vec<String> = record.iter().map(clean_cell).collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        table.push_row(row);
    }

    Ok(table)
}

fn parse_workbook(bytes: &[u8]) -> LoadResult<LoadedTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| LoadError::Workbook(e.to_string()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(LoadError::NoSheet)?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LoadError::NoSheet)?
        .map_err(|e| LoadError::Workbook(e.to_string()))?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or(LoadError::EmptyFile)?;
    let headers = unique_headers(header_row.iter().map(cell_text).collect())?;

    let mut table = Table::new(headers);
    for cells in rows {
        let row: Vec<String> = cells.iter().map(cell_text).collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        table.push_row(row);
    }

    Ok(LoadedTable {
        table,
        format: SourceFormat::Excel { sheet },
    })
}

/// Render a workbook cell as the text a user typed.
fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty | DataType::Error(_) => String::new(),
        DataType::String(s) => clean_cell(s),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(_) => match cell.as_datetime() {
            Some(dt) => dt.format(DATETIME_FORMAT).to_string(),
            None => clean_cell(&cell.to_string()),
        },
        DataType::DateTimeIso(s) | DataType::DurationIso(s) => clean_cell(s),
        other => clean_cell(&other.to_string()),
    }
}

fn clean_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').trim().to_string()
}

/// Name blank headers by position and suffix repeated ones (`x`, `x.1`).
fn unique_headers(raw: Vec<String>) -> LoadResult<Vec<String>> {
    if raw.iter().all(String::is_empty) {
        return Err(LoadError::NoHeaders);
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let headers = raw
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.is_empty() {
                format!("column{}", i + 1)
            } else {
                name
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let unique = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            unique
        })
        .collect();

    Ok(headers)
}
