//! Batch input readers.
//!
//! CSV: header row, configurable delimiter, UTF-8 BOM stripped, every cell a
//! string. JSONL: one object per line, blank lines ignored, nested objects
//! flattened to dotted paths. Line numbers are 1-based file lines so failures
//! point back into the source file.

use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ImportError, ImportResult};
use crate::normalize::InputRow;
use crate::record::CanonicalRecord;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Input file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    #[default]
    Csv,
    Jsonl,
}

impl InputFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "jsonl" | "ndjson" | "json" => Ok(Self::Jsonl),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl FromStr for InputFormat {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// CSV field delimiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CsvDelimiter {
    #[default]
    Comma,
    /// Common in European spreadsheet exports.
    Semicolon,
    Tab,
    Pipe,
}

impl CsvDelimiter {
    #[must_use]
    pub fn as_byte(&self) -> u8 {
        match self {
            CsvDelimiter::Comma => b',',
            CsvDelimiter::Semicolon => b';',
            CsvDelimiter::Tab => b'\t',
            CsvDelimiter::Pipe => b'|',
        }
    }
}

impl CsvDelimiter {
    /// Delimiter implied by the file extension: tab for `.tsv`, else comma.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => CsvDelimiter::Tab,
            _ => CsvDelimiter::Comma,
        }
    }
}

impl FromStr for CsvDelimiter {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "," | "comma" => Ok(CsvDelimiter::Comma),
            ";" | "semicolon" => Ok(CsvDelimiter::Semicolon),
            "\t" | "tab" | "\\t" => Ok(CsvDelimiter::Tab),
            "|" | "pipe" => Ok(CsvDelimiter::Pipe),
            _ => Err(ImportError::InvalidConfig(format!(
                "invalid delimiter '{s}', expected one of ',', ';', '\\t', '|'"
            ))),
        }
    }
}

/// Read every row of `path`.
pub fn read_rows(path: &Path, format: InputFormat, delimiter: CsvDelimiter) -> ImportResult<Vec<InputRow>> {
    let data = std::fs::read(path)?;
    match format {
        InputFormat::Csv => parse_csv(&data, delimiter),
        InputFormat::Jsonl => parse_jsonl(&data),
    }
}

fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// Parse CSV bytes. The header row is line 1, so the first record is line 2
/// unless the header itself spans lines.
pub fn parse_csv(data: &[u8], delimiter: CsvDelimiter) -> ImportResult<Vec<InputRow>> {
    let data = strip_utf8_bom(data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter.as_byte())
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(ImportError::Input {
            line: 1,
            message: "missing header row".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        // Quoted cells may span lines, so ask the reader where the record began.
        let record = record.map_err(|e| ImportError::Input {
            line: e.position().map_or(idx + 2, start_line),
            message: e.to_string(),
        })?;
        let line = record.position().map_or(idx + 2, start_line);

        let mut row = InputRow::new(line);
        for (header, cell) in headers.iter().zip(record.iter()) {
            if header.is_empty() {
                continue;
            }
            row.cells
                .insert(header.clone(), Value::String(cell.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn start_line(position: &csv::Position) -> usize {
    usize::try_from(position.line()).unwrap_or(usize::MAX)
}

/// Parse JSON Lines bytes.
pub fn parse_jsonl(data: &[u8]) -> ImportResult<Vec<InputRow>> {
    let text = std::str::from_utf8(strip_utf8_bom(data)).map_err(|e| ImportError::Input {
        line: 1,
        message: format!("input is not valid UTF-8: {e}"),
    })?;

    let mut rows = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(raw).map_err(|e| ImportError::Input {
            line,
            message: format!("invalid JSON: {e}"),
        })?;
        if !value.is_object() {
            return Err(ImportError::Input {
                line,
                message: "expected a JSON object".to_string(),
            });
        }

        let mut row = InputRow::new(line);
        row.cells = CanonicalRecord::flatten(&value)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
