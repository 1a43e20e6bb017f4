#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Works spreadsheet ingestion front end.
//!
//! Reads tabular exports (CSV files, spreadsheets, published Google Sheets)
//! into [`Table`]s of [`RawRow`]s, then maps each row's unpredictable
//! headers onto the canonical [`dmf_works_models::WorkRecord`] fields via the
//! alias registry in [`columns`].

pub mod columns;
pub mod csv_file;
pub mod google_sheet;
pub mod identity;
pub mod normalize;
pub mod parsing;
pub mod progress;
pub mod retry;
pub mod spreadsheet;

use std::collections::BTreeMap;
use std::path::Path;

/// Errors that reject an input before any row is processed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP status {status}")]
    HttpStatus {
        /// Final status received.
        status: reqwest::StatusCode,
    },

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet could not be opened or read.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Column alias registry could not be parsed.
    #[error("Column registry error: {0}")]
    Registry(#[from] toml::de::Error),

    /// File extension is not a supported tabular format.
    #[error("Unsupported file format: {path}")]
    UnsupportedFormat {
        /// Offending file path.
        path: String,
    },

    /// The source returned a web page instead of tabular data.
    #[error("Expected tabular data but received {content_type} (sheet may not be published or the tab name is wrong)")]
    NotTabular {
        /// Content type (or sniffed kind) of the rejected response.
        content_type: String,
    },

    /// The input has no header row.
    #[error("Input contains no header row")]
    MissingHeader,

    /// Workbook has no worksheet.
    #[error("Workbook contains no worksheets")]
    EmptyWorkbook,

    /// Sheet URL did not contain a spreadsheet id.
    #[error("Invalid sheet URL: {url}")]
    InvalidSheetUrl {
        /// Offending URL.
        url: String,
    },
}

/// Why a single row was left out of a batch. Never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowSkip {
    /// No identifier column produced a usable work code.
    #[error("row {row}: no work code could be derived")]
    MissingWorkCode {
        /// 1-based row number in the source (header is row 1).
        row: u64,
    },

    /// Another row earlier in the batch already carried this code.
    #[error("row {row}: duplicate work code {work_code} in batch")]
    Duplicate {
        /// 1-based row number in the source.
        row: u64,
        /// The repeated code.
        work_code: String,
    },

    /// The row could not be decoded from the source.
    #[error("row {row}: malformed ({message})")]
    Malformed {
        /// 1-based row number in the source.
        row: u64,
        /// Decoder message.
        message: String,
    },
}

/// Cell values treated as "no value" regardless of column.
const PLACEHOLDERS: &[&str] = &["nan", "nat", "none", "null"];

/// Returns `true` for empty cells and the textual placeholders spreadsheet
/// exports write for missing values.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || PLACEHOLDERS.iter().any(|p| v.eq_ignore_ascii_case(p))
}

/// Evaluates candidates in order and returns the first result produced.
///
/// Header aliasing and work-code derivation are both expressed through
/// this.
pub fn first_match<I, T, F>(candidates: I, probe: F) -> Option<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Option<T>,
{
    candidates.into_iter().find_map(probe)
}

/// One source row: trimmed header → raw cell text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    row: u64,
    cells: BTreeMap<String, String>,
}

impl RawRow {
    /// Builds a row from header/value pairs.
    ///
    /// Headers are whitespace-trimmed; when two headers trim to the same
    /// text the first one wins.
    pub fn from_pairs<H, V>(row: u64, pairs: impl IntoIterator<Item = (H, V)>) -> Self
    where
        H: AsRef<str>,
        V: Into<String>,
    {
        let mut cells = BTreeMap::new();
        for (header, value) in pairs {
            let header = header.as_ref().trim_start_matches('\u{feff}').trim();
            if header.is_empty() {
                continue;
            }
            cells.entry(header.to_string()).or_insert_with(|| value.into());
        }
        Self { row, cells }
    }

    /// 1-based source row number (header is row 1).
    #[must_use]
    pub const fn row(&self) -> u64 {
        self.row
    }

    /// Returns the trimmed value under `header`, skipping placeholders.
    #[must_use]
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .get(header.trim())
            .map(|v| v.trim())
            .filter(|v| !is_placeholder(v))
    }

    /// Returns the first usable value among `aliases`, in order.
    #[must_use]
    pub fn first<S: AsRef<str>>(&self, aliases: &[S]) -> Option<&str> {
        first_match(aliases, |alias| self.get(alias.as_ref()))
    }

    /// Returns `true` when every cell is blank or a placeholder.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| is_placeholder(v))
    }
}

/// A decoded input: header names plus one entry per data row.
///
/// Rows that failed to decode are kept as [`RowSkip::Malformed`] so the
/// batch can count them without aborting.
#[derive(Debug, Default)]
pub struct Table {
    /// Trimmed header names in source order.
    pub headers: Vec<String>,
    /// Data rows in source order.
    pub rows: Vec<Result<RawRow, RowSkip>>,
}

impl Table {
    /// Number of data rows, decoded or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a CSV or spreadsheet file, dispatching on its extension.
///
/// # Errors
///
/// Returns [`SourceError::UnsupportedFormat`] for unknown extensions, or a
/// read/parse error from the underlying reader.
pub fn load_file(path: &Path) -> Result<Table, SourceError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => {
            let file = std::fs::File::open(path)?;
            csv_file::read_csv(file)
        }
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => spreadsheet::read_spreadsheet(path),
        _ => Err(SourceError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}
