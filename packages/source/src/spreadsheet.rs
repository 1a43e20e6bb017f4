//! Spreadsheet reader (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`).
//!
//! Only the first worksheet is read and its first row is the header, which
//! matches how the works office exports its tracker.

use std::path::Path;

use calamine::{Data, Reader as _, open_workbook_auto};
use chrono::{NaiveDate, TimeDelta};

use crate::{RawRow, SourceError, Table};

/// Serial day zero of the 1900 date system, after the Lotus leap-year bug.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Reads the first worksheet of a workbook into a [`Table`].
///
/// # Errors
///
/// Returns [`SourceError::Spreadsheet`] if the workbook cannot be opened,
/// [`SourceError::EmptyWorkbook`] if it has no worksheet, or
/// [`SourceError::MissingHeader`] if the sheet is empty.
pub fn read_spreadsheet(path: &Path) -> Result<Table, SourceError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SourceError::EmptyWorkbook)??;

    let first_row = range.start().map_or(0, |(row, _)| u64::from(row));
    let mut rows_iter = range.rows();

    let headers: Vec<String> = rows_iter
        .next()
        .ok_or(SourceError::MissingHeader)?
        .iter()
        .map(|cell| cell_text(cell).trim().to_owned())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(SourceError::MissingHeader);
    }

    let rows: Vec<_> = rows_iter
        .enumerate()
        .map(|(index, cells)| {
            RawRow::from_pairs(
                first_row + index as u64 + 2,
                headers
                    .iter()
                    .zip(cells.iter().map(cell_text))
                    .map(|(h, v)| (h.as_str(), v)),
            )
        })
        .filter(|row| !row.is_blank())
        .map(Ok)
        .collect();

    log::info!(
        "Read {} rows from {} ({} columns)",
        rows.len(),
        path.display(),
        headers.len()
    );

    Ok(Table { headers, rows })
}

/// Renders a cell as the text a CSV export of the same sheet would carry.
///
/// Date cells become `YYYY-MM-DD`; error cells become empty.
#[must_use]
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => serial_to_date(dt.as_f64())
            .map_or_else(|| dt.as_f64().to_string(), |d| d.format("%Y-%m-%d").to_string()),
    }
}

/// Converts a 1900-system serial day number to a calendar date.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    #[allow(clippy::cast_possible_truncation)]
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}
