//! CSV reader for uploaded files and published-sheet exports.

use std::io::Read;

use crate::{RawRow, RowSkip, SourceError, Table};

/// Reads a whole CSV document into a [`Table`].
///
/// Records that cannot be decoded (invalid UTF-8 and the like) are kept as
/// [`RowSkip::Malformed`]; blank rows are dropped. Only I/O failures and a
/// missing header row abort the read.
///
/// # Errors
///
/// Returns [`SourceError::MissingHeader`] if the first row has no usable
/// header, or [`SourceError::Csv`] on an underlying I/O failure.
pub fn read_csv<R: Read>(input: R) -> Result<Table, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_owned())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(SourceError::MissingHeader);
    }

    let mut rows = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let fallback_row = index as u64 + 2;
        match result {
            Ok(record) => {
                let row = record.position().map_or(fallback_row, csv::Position::line);
                let raw = RawRow::from_pairs(
                    row,
                    headers
                        .iter()
                        .enumerate()
                        .map(|(i, h)| (h.as_str(), record.get(i).unwrap_or(""))),
                );
                if !raw.is_blank() {
                    rows.push(Ok(raw));
                }
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let row = e.position().map_or(fallback_row, csv::Position::line);
                log::warn!("Skipping malformed CSV row {row}: {e}");
                rows.push(Err(RowSkip::Malformed {
                    row,
                    message: e.to_string(),
                }));
            }
        }
    }

    log::debug!("Parsed {} CSV rows ({} columns)", rows.len(), headers.len());

    Ok(Table { headers, rows })
}
