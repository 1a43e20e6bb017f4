//! Raw row → canonical [`WorkRecord`].

use dmf_works_models::{Coordinates, WorkRecord};

use crate::RowSkip;
use crate::RawRow;
use crate::columns::ColumnMap;
use crate::identity::resolve_work_code;
use crate::parsing::{
    clean_identifier, normalize_status, parse_coordinate, parse_currency, parse_date, parse_days,
};

/// A row that produced a work code, ready for coordinate resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWork {
    /// Canonical field values. `coordinates` holds the explicit row
    /// coordinates, if any.
    pub record: WorkRecord,
    /// The row's block-level flag column was populated.
    pub block_level_flag: bool,
    /// 1-based source row number.
    pub row: u64,
}

/// Maps one raw row onto the canonical field set.
///
/// # Errors
///
/// Returns [`RowSkip::MissingWorkCode`] if no identifier column yields a
/// code. Field-level problems never fail the row.
pub fn normalize_row(row: &RawRow, columns: &ColumnMap) -> Result<NormalizedWork, RowSkip> {
    let work_code =
        resolve_work_code(row, columns).ok_or(RowSkip::MissingWorkCode { row: row.row() })?;

    let text = |aliases: &[String]| row.first(aliases).map(ToOwned::to_owned);
    let identifier = |aliases: &[String]| {
        row.first(aliases)
            .map(clean_identifier)
            .filter(|v| !v.is_empty())
    };

    let record = WorkRecord {
        work_code,
        department: text(&columns.department),
        financial_year: text(&columns.financial_year),
        block: text(&columns.block),
        panchayat: text(&columns.panchayat),
        work_name: text(&columns.work_name),
        work_name_brief: text(&columns.work_name_brief),
        unique_id: identifier(&columns.unique_id),
        as_number: identifier(&columns.as_number),
        sanctioned_amount: parse_currency(row.first(&columns.sanctioned_amount)),
        sanctioned_date: parse_date(row.first(&columns.sanctioned_date)),
        tender_date: parse_date(row.first(&columns.tender_date)),
        evaluation_amount: parse_currency(row.first(&columns.evaluation_amount)),
        agency_release_details: text(&columns.agency_release_details),
        total_released_amount: parse_currency(row.first(&columns.total_released_amount)),
        amount_pending: parse_currency(row.first(&columns.amount_pending)),
        agency_name: text(&columns.agency_name),
        completion_timelimit_days: parse_days(row.first(&columns.completion_timelimit_days)),
        probable_completion_date: parse_date(row.first(&columns.probable_completion_date)),
        current_status: normalize_status(row.first(&columns.current_status)),
        work_percentage: text(&columns.work_percentage),
        verified_on_ground: text(&columns.verified_on_ground),
        inspection_date: parse_date(row.first(&columns.inspection_date)),
        remark: text(&columns.remark),
        csv_photo_info: text(&columns.csv_photo_info),
        coordinates: Coordinates::from_parts(
            parse_coordinate(row.first(&columns.latitude)),
            parse_coordinate(row.first(&columns.longitude)),
        ),
    };

    Ok(NormalizedWork {
        record,
        block_level_flag: row.first(&columns.block_level).is_some(),
        row: row.row(),
    })
}
