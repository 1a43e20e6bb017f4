//! `DuckDB` works store.
//!
//! One file (default `data/dmf_works.duckdb`) holds the `works` table and a
//! `system_metadata` key/value table. The workflow columns
//! (`assigned_officer`, `assignment_status`, `inspection_deadline`,
//! `admin_remarks`) are created here but only ever written by the
//! assignment workflow.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use dmf_works_models::{
    AssignmentStatus, Coordinates, ExistingWork, StoredWork, WorkRecord, WorkUpdate, WriteBatch,
};
use duckdb::{Connection, ToSql};

use crate::{DbError, LAST_SYNC_KEY, MissingLocation, WorkStore};

/// Ingested columns other than `work_code` and the coordinates, in bind
/// order.
const FIELD_COLUMNS: &[&str] = &[
    "department",
    "financial_year",
    "block",
    "panchayat",
    "work_name",
    "work_name_brief",
    "unique_id",
    "as_number",
    "sanctioned_amount",
    "sanctioned_date",
    "tender_date",
    "evaluation_amount",
    "agency_release_details",
    "total_released_amount",
    "amount_pending",
    "agency_name",
    "completion_timelimit_days",
    "probable_completion_date",
    "current_status",
    "work_percentage",
    "verified_on_ground",
    "inspection_date",
    "remark",
    "csv_photo_info",
];

const SELECT_WORK: &str = "SELECT id, work_code, department, financial_year, block, panchayat,
        work_name, work_name_brief, unique_id, as_number, sanctioned_amount,
        CAST(sanctioned_date AS VARCHAR), CAST(tender_date AS VARCHAR),
        evaluation_amount, agency_release_details, total_released_amount,
        amount_pending, agency_name, completion_timelimit_days,
        CAST(probable_completion_date AS VARCHAR), current_status,
        work_percentage, verified_on_ground, CAST(inspection_date AS VARCHAR),
        remark, csv_photo_info, latitude, longitude, assignment_status
    FROM works";

/// Works store backed by a `DuckDB` connection.
pub struct DuckDbWorkStore {
    conn: Connection,
}

impl DuckDbWorkStore {
    /// Opens (or creates) the store file and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        crate::paths::ensure_parent(path)?;
        let conn = Connection::open(path)?;
        create_schema(&conn)?;
        log::debug!("Opened works store at {}", path.display());
        Ok(Self { conn })
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS works_id_seq START 1;

        CREATE TABLE IF NOT EXISTS works (
            id BIGINT PRIMARY KEY DEFAULT nextval('works_id_seq'),
            work_code TEXT NOT NULL UNIQUE,
            department TEXT,
            financial_year TEXT,
            block TEXT,
            panchayat TEXT,
            work_name TEXT,
            work_name_brief TEXT,
            unique_id TEXT,
            as_number TEXT,
            sanctioned_amount DOUBLE NOT NULL DEFAULT 0,
            sanctioned_date DATE,
            tender_date DATE,
            evaluation_amount DOUBLE NOT NULL DEFAULT 0,
            agency_release_details TEXT,
            total_released_amount DOUBLE NOT NULL DEFAULT 0,
            amount_pending DOUBLE NOT NULL DEFAULT 0,
            agency_name TEXT,
            completion_timelimit_days BIGINT NOT NULL DEFAULT 0,
            probable_completion_date DATE,
            current_status TEXT NOT NULL DEFAULT 'Not Started',
            work_percentage TEXT,
            verified_on_ground TEXT,
            inspection_date DATE,
            remark TEXT,
            csv_photo_info TEXT,
            latitude DOUBLE,
            longitude DOUBLE,
            assigned_officer TEXT,
            assignment_status TEXT NOT NULL DEFAULT 'Pending',
            inspection_deadline DATE,
            admin_remarks TEXT,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS system_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

fn insert_sql() -> String {
    let columns = FIELD_COLUMNS.join(", ");
    let placeholders = vec!["?"; FIELD_COLUMNS.len() + 3].join(", ");
    format!("INSERT INTO works (work_code, {columns}, latitude, longitude) VALUES ({placeholders})")
}

fn update_sql(with_coordinates: bool) -> String {
    let mut assignments: Vec<String> = FIELD_COLUMNS.iter().map(|c| format!("{c} = ?")).collect();
    if with_coordinates {
        assignments.push("latitude = ?".to_string());
        assignments.push("longitude = ?".to_string());
    }
    format!(
        "UPDATE works SET {}, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        assignments.join(", ")
    )
}

/// Dates rendered as `YYYY-MM-DD` text for binding.
struct DateText {
    sanctioned: Option<String>,
    tender: Option<String>,
    probable_completion: Option<String>,
    inspection: Option<String>,
}

impl DateText {
    fn of(record: &WorkRecord) -> Self {
        let fmt = |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string());
        Self {
            sanctioned: fmt(record.sanctioned_date),
            tender: fmt(record.tender_date),
            probable_completion: fmt(record.probable_completion_date),
            inspection: fmt(record.inspection_date),
        }
    }
}

/// Parameters for [`FIELD_COLUMNS`], in order.
fn field_params<'a>(record: &'a WorkRecord, dates: &'a DateText) -> Vec<&'a dyn ToSql> {
    let params: [&'a dyn ToSql; 24] = [
        &record.department,
        &record.financial_year,
        &record.block,
        &record.panchayat,
        &record.work_name,
        &record.work_name_brief,
        &record.unique_id,
        &record.as_number,
        &record.sanctioned_amount,
        &dates.sanctioned,
        &dates.tender,
        &record.evaluation_amount,
        &record.agency_release_details,
        &record.total_released_amount,
        &record.amount_pending,
        &record.agency_name,
        &record.completion_timelimit_days,
        &dates.probable_completion,
        &record.current_status,
        &record.work_percentage,
        &record.verified_on_ground,
        &dates.inspection,
        &record.remark,
        &record.csv_photo_info,
    ];
    params.to_vec()
}

fn split(coordinates: Option<Coordinates>) -> (Option<f64>, Option<f64>) {
    coordinates.map_or((None, None), |c| (Some(c.latitude), Some(c.longitude)))
}

fn parse_date_text(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn stored_work_from_row(row: &duckdb::Row<'_>) -> Result<StoredWork, duckdb::Error> {
    let status: String = row.get(28)?;
    let assignment_status = status.parse::<AssignmentStatus>().unwrap_or_else(|_| {
        log::warn!("Unknown assignment status {status:?}, treating as pending");
        AssignmentStatus::default()
    });

    let record = WorkRecord {
        work_code: row.get(1)?,
        department: row.get(2)?,
        financial_year: row.get(3)?,
        block: row.get(4)?,
        panchayat: row.get(5)?,
        work_name: row.get(6)?,
        work_name_brief: row.get(7)?,
        unique_id: row.get(8)?,
        as_number: row.get(9)?,
        sanctioned_amount: row.get(10)?,
        sanctioned_date: parse_date_text(row.get(11)?),
        tender_date: parse_date_text(row.get(12)?),
        evaluation_amount: row.get(13)?,
        agency_release_details: row.get(14)?,
        total_released_amount: row.get(15)?,
        amount_pending: row.get(16)?,
        agency_name: row.get(17)?,
        completion_timelimit_days: row.get(18)?,
        probable_completion_date: parse_date_text(row.get(19)?),
        current_status: row.get(20)?,
        work_percentage: row.get(21)?,
        verified_on_ground: row.get(22)?,
        inspection_date: parse_date_text(row.get(23)?),
        remark: row.get(24)?,
        csv_photo_info: row.get(25)?,
        coordinates: Coordinates::from_parts(row.get(26)?, row.get(27)?),
    };

    Ok(StoredWork {
        id: row.get(0)?,
        record,
        assignment_status,
    })
}

fn execute_update(
    stmt: &mut duckdb::Statement<'_>,
    update: &WorkUpdate,
    with_coordinates: bool,
) -> Result<(), DbError> {
    let dates = DateText::of(&update.record);
    let (lat, lon) = split(update.record.coordinates);
    let mut params = field_params(&update.record, &dates);
    if with_coordinates {
        params.push(&lat);
        params.push(&lon);
    }
    params.push(&update.id);

    let rows = stmt.execute(params.as_slice())?;
    if rows == 0 {
        return Err(DbError::Constraint {
            message: format!(
                "no stored work with id {} (code {})",
                update.id, update.record.work_code
            ),
        });
    }
    Ok(())
}

/// Gets a metadata value from the `system_metadata` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM system_metadata WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `system_metadata` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO system_metadata (key, value, updated_at)
         VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT (key) DO UPDATE SET
            value = EXCLUDED.value,
            updated_at = EXCLUDED.updated_at",
        duckdb::params![key, value],
    )?;
    Ok(())
}

impl WorkStore for DuckDbWorkStore {
    fn load_index(&self) -> Result<BTreeMap<String, ExistingWork>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT work_code, id, latitude, longitude FROM works")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ExistingWork {
                    id: row.get(1)?,
                    coordinates: Coordinates::from_parts(row.get(2)?, row.get(3)?),
                },
            ))
        })?;

        let mut index = BTreeMap::new();
        for row in rows {
            let (code, existing) = row?;
            index.insert(code, existing);
        }
        Ok(index)
    }

    fn write_batch(&mut self, batch: &WriteBatch) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(&insert_sql())?;
            for record in &batch.inserts {
                let dates = DateText::of(record);
                let (lat, lon) = split(record.coordinates);
                let mut params: Vec<&dyn ToSql> = Vec::with_capacity(FIELD_COLUMNS.len() + 3);
                params.push(&record.work_code);
                params.extend(field_params(record, &dates));
                params.push(&lat);
                params.push(&lon);
                insert.execute(params.as_slice())?;
            }

            let mut with_coords = tx.prepare(&update_sql(true))?;
            for update in &batch.coordinate_updates {
                execute_update(&mut with_coords, update, true)?;
            }

            let mut without_coords = tx.prepare(&update_sql(false))?;
            for update in &batch.plain_updates {
                execute_update(&mut without_coords, update, false)?;
            }

            set_meta(&tx, LAST_SYNC_KEY, &batch.synced_at.to_rfc3339())?;
        }
        tx.commit()?;

        log::debug!(
            "Committed {} inserts, {} coordinate updates, {} plain updates",
            batch.inserts.len(),
            batch.coordinate_updates.len(),
            batch.plain_updates.len()
        );
        Ok(())
    }

    fn get_by_code(&self, work_code: &str) -> Result<Option<StoredWork>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_WORK} WHERE work_code = ?"))?;
        match stmt.query_row([work_code], stored_work_from_row) {
            Ok(work) => Ok(Some(work)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::DuckDb(e)),
        }
    }

    fn count(&self) -> Result<u64, DbError> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM works")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        u64::try_from(count).map_err(|e| DbError::Conversion {
            message: format!("negative row count {count}: {e}"),
        })
    }

    fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        Ok(get_meta(&self.conn, LAST_SYNC_KEY)?
            .as_deref()
            .and_then(crate::parse_timestamp))
    }

    fn missing_coordinates(&self) -> Result<Vec<MissingLocation>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT panchayat, block, COUNT(*) AS works
             FROM works
             WHERE latitude IS NULL OR longitude IS NULL
             GROUP BY panchayat, block
             ORDER BY works DESC, panchayat, block",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut locations = Vec::new();
        for row in rows {
            let (village, block, works) = row?;
            locations.push(MissingLocation {
                village,
                block,
                works: u64::try_from(works).unwrap_or(0),
            });
        }
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn record(code: &str, coordinates: Option<Coordinates>) -> WorkRecord {
        WorkRecord {
            work_code: code.to_string(),
            block: Some("Geedam".to_string()),
            panchayat: Some("Aalnar".to_string()),
            sanctioned_amount: 120_000.0,
            sanctioned_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            current_status: "Not Started".to_string(),
            coordinates,
            ..WorkRecord::default()
        }
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 6, 30, 0).unwrap()
    }

    #[test]
    fn inserts_and_reads_back() {
        let mut store = DuckDbWorkStore::open_in_memory().unwrap();
        let mut batch = WriteBatch::new(stamp());
        batch
            .inserts
            .push(record("10023", Coordinates::checked(18.95, 81.26)));
        store.write_batch(&batch).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let stored = store.get_by_code("10023").unwrap().unwrap();
        assert_eq!(stored.record, record("10023", Coordinates::checked(18.95, 81.26)));
        assert_eq!(stored.assignment_status, AssignmentStatus::Pending);
        assert_eq!(store.last_synced_at().unwrap(), Some(stamp()));

        let index = store.load_index().unwrap();
        assert_eq!(index["10023"].id, stored.id);
        assert_eq!(index["10023"].coordinates, Coordinates::checked(18.95, 81.26));
    }

    #[test]
    fn plain_update_keeps_coordinates() {
        let mut store = DuckDbWorkStore::open_in_memory().unwrap();
        let mut batch = WriteBatch::new(stamp());
        batch
            .inserts
            .push(record("10023", Coordinates::checked(18.95, 81.26)));
        store.write_batch(&batch).unwrap();
        let id = store.load_index().unwrap()["10023"].id;

        let mut changed = record("10023", None);
        changed.current_status = "In Progress".to_string();
        let mut batch = WriteBatch::new(stamp());
        batch.plain_updates.push(WorkUpdate {
            id,
            record: changed,
        });
        store.write_batch(&batch).unwrap();

        let stored = store.get_by_code("10023").unwrap().unwrap();
        assert_eq!(stored.record.current_status, "In Progress");
        assert_eq!(stored.record.coordinates, Coordinates::checked(18.95, 81.26));
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let mut store = DuckDbWorkStore::open_in_memory().unwrap();
        let mut batch = WriteBatch::new(stamp());
        batch.inserts.push(record("10023", None));
        batch.coordinate_updates.push(WorkUpdate {
            id: 9_999,
            record: record("ghost", Coordinates::checked(18.9, 81.3)),
        });

        assert!(matches!(
            store.write_batch(&batch),
            Err(DbError::Constraint { .. })
        ));
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.last_synced_at().unwrap(), None);
    }

    #[test]
    fn groups_missing_locations() {
        let mut store = DuckDbWorkStore::open_in_memory().unwrap();
        let mut batch = WriteBatch::new(stamp());
        batch.inserts.push(record("1", None));
        batch.inserts.push(record("2", None));
        batch
            .inserts
            .push(record("3", Coordinates::checked(18.95, 81.26)));
        store.write_batch(&batch).unwrap();

        let missing = store.missing_coordinates().unwrap();
        assert_eq!(
            missing,
            vec![MissingLocation {
                village: Some("Aalnar".to_string()),
                block: Some("Geedam".to_string()),
                works: 2,
            }]
        );
    }
}
