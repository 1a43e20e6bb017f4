//! Batch reconciliation of normalized rows against the works store.

use chrono::Utc;
use dmf_works_database::WorkStore;
use dmf_works_ingest_models::{ReconcileReport, ReconcileSummary};
use dmf_works_models::{CoordinateTier, WorkUpdate, WriteBatch};
use dmf_works_source::columns::ColumnMap;
use dmf_works_source::identity::BatchDeduper;
use dmf_works_source::normalize::normalize_row;
use dmf_works_source::progress::ProgressCallback;
use dmf_works_source::{RowSkip, Table};

use crate::IngestError;
use crate::coordinates::CoordinateResolver;

/// Tiers whose result is written to the stored latitude/longitude.
const fn writes_coordinates(tier: CoordinateTier) -> bool {
    matches!(
        tier,
        CoordinateTier::Explicit | CoordinateTier::Village | CoordinateTier::BlockCentroid
    )
}

/// Reconciles every row of `table` against `store` in one atomic batch.
///
/// Rows that cannot be normalized are counted in `errors`, repeats of a
/// code already seen in this table in `duplicates`; neither stops the run.
/// The coordinate cache is flushed before the store commit.
///
/// # Errors
///
/// Returns [`IngestError::Database`] if the index cannot be loaded or the
/// batch fails to commit, in which case nothing from the batch is stored.
pub async fn reconcile(
    table: &Table,
    columns: &ColumnMap,
    store: &mut dyn WorkStore,
    resolver: &mut CoordinateResolver<'_>,
    progress: &dyn ProgressCallback,
) -> Result<ReconcileReport, IngestError> {
    let index = store.load_index()?;
    log::info!(
        "Reconciling {} rows against {} stored works",
        table.len(),
        index.len()
    );

    let mut summary = ReconcileSummary {
        total_processed: table.len() as u64,
        ..ReconcileSummary::default()
    };
    let mut deduper = BatchDeduper::new();
    let mut batch = WriteBatch::new(Utc::now());

    progress.set_total(table.len() as u64);

    for entry in &table.rows {
        progress.inc(1);

        let normalized = match entry {
            Ok(row) => normalize_row(row, columns),
            Err(skip) => Err(skip.clone()),
        };
        let mut work = match normalized {
            Ok(work) => work,
            Err(skip) => {
                log::debug!("Skipping {skip}");
                summary.errors += 1;
                continue;
            }
        };

        if !deduper.admit(&work.record.work_code) {
            let skip = RowSkip::Duplicate {
                row: work.row,
                work_code: work.record.work_code.clone(),
            };
            log::debug!("Skipping {skip}");
            summary.duplicates += 1;
            continue;
        }

        let existing = index.get(&work.record.work_code);
        let tier = resolver.resolve(&mut work, existing).await;

        match existing {
            None => batch.inserts.push(work.record),
            Some(existing) => {
                let update = WorkUpdate {
                    id: existing.id,
                    record: work.record,
                };
                if writes_coordinates(tier) {
                    batch.coordinate_updates.push(update);
                } else {
                    batch.plain_updates.push(update);
                }
            }
        }
    }

    resolver.flush_cache();

    summary.inserted = batch.inserts.len() as u64;
    summary.updated = batch.update_count() as u64;
    batch.synced_at = Utc::now();

    progress.set_message(format!(
        "committing {} inserts, {} updates",
        summary.inserted, summary.updated
    ));
    store.write_batch(&batch)?;

    let coordinates = resolver.stats();
    log::info!(
        "Reconciled {} rows: {} inserted, {} updated, {} errors, {} duplicates",
        summary.total_processed,
        summary.inserted,
        summary.updated,
        summary.errors,
        summary.duplicates
    );
    log::info!(
        "Coordinates: {} explicit, {} preserved, {} village, {} block centroid, {} unresolved ({} geocoder calls)",
        coordinates.explicit,
        coordinates.preserved,
        coordinates.village,
        coordinates.block_centroid,
        coordinates.unresolved,
        coordinates.geocoder_calls
    );
    progress.finish(format!(
        "{} inserted, {} updated",
        summary.inserted, summary.updated
    ));

    Ok(ReconcileReport {
        summary,
        coordinates,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use dmf_works_database::memory::{MemoryCoordinateCache, MemoryWorkStore};
    use dmf_works_database::{DbError, MissingLocation};
    use dmf_works_models::{Coordinates, ExistingWork, StoredWork};
    use dmf_works_source::RawRow;
    use dmf_works_source::progress::NullProgress;

    use super::*;
    use crate::district::DistrictProfile;

    fn row(n: u64, pairs: &[(&str, &str)]) -> Result<RawRow, RowSkip> {
        Ok(RawRow::from_pairs(n, pairs.iter().copied()))
    }

    fn table(rows: Vec<Result<RawRow, RowSkip>>) -> Table {
        Table {
            headers: Vec::new(),
            rows,
        }
    }

    async fn run(
        store: &mut dyn WorkStore,
        cache: &mut MemoryCoordinateCache,
        input: &Table,
    ) -> Result<ReconcileReport, IngestError> {
        let district = DistrictProfile::embedded();
        let columns = ColumnMap::embedded();
        let mut resolver = CoordinateResolver::new(cache, None, &district, true);
        reconcile(input, &columns, store, &mut resolver, &NullProgress).await
    }

    #[tokio::test]
    async fn second_run_only_updates() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();
        let input = table(vec![
            row(2, &[("Work Id Number", "10023.0"), ("Block", "Geedam")]),
            row(3, &[("Work Id Number", "10024"), ("Block", "Geedam")]),
        ]);

        let first = run(&mut store, &mut cache, &input).await.unwrap();
        assert_eq!(first.summary.inserted, 2);
        assert_eq!(first.summary.updated, 0);

        let second = run(&mut store, &mut cache, &input).await.unwrap();
        assert_eq!(second.summary.inserted, 0);
        assert_eq!(second.summary.updated, 2);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.get_by_code("10023").unwrap().is_some());
    }

    #[tokio::test]
    async fn stored_coordinates_survive_bare_update() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();
        let with_point = table(vec![row(
            2,
            &[
                ("Work Id Number", "1"),
                ("Panchayat", "Nowhere"),
                ("Latitude", "18.8"),
                ("Longitude", "81.3"),
            ],
        )]);
        run(&mut store, &mut cache, &with_point).await.unwrap();

        let bare = table(vec![row(
            2,
            &[
                ("Work Id Number", "1"),
                ("Panchayat", "Nowhere"),
                ("Work Status", "prossece"),
            ],
        )]);
        let report = run(&mut store, &mut cache, &bare).await.unwrap();

        let stored = store.get_by_code("1").unwrap().unwrap();
        assert_eq!(stored.record.coordinates, Coordinates::checked(18.8, 81.3));
        assert_eq!(stored.record.current_status, "In Progress");
        assert_eq!(report.coordinates.preserved, 1);
    }

    #[tokio::test]
    async fn explicit_coordinates_overwrite_stored_ones() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();
        let first = table(vec![row(
            2,
            &[("Work Id Number", "1"), ("Latitude", "18.8"), ("Longitude", "81.3")],
        )]);
        run(&mut store, &mut cache, &first).await.unwrap();

        let second = table(vec![row(
            2,
            &[("Work Id Number", "1"), ("Latitude", "18.9"), ("Longitude", "81.4")],
        )]);
        run(&mut store, &mut cache, &second).await.unwrap();

        assert_eq!(
            store.get_by_code("1").unwrap().unwrap().record.coordinates,
            Coordinates::checked(18.9, 81.4)
        );
    }

    #[tokio::test]
    async fn bad_rows_are_counted_not_fatal() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();

        let mut rows = Vec::new();
        for n in 0..100u64 {
            let code = n.to_string();
            let pairs: Vec<(&str, &str)> = if n % 40 == 7 {
                vec![("Work Name", "No identifier")]
            } else {
                vec![("Work Id Number", code.as_str()), ("Sanctioned Amount", "₹1,20,000")]
            };
            rows.push(row(n + 2, &pairs));
        }
        let report = run(&mut store, &mut cache, &table(rows)).await.unwrap();

        assert_eq!(report.summary.total_processed, 100);
        assert_eq!(report.summary.errors, 3);
        assert_eq!(report.summary.inserted + report.summary.updated, 97);
        assert!(
            (store.get_by_code("0").unwrap().unwrap().record.sanctioned_amount - 120_000.0).abs()
                < f64::EPSILON
        );
    }

    #[tokio::test]
    async fn duplicate_codes_keep_first_row() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();
        let input = table(vec![
            row(2, &[("Work Id Number", "10023.0"), ("Work Name", "Road")]),
            row(3, &[("Work Id Number", "10023"), ("Work Name", "Bridge")]),
            Err(RowSkip::Malformed {
                row: 4,
                message: "unterminated quote".to_string(),
            }),
        ]);
        let report = run(&mut store, &mut cache, &input).await.unwrap();

        assert_eq!(report.summary.inserted, 1);
        assert_eq!(report.summary.duplicates, 1);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(
            store.get_by_code("10023").unwrap().unwrap().record.work_name.as_deref(),
            Some("Road")
        );
    }

    #[tokio::test]
    async fn block_fallback_only_for_known_blocks() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();
        let input = table(vec![
            row(2, &[("Work Id Number", "1"), ("Block", "Geedam")]),
            row(3, &[("Work Id Number", "2"), ("Block", "Bastar")]),
        ]);
        let report = run(&mut store, &mut cache, &input).await.unwrap();

        let geedam = store.get_by_code("1").unwrap().unwrap().record;
        assert_eq!(geedam.coordinates, Coordinates::checked(18.9748, 81.3938));
        assert!(geedam.is_block_level());

        let bastar = store.get_by_code("2").unwrap().unwrap().record;
        assert_eq!(bastar.coordinates, None);
        assert_eq!(report.coordinates.block_centroid, 1);
        assert_eq!(report.coordinates.unresolved, 1);
    }

    #[tokio::test]
    async fn block_level_label_survives_resync() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::new();
        let input = || table(vec![row(2, &[("Work Id Number", "1"), ("Block", "Geedam")])]);

        run(&mut store, &mut cache, &input()).await.unwrap();
        let report = run(&mut store, &mut cache, &input()).await.unwrap();

        let geedam = store.get_by_code("1").unwrap().unwrap().record;
        assert!(geedam.is_block_level());
        assert_eq!(geedam.coordinates, Coordinates::checked(18.9748, 81.3938));
        assert_eq!(report.coordinates.preserved, 1);
    }

    #[tokio::test]
    async fn cached_village_is_used() {
        let mut store = MemoryWorkStore::new();
        let mut cache = MemoryCoordinateCache::with_entries([(
            dmf_works_models::LocationKey::from_raw("AALNAR_GEEDAM"),
            Coordinates::checked(18.95, 81.26),
        )]);
        let input = table(vec![row(
            2,
            &[("Work Id Number", "1"), ("Panchayat", "Aalnar"), ("Block", "Geedam")],
        )]);
        let report = run(&mut store, &mut cache, &input).await.unwrap();

        assert_eq!(
            store.get_by_code("1").unwrap().unwrap().record.coordinates,
            Coordinates::checked(18.95, 81.26)
        );
        assert_eq!(report.coordinates.geocoder_calls, 0);
    }

    struct FailingStore;

    impl WorkStore for FailingStore {
        fn load_index(&self) -> Result<BTreeMap<String, ExistingWork>, DbError> {
            Ok(BTreeMap::new())
        }

        fn write_batch(&mut self, _batch: &WriteBatch) -> Result<(), DbError> {
            Err(DbError::Constraint {
                message: "disk full".to_string(),
            })
        }

        fn get_by_code(&self, _work_code: &str) -> Result<Option<StoredWork>, DbError> {
            Ok(None)
        }

        fn count(&self) -> Result<u64, DbError> {
            Ok(0)
        }

        fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
            Ok(None)
        }

        fn missing_coordinates(&self) -> Result<Vec<MissingLocation>, DbError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn store_failure_fails_the_run() {
        let mut cache = MemoryCoordinateCache::new();
        let input = table(vec![row(2, &[("Work Id Number", "1")])]);
        let err = run(&mut FailingStore, &mut cache, &input).await.unwrap_err();
        assert!(matches!(err, IngestError::Database(_)));
    }
}
