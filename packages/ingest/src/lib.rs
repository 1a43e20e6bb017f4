#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reconciliation pipeline for DMF public-works records.
//!
//! Both ingestion paths (an uploaded file and the scheduled pull of the
//! published Google Sheet) end in [`Pipeline::ingest_table`], which
//! normalizes every row, resolves coordinates and commits the batch to the
//! works store in one transaction.

pub mod config;
pub mod coordinates;
pub mod district;
pub mod progress;
pub mod reconcile;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dmf_works_database::cache_file::CsvCoordinateCache;
use dmf_works_database::geocode_cache::DuckDbCoordinateCache;
use dmf_works_database::paths::is_duckdb_path;
use dmf_works_database::works_db::DuckDbWorkStore;
use dmf_works_database::{CoordinateCache, DbError, MissingLocation, WorkStore};
use dmf_works_geocoder::nominatim::NominatimClient;
use dmf_works_geocoder::{GeocodeError, Geocoder};
use dmf_works_ingest_models::{CoordinateImportSummary, PipelineConfig, ReconcileReport};
use dmf_works_models::{Coordinates, LocationKey};
use dmf_works_source::columns::ColumnMap;
use dmf_works_source::parsing::parse_coordinate;
use dmf_works_source::progress::ProgressCallback;
use dmf_works_source::{SourceError, Table};

use crate::coordinates::CoordinateResolver;
use crate::district::DistrictProfile;

/// Errors that abort a pipeline operation.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Input could not be read or was rejected before row processing.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Store or cache failure. A failed batch leaves the store unchanged.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Geocoding client could not be built.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration or district profile is not valid TOML.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// District profile parsed but holds an invalid entry.
    #[error("Invalid district profile: {message}")]
    District {
        /// What was wrong.
        message: String,
    },

    /// A sync was requested without a sheet URL.
    #[error("No sheet URL configured (set sheet.url, DMF_WORKS_SHEET_URL or --url)")]
    MissingSheetUrl,

    /// I/O error (config or profile file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store overview for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub records: u64,
    pub without_coordinates: u64,
    pub last_sync: Option<DateTime<Utc>>,
    /// Entries in the coordinate cache, hits and misses.
    pub cached_locations: usize,
}

/// A works store, a coordinate cache and the lookup configuration around
/// them.
pub struct Pipeline {
    columns: ColumnMap,
    district: DistrictProfile,
    store: Box<dyn WorkStore>,
    cache: Box<dyn CoordinateCache>,
    geocoder: Option<Box<dyn Geocoder>>,
    retry_cached_misses: bool,
}

impl Pipeline {
    /// Assembles a pipeline from already-opened parts.
    #[must_use]
    pub fn new(
        columns: ColumnMap,
        district: DistrictProfile,
        store: Box<dyn WorkStore>,
        cache: Box<dyn CoordinateCache>,
        geocoder: Option<Box<dyn Geocoder>>,
    ) -> Self {
        Self {
            columns,
            district,
            store,
            cache,
            geocoder,
            retry_cached_misses: true,
        }
    }

    /// Sets whether cached misses get one more live lookup per run.
    #[must_use]
    pub const fn with_retry_cached_misses(mut self, retry: bool) -> Self {
        self.retry_cached_misses = retry;
        self
    }

    /// Opens the store, cache and geocoder described by `config`.
    ///
    /// Live lookups are enabled only when both `live_geocoding` and
    /// `config.geocoding.enabled` are set.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if a registry or profile file cannot be
    /// loaded, or the store or cache cannot be opened.
    pub fn open(config: &PipelineConfig, live_geocoding: bool) -> Result<Self, IngestError> {
        let columns = match &config.columns_path {
            Some(path) => ColumnMap::from_path(path)?,
            None => ColumnMap::embedded(),
        };
        let district = match &config.district_path {
            Some(path) => DistrictProfile::from_path(path)?,
            None => DistrictProfile::embedded(),
        };

        let store = DuckDbWorkStore::open(&config.database_path)?;
        log::info!("Opened works store {}", config.database_path.display());

        let cache: Box<dyn CoordinateCache> = if is_duckdb_path(&config.cache_path) {
            Box::new(DuckDbCoordinateCache::open(&config.cache_path)?)
        } else {
            Box::new(CsvCoordinateCache::open(
                &config.cache_path,
                config.geocoding.cache_flush_every,
            )?)
        };

        let geocoding = &config.geocoding;
        let geocoder: Option<Box<dyn Geocoder>> = if live_geocoding && geocoding.enabled {
            Some(Box::new(NominatimClient::new(
                &geocoding.base_url,
                &geocoding.user_agent,
                Duration::from_secs(geocoding.timeout_secs),
                Duration::from_millis(geocoding.rate_limit_ms),
            )?))
        } else {
            log::info!("Live geocoding disabled; using cache and block centroids only");
            None
        };

        Ok(Self::new(columns, district, Box::new(store), cache, geocoder)
            .with_retry_cached_misses(geocoding.retry_cached_misses))
    }

    /// Reconciles an already-decoded table. Shared by the upload and sync
    /// paths.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] if the batch cannot be committed.
    pub async fn ingest_table(
        &mut self,
        table: &Table,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<ReconcileReport, IngestError> {
        let start = Instant::now();
        let mut resolver = CoordinateResolver::new(
            self.cache.as_mut(),
            self.geocoder.as_deref(),
            &self.district,
            self.retry_cached_misses,
        );
        let report = reconcile::reconcile(
            table,
            &self.columns,
            self.store.as_mut(),
            &mut resolver,
            progress.as_ref(),
        )
        .await?;

        log::info!("Reconciliation finished in {:.1}s", start.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Reconciles a CSV or spreadsheet file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Source`] if the file is unreadable or not a
    /// supported format, or [`IngestError::Database`] if the commit fails.
    pub async fn upload_file(
        &mut self,
        path: &Path,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<ReconcileReport, IngestError> {
        log::info!("Reading {}", path.display());
        let table = dmf_works_source::load_file(path)?;
        log::info!("Read {} rows ({} columns)", table.len(), table.headers.len());
        self.ingest_table(&table, progress).await
    }

    /// Fetches the published sheet tab and reconciles it.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Source`] if the URL is invalid, the download
    /// fails or the response is not tabular, or [`IngestError::Database`]
    /// if the commit fails.
    pub async fn sync_sheet(
        &mut self,
        client: &reqwest::Client,
        url: &str,
        sheet_name: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<ReconcileReport, IngestError> {
        let table = dmf_works_source::google_sheet::fetch_sheet(client, url, sheet_name).await?;
        log::info!("Fetched {} rows from sheet", table.len());
        self.ingest_table(&table, progress).await
    }

    /// Merges manually researched village coordinates into the cache.
    ///
    /// Rows need a village, a block and a valid point; anything else is
    /// counted as skipped. Imported entries replace cached ones, misses
    /// included.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be read or the cache
    /// cannot be written.
    pub fn import_coordinates(&mut self, path: &Path) -> Result<CoordinateImportSummary, IngestError> {
        let table = dmf_works_source::load_file(path)?;
        let mut summary = CoordinateImportSummary {
            rows: table.len() as u64,
            ..CoordinateImportSummary::default()
        };

        for entry in &table.rows {
            let Ok(row) = entry else {
                summary.skipped += 1;
                continue;
            };

            let village = row.first(&self.columns.panchayat);
            let block = row.first(&self.columns.block);
            let point = Coordinates::from_parts(
                parse_coordinate(row.first(&self.columns.latitude)),
                parse_coordinate(row.first(&self.columns.longitude)),
            );

            match (village, block, point) {
                (Some(village), Some(block), Some(point)) => {
                    self.cache.put(LocationKey::new(village, block), Some(point))?;
                    summary.imported += 1;
                }
                _ => {
                    log::debug!("Skipping coordinate row {}", row.row());
                    summary.skipped += 1;
                }
            }
        }

        self.cache.flush()?;
        log::info!(
            "Imported {} village coordinates ({} rows skipped)",
            summary.imported,
            summary.skipped
        );
        Ok(summary)
    }

    /// Record count, coordinate coverage and last sync time.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] if the store cannot be read.
    pub fn status(&self) -> Result<StoreStatus, IngestError> {
        let without_coordinates = self
            .store
            .missing_coordinates()?
            .iter()
            .map(|m| m.works)
            .sum();

        Ok(StoreStatus {
            records: self.store.count()?,
            without_coordinates,
            last_sync: self.store.last_synced_at()?,
            cached_locations: self.cache.len(),
        })
    }

    /// Village/block pairs whose works still lack coordinates, most
    /// affected first.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] if the store cannot be read.
    pub fn missing_report(&self) -> Result<Vec<MissingLocation>, IngestError> {
        Ok(self.store.missing_coordinates()?)
    }

    /// Direct access to the store, for reporting.
    #[must_use]
    pub fn store(&self) -> &dyn WorkStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use dmf_works_database::memory::{MemoryCoordinateCache, MemoryWorkStore};
    use dmf_works_source::csv_file::read_csv;
    use dmf_works_source::progress::null_progress;

    use super::*;

    fn memory_pipeline(cache: MemoryCoordinateCache) -> Pipeline {
        Pipeline::new(
            ColumnMap::embedded(),
            DistrictProfile::embedded(),
            Box::new(MemoryWorkStore::new()),
            Box::new(cache),
            None,
        )
    }

    const SHEET: &str = "\
Work Id Number,Block,Panchayat,Sanctioned Amount,Work Status
10023.0,Geedam,Aalnar,\"₹1,20,000\",unstarted
10024,Geedam,,-,
,Kuwakonda,Bade,100,
";

    #[tokio::test]
    async fn ingests_a_csv_table() {
        let cache = MemoryCoordinateCache::with_entries([(
            LocationKey::new("Aalnar", "Geedam"),
            Coordinates::checked(18.95, 81.26),
        )]);
        let mut pipeline = memory_pipeline(cache);

        let table = read_csv(SHEET.as_bytes()).unwrap();
        let report = pipeline.ingest_table(&table, null_progress()).await.unwrap();

        assert_eq!(report.summary.total_processed, 3);
        assert_eq!(report.summary.inserted, 2);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.coordinates.village, 1);
        assert_eq!(report.coordinates.block_centroid, 1);

        let status = pipeline.status().unwrap();
        assert_eq!(status.records, 2);
        assert_eq!(status.without_coordinates, 0);
        assert!(status.last_sync.is_some());

        let stored = pipeline.store().get_by_code("10023").unwrap().unwrap();
        assert!((stored.record.sanctioned_amount - 120_000.0).abs() < f64::EPSILON);
        assert_eq!(stored.record.current_status, "Not Started");
    }

    #[tokio::test]
    async fn missing_report_groups_unresolved_locations() {
        let mut pipeline = memory_pipeline(MemoryCoordinateCache::new());
        let table = read_csv(
            "Work Id Number,Block,Panchayat\n1,Geedam,Kodenar\n2,Geedam,Kodenar\n3,Bastar,\n"
                .as_bytes(),
        )
        .unwrap();
        pipeline.ingest_table(&table, null_progress()).await.unwrap();

        let missing = pipeline.missing_report().unwrap();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].village.as_deref(), Some("Kodenar"));
        assert_eq!(missing[0].works, 2);
    }

    #[test]
    fn imports_manual_coordinates() {
        let path = std::env::temp_dir().join(format!(
            "dmf_works_manual_coords_{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "Gram Panchayat,Block/Tehsil,Latitude,Longitude\n\
             Kodenar,Geedam,18.91,81.32\n\
             Nowhere,Geedam,,\n",
        )
        .unwrap();

        let mut pipeline = memory_pipeline(MemoryCoordinateCache::new());
        let summary = pipeline.import_coordinates(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(pipeline.status().unwrap().cached_locations, 1);
    }
}
