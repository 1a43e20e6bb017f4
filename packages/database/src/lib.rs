#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistence for works records and the village coordinate cache.
//!
//! The reconciliation engine only talks to the [`WorkStore`] and
//! [`CoordinateCache`] traits. Production runs use `DuckDB`
//! ([`works_db::DuckDbWorkStore`]) and the CSV cache file
//! ([`cache_file::CsvCoordinateCache`]); tests use the in-memory
//! implementations in [`memory`].

pub mod cache_file;
pub mod geocode_cache;
pub mod memory;
pub mod paths;
pub mod works_db;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dmf_works_models::{Coordinates, ExistingWork, LocationKey, StoredWork, WriteBatch};

/// Metadata key holding the timestamp of the last successful run.
pub const LAST_SYNC_KEY: &str = "last_sync";

/// Errors that can occur during store and cache operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV cache file error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A batch violated a store invariant (unknown id, duplicate code).
    #[error("Constraint violation: {message}")]
    Constraint {
        /// What was violated.
        message: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Village/block pair with works still lacking coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingLocation {
    pub village: Option<String>,
    pub block: Option<String>,
    /// Number of works at this location without coordinates.
    pub works: u64,
}

/// The relational works store.
pub trait WorkStore {
    /// Loads `work_code → (id, coordinates)` for every stored record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn load_index(&self) -> Result<BTreeMap<String, ExistingWork>, DbError>;

    /// Commits all inserts, updates and the `last_sync` stamp of a batch
    /// atomically. On error nothing from the batch is visible.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any write fails.
    fn write_batch(&mut self, batch: &WriteBatch) -> Result<(), DbError>;

    /// Reads one record by code.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn get_by_code(&self, work_code: &str) -> Result<Option<StoredWork>, DbError>;

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn count(&self) -> Result<u64, DbError>;

    /// Timestamp of the last committed batch.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, DbError>;

    /// Locations of records without coordinates, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    fn missing_coordinates(&self) -> Result<Vec<MissingLocation>, DbError>;
}

/// Durable `location_key → coordinates` mapping.
///
/// A stored `None` records a lookup that found nothing.
pub trait CoordinateCache {
    /// Returns `None` if the key was never recorded, `Some(None)` for a
    /// recorded miss.
    fn get(&self, key: &LocationKey) -> Option<Option<Coordinates>>;

    /// Records an outcome. Implementations may persist eagerly or batch.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if an eager or periodic write fails. The entry is
    /// kept in memory either way.
    fn put(&mut self, key: LocationKey, coordinates: Option<Coordinates>) -> Result<(), DbError>;

    /// Persists everything recorded so far.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn flush(&mut self) -> Result<(), DbError>;

    /// Number of entries, hits and misses.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    log::warn!("Failed to parse timestamp: {s:?}");
    None
}
