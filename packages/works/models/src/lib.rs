#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical public-works record and the shapes written to the store.
//!
//! Every ingestion source (file upload, published sheet) is normalized into
//! [`WorkRecord`] values keyed by their `work_code`. The reconciliation
//! engine turns a batch of records into a [`WriteBatch`] that the store
//! commits atomically.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Village label written for works located only to block-centroid precision.
pub const BLOCK_LEVEL_VILLAGE: &str = "Block Level";

/// Status given to works whose source row has no status.
pub const DEFAULT_STATUS: &str = "Not Started";

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Builds a point, rejecting non-finite, out-of-range and zero values.
    ///
    /// Spreadsheet exports use `0` as a placeholder for "unknown", so a zero
    /// on either axis is treated as missing.
    #[must_use]
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if latitude == 0.0 || longitude == 0.0 {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a point from a pair of optional axes. Both must be present.
    #[must_use]
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Self::checked(latitude?, longitude?)
    }
}

/// Cache key for a village within a block: `{VILLAGE}_{BLOCK}`, each part
/// trimmed and uppercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationKey(String);

impl LocationKey {
    /// Builds the key for a village/block pair.
    #[must_use]
    pub fn new(village: &str, block: &str) -> Self {
        Self(format!(
            "{}_{}",
            village.trim().to_uppercase(),
            block.trim().to_uppercase()
        ))
    }

    /// Normalizes a key read from a persisted cache.
    ///
    /// Older cache files mix `GP_Block` and `GP_BLOCK` spellings; both
    /// collapse to the same key.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Officer assignment state. Owned by the assignment workflow, never
/// written by ingestion except as the insert default.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum AssignmentStatus {
    /// Not yet inspected by the assigned officer.
    #[default]
    Pending,
    /// Inspection submitted.
    Completed,
}

/// How a record's coordinates were obtained during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateTier {
    /// Latitude/longitude columns in the source row.
    Explicit,
    /// Previously stored coordinates kept unchanged.
    Preserved,
    /// Village-level cache, override table or live lookup.
    Village,
    /// Block centroid table.
    BlockCentroid,
    /// Nothing resolved.
    Unresolved,
}

/// One public-works project as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkRecord {
    /// Canonical unique identifier.
    pub work_code: String,
    /// Sanctioning department or sector.
    pub department: Option<String>,
    /// Financial year label (e.g. `2024-25`).
    pub financial_year: Option<String>,
    /// Block name.
    pub block: Option<String>,
    /// Gram panchayat / village name, or [`BLOCK_LEVEL_VILLAGE`].
    pub panchayat: Option<String>,
    /// Full work name.
    pub work_name: Option<String>,
    /// Short work name.
    pub work_name_brief: Option<String>,
    /// Source unique-ID column, identifier-cleaned.
    pub unique_id: Option<String>,
    /// Administrative sanction number, identifier-cleaned.
    pub as_number: Option<String>,
    /// Sanctioned amount in rupees.
    pub sanctioned_amount: f64,
    /// Administrative sanction date.
    pub sanctioned_date: Option<NaiveDate>,
    /// Tender date.
    pub tender_date: Option<NaiveDate>,
    /// Evaluation amount in rupees.
    pub evaluation_amount: f64,
    /// Free-text agency release notes.
    pub agency_release_details: Option<String>,
    /// Total released amount in rupees.
    pub total_released_amount: f64,
    /// Amount still pending in rupees.
    pub amount_pending: f64,
    /// Executing agency.
    pub agency_name: Option<String>,
    /// Completion time limit in days.
    pub completion_timelimit_days: i64,
    /// Probable completion date.
    pub probable_completion_date: Option<NaiveDate>,
    /// Normalized progress status.
    pub current_status: String,
    /// Progress percentage as written in the sheet.
    pub work_percentage: Option<String>,
    /// Ground verification note.
    pub verified_on_ground: Option<String>,
    /// Date of the last inspection recorded in the sheet.
    pub inspection_date: Option<NaiveDate>,
    /// Remarks column.
    pub remark: Option<String>,
    /// Photo reference text from the sheet.
    pub csv_photo_info: Option<String>,
    /// Resolved coordinates.
    pub coordinates: Option<Coordinates>,
}

impl WorkRecord {
    /// Returns `true` when the record sits at block-centroid precision.
    #[must_use]
    pub fn is_block_level(&self) -> bool {
        self.panchayat.as_deref() == Some(BLOCK_LEVEL_VILLAGE)
    }
}

/// What the store already knows about a `work_code`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExistingWork {
    /// Internal row id.
    pub id: i64,
    /// Stored coordinates, if any.
    pub coordinates: Option<Coordinates>,
}

/// An update addressed by internal row id.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUpdate {
    /// Internal row id of the existing record.
    pub id: i64,
    /// New field values.
    pub record: WorkRecord,
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredWork {
    /// Internal row id.
    pub id: i64,
    /// Ingested fields.
    pub record: WorkRecord,
    /// Workflow state, never written by ingestion.
    pub assignment_status: AssignmentStatus,
}

/// Everything one reconciliation run writes, committed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    /// Records with codes unseen by the store.
    pub inserts: Vec<WorkRecord>,
    /// Updates that set latitude/longitude.
    pub coordinate_updates: Vec<WorkUpdate>,
    /// Updates that leave stored latitude/longitude untouched.
    pub plain_updates: Vec<WorkUpdate>,
    /// Value written to the `last_sync` metadata key.
    pub synced_at: DateTime<Utc>,
}

impl WriteBatch {
    /// Creates an empty batch stamped with `synced_at`.
    #[must_use]
    pub const fn new(synced_at: DateTime<Utc>) -> Self {
        Self {
            inserts: Vec::new(),
            coordinate_updates: Vec::new(),
            plain_updates: Vec::new(),
            synced_at,
        }
    }

    /// Number of updates across both partitions.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.coordinate_updates.len() + self.plain_updates.len()
    }
}
