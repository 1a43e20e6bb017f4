#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration and reconciliation result types.

use std::path::PathBuf;

use dmf_works_models::CoordinateTier;
use serde::{Deserialize, Serialize};

/// Counts produced by one reconciliation run.
///
/// `total_processed` counts every input row, including rows later skipped
/// as errors or duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub total_processed: u64,
    pub inserted: u64,
    pub updated: u64,
    /// Rows without a derivable work code, plus malformed rows.
    pub errors: u64,
    /// Repeats of a work code already seen earlier in the same batch.
    pub duplicates: u64,
}

/// How coordinates were obtained across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateStats {
    pub explicit: u64,
    pub preserved: u64,
    pub village: u64,
    pub block_centroid: u64,
    pub unresolved: u64,
    /// Live geocoder requests issued, across all query variants.
    pub geocoder_calls: u64,
}

impl CoordinateStats {
    /// Counts one record resolved through `tier`.
    pub const fn record(&mut self, tier: CoordinateTier) {
        match tier {
            CoordinateTier::Explicit => self.explicit += 1,
            CoordinateTier::Preserved => self.preserved += 1,
            CoordinateTier::Village => self.village += 1,
            CoordinateTier::BlockCentroid => self.block_centroid += 1,
            CoordinateTier::Unresolved => self.unresolved += 1,
        }
    }
}

/// Everything a reconciliation run reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub summary: ReconcileSummary,
    pub coordinates: CoordinateStats,
}

/// Result of merging a manual coordinate file into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateImportSummary {
    /// Rows read from the file.
    pub rows: u64,
    /// Entries written to the cache.
    pub imported: u64,
    /// Rows without a village, block or valid point.
    pub skipped: u64,
}

/// Published Google Sheet to sync from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Sheet URL containing `/d/{id}`.
    pub url: Option<String>,
    /// Tab name.
    pub name: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: "Work progress (Approved AS works)".to_string(),
        }
    }
}

/// Live geocoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Whether cache misses may trigger live lookups.
    pub enabled: bool,
    pub base_url: String,
    /// Sent with every request; the public instance rejects anonymous
    /// clients.
    pub user_agent: String,
    /// Minimum delay between consecutive requests.
    pub rate_limit_ms: u64,
    pub timeout_secs: u64,
    /// Retry keys whose persisted entry is a miss (once per run).
    pub retry_cached_misses: bool,
    /// Rewrite the cache file after this many new entries (`0` = only at
    /// the end of the run).
    pub cache_flush_every: usize,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "dmf_works_monitor/0.1".to_string(),
            rate_limit_ms: 1100,
            timeout_secs: 10,
            retry_cached_misses: true,
            cache_flush_every: 10,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Works store (`DuckDB` file).
    pub database_path: PathBuf,
    /// Coordinate cache; `.csv` for the CSV file, `.duckdb` for a `DuckDB`
    /// table.
    pub cache_path: PathBuf,
    /// Replacement district profile (centroids, overrides, names).
    pub district_path: Option<PathBuf>,
    /// Replacement column alias registry.
    pub columns_path: Option<PathBuf>,
    pub sheet: SheetConfig,
    pub geocoding: GeocodingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/dmf_works.duckdb"),
            cache_path: PathBuf::from("data/gp_coords_cache.csv"),
            district_path: None,
            columns_path: None,
            sheet: SheetConfig::default(),
            geocoding: GeocodingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            "database_path = \"/srv/works.duckdb\"\n[geocoding]\nenabled = false\n",
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/srv/works.duckdb"));
        assert_eq!(config.cache_path, PathBuf::from("data/gp_coords_cache.csv"));
        assert!(!config.geocoding.enabled);
        assert_eq!(config.geocoding.rate_limit_ms, 1100);
        assert_eq!(config.sheet.name, "Work progress (Approved AS works)");
    }

    #[test]
    fn summary_serializes_with_field_names() {
        let summary = ReconcileSummary {
            total_processed: 100,
            inserted: 90,
            updated: 7,
            errors: 3,
            duplicates: 0,
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["total_processed"], 100);
        assert_eq!(json["errors"], 3);
    }

    #[test]
    fn stats_count_tiers() {
        let mut stats = CoordinateStats::default();
        stats.record(CoordinateTier::Village);
        stats.record(CoordinateTier::Village);
        stats.record(CoordinateTier::Unresolved);
        assert_eq!(stats.village, 2);
        assert_eq!(stats.unresolved, 1);
    }
}
