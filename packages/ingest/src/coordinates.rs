//! Per-row coordinate resolution.
//!
//! Tiers are tried in order and the first success wins:
//!
//! 1. explicit row coordinates
//! 2. coordinates already stored for the same `work_code`
//! 3. village point from the override table, the cache, or a live lookup
//! 4. block centroid, for rows with no village or flagged as block-level
//!
//! A row that clears none of them is still stored, without coordinates.

use std::collections::BTreeMap;

use dmf_works_database::CoordinateCache;
use dmf_works_geocoder::query::query_variants;
use dmf_works_geocoder::{Geocoder, lookup_first};
use dmf_works_ingest_models::CoordinateStats;
use dmf_works_models::{
    BLOCK_LEVEL_VILLAGE, Coordinates, CoordinateTier, ExistingWork, LocationKey,
};
use dmf_works_source::normalize::NormalizedWork;

use crate::district::DistrictProfile;

/// Resolves coordinates for the rows of one run.
///
/// Live lookups happen at most once per location key per run, whatever
/// their outcome.
pub struct CoordinateResolver<'a> {
    cache: &'a mut dyn CoordinateCache,
    geocoder: Option<&'a dyn Geocoder>,
    district: &'a DistrictProfile,
    retry_cached_misses: bool,
    attempted: BTreeMap<LocationKey, Option<Coordinates>>,
    stats: CoordinateStats,
}

impl<'a> CoordinateResolver<'a> {
    /// `geocoder = None` restricts resolution to the override table, the
    /// cache and block centroids.
    #[must_use]
    pub fn new(
        cache: &'a mut dyn CoordinateCache,
        geocoder: Option<&'a dyn Geocoder>,
        district: &'a DistrictProfile,
        retry_cached_misses: bool,
    ) -> Self {
        Self {
            cache,
            geocoder,
            district,
            retry_cached_misses,
            attempted: BTreeMap::new(),
            stats: CoordinateStats::default(),
        }
    }

    /// Counts accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> CoordinateStats {
        self.stats
    }

    /// Fills `work.record.coordinates` (and the block-level village label
    /// when applicable) and reports which tier produced them.
    pub async fn resolve(
        &mut self,
        work: &mut NormalizedWork,
        existing: Option<&ExistingWork>,
    ) -> CoordinateTier {
        let tier = self.resolve_tier(work, existing).await;
        self.stats.record(tier);
        tier
    }

    async fn resolve_tier(
        &mut self,
        work: &mut NormalizedWork,
        existing: Option<&ExistingWork>,
    ) -> CoordinateTier {
        let record = &mut work.record;

        if record.coordinates.is_some() {
            return CoordinateTier::Explicit;
        }

        let village = record
            .panchayat
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(BLOCK_LEVEL_VILLAGE))
            .map(ToOwned::to_owned);
        let block = record.block.clone().unwrap_or_default();

        if let Some(stored) = existing.and_then(|e| e.coordinates) {
            // A plain update rewrites the village column, so the block-level
            // label has to be reapplied here too.
            if village.is_none() && self.district.block_centroid(&block).is_some() {
                record.panchayat = Some(BLOCK_LEVEL_VILLAGE.to_string());
            }
            record.coordinates = Some(stored);
            return CoordinateTier::Preserved;
        }

        if let Some(village) = &village
            && let Some(point) = self.village_point(village, &block).await
        {
            record.coordinates = Some(point);
            return CoordinateTier::Village;
        }

        if (village.is_none() || work.block_level_flag)
            && let Some(centroid) = self.district.block_centroid(&block)
        {
            if village.is_none() {
                record.panchayat = Some(BLOCK_LEVEL_VILLAGE.to_string());
            }
            record.coordinates = Some(centroid);
            return CoordinateTier::BlockCentroid;
        }

        CoordinateTier::Unresolved
    }

    async fn village_point(&mut self, village: &str, block: &str) -> Option<Coordinates> {
        let key = LocationKey::new(village, block);

        if let Some(point) = self.district.manual_override(&key) {
            return Some(point);
        }

        match self.cache.get(&key) {
            Some(Some(point)) => return Some(point),
            Some(None) if !self.retry_cached_misses => return None,
            _ => {}
        }

        if let Some(outcome) = self.attempted.get(&key) {
            return *outcome;
        }

        let geocoder = self.geocoder?;
        let queries = query_variants(village, block, &self.district.region());
        let hit = lookup_first(geocoder, &queries).await;

        let calls = hit
            .and_then(|(query, _)| queries.iter().position(|q| q == query))
            .map_or(queries.len(), |i| i + 1);
        self.stats.geocoder_calls += calls as u64;

        let outcome = match hit {
            Some((query, point)) => {
                log::debug!("Geocoded {key} via {query:?}");
                Some(point)
            }
            None => {
                log::debug!("No geocoding result for {key} after {calls} queries");
                None
            }
        };

        self.attempted.insert(key.clone(), outcome);
        if let Err(e) = self.cache.put(key.clone(), outcome) {
            log::warn!("Failed to cache coordinates for {key}: {e}");
        }
        outcome
    }

    /// Persists pending cache entries. A failure is logged, never returned.
    pub fn flush_cache(&mut self) {
        if let Err(e) = self.cache.flush() {
            log::warn!("Failed to flush coordinate cache: {e}");
        }
    }
}
