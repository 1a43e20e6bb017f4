//! In-memory store and cache.
//!
//! Same semantics as the persistent implementations, including atomic
//! batches: a batch is applied to a copy and swapped in only when every
//! write succeeded.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dmf_works_models::{
    AssignmentStatus, Coordinates, ExistingWork, LocationKey, StoredWork, WorkUpdate, WriteBatch,
};

use crate::{CoordinateCache, DbError, MissingLocation, WorkStore};

#[derive(Debug, Clone, Default)]
struct State {
    works: BTreeMap<String, StoredWork>,
    next_id: i64,
    last_sync: Option<DateTime<Utc>>,
}

/// Works store held in a map keyed by `work_code`.
#[derive(Debug, Default)]
pub struct MemoryWorkStore {
    state: State,
}

impl MemoryWorkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_update(state: &mut State, update: &WorkUpdate, with_coordinates: bool) -> Result<(), DbError> {
    let stored = state
        .works
        .values_mut()
        .find(|w| w.id == update.id)
        .ok_or_else(|| DbError::Constraint {
            message: format!(
                "no stored work with id {} (code {})",
                update.id, update.record.work_code
            ),
        })?;

    let coordinates = if with_coordinates {
        update.record.coordinates
    } else {
        stored.record.coordinates
    };
    stored.record = update.record.clone();
    stored.record.coordinates = coordinates;
    Ok(())
}

impl WorkStore for MemoryWorkStore {
    fn load_index(&self) -> Result<BTreeMap<String, ExistingWork>, DbError> {
        Ok(self
            .state
            .works
            .iter()
            .map(|(code, w)| {
                (
                    code.clone(),
                    ExistingWork {
                        id: w.id,
                        coordinates: w.record.coordinates,
                    },
                )
            })
            .collect())
    }

    fn write_batch(&mut self, batch: &WriteBatch) -> Result<(), DbError> {
        let mut next = self.state.clone();

        for record in &batch.inserts {
            if next.works.contains_key(&record.work_code) {
                return Err(DbError::Constraint {
                    message: format!("duplicate work code {}", record.work_code),
                });
            }
            next.next_id += 1;
            next.works.insert(
                record.work_code.clone(),
                StoredWork {
                    id: next.next_id,
                    record: record.clone(),
                    assignment_status: AssignmentStatus::default(),
                },
            );
        }
        for update in &batch.coordinate_updates {
            apply_update(&mut next, update, true)?;
        }
        for update in &batch.plain_updates {
            apply_update(&mut next, update, false)?;
        }
        next.last_sync = Some(batch.synced_at);

        self.state = next;
        Ok(())
    }

    fn get_by_code(&self, work_code: &str) -> Result<Option<StoredWork>, DbError> {
        Ok(self.state.works.get(work_code).cloned())
    }

    fn count(&self) -> Result<u64, DbError> {
        Ok(self.state.works.len() as u64)
    }

    fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        Ok(self.state.last_sync)
    }

    fn missing_coordinates(&self) -> Result<Vec<MissingLocation>, DbError> {
        let mut groups: BTreeMap<(Option<String>, Option<String>), u64> = BTreeMap::new();
        for work in self.state.works.values() {
            if work.record.coordinates.is_none() {
                *groups
                    .entry((work.record.panchayat.clone(), work.record.block.clone()))
                    .or_default() += 1;
            }
        }

        let mut locations: Vec<MissingLocation> = groups
            .into_iter()
            .map(|((village, block), works)| MissingLocation {
                village,
                block,
                works,
            })
            .collect();
        locations.sort_by(|a, b| b.works.cmp(&a.works));
        Ok(locations)
    }
}

/// Coordinate cache that never touches disk.
#[derive(Debug, Default, Clone)]
pub struct MemoryCoordinateCache {
    entries: BTreeMap<LocationKey, Option<Coordinates>>,
}

impl MemoryCoordinateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache pre-filled with `entries`.
    #[must_use]
    pub fn with_entries(
        entries: impl IntoIterator<Item = (LocationKey, Option<Coordinates>)>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl CoordinateCache for MemoryCoordinateCache {
    fn get(&self, key: &LocationKey) -> Option<Option<Coordinates>> {
        self.entries.get(key).copied()
    }

    fn put(&mut self, key: LocationKey, coordinates: Option<Coordinates>) -> Result<(), DbError> {
        self.entries.insert(key, coordinates);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use dmf_works_models::WorkRecord;

    use super::*;

    fn record(code: &str, coordinates: Option<Coordinates>) -> WorkRecord {
        WorkRecord {
            work_code: code.to_string(),
            panchayat: Some("Aalnar".to_string()),
            block: Some("Geedam".to_string()),
            coordinates,
            ..WorkRecord::default()
        }
    }

    #[test]
    fn failed_batch_is_not_applied() {
        let mut store = MemoryWorkStore::new();
        let mut batch = WriteBatch::new(Utc::now());
        batch.inserts.push(record("1", None));
        batch.plain_updates.push(WorkUpdate {
            id: 42,
            record: record("2", None),
        });

        assert!(store.write_batch(&batch).is_err());
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.last_synced_at().unwrap(), None);
    }

    #[test]
    fn plain_update_keeps_stored_coordinates() {
        let mut store = MemoryWorkStore::new();
        let mut batch = WriteBatch::new(Utc::now());
        batch
            .inserts
            .push(record("1", Coordinates::checked(18.95, 81.26)));
        store.write_batch(&batch).unwrap();

        let id = store.load_index().unwrap()["1"].id;
        let mut batch = WriteBatch::new(Utc::now());
        batch.plain_updates.push(WorkUpdate {
            id,
            record: record("1", None),
        });
        store.write_batch(&batch).unwrap();

        assert_eq!(
            store.get_by_code("1").unwrap().unwrap().record.coordinates,
            Coordinates::checked(18.95, 81.26)
        );
    }

    #[test]
    fn cache_distinguishes_miss_from_unknown() {
        let mut cache = MemoryCoordinateCache::new();
        let key = LocationKey::new("Aalnar", "Geedam");
        assert_eq!(cache.get(&key), None);
        cache.put(key.clone(), None).unwrap();
        assert_eq!(cache.get(&key), Some(None));
        assert_eq!(cache.len(), 1);
    }
}
