//! Village coordinate cache stored in `DuckDB`.
//!
//! Caches both successful geocodes (with coordinates) and failed lookups
//! (null coordinates) so we don't re-query the same villages. Entries are
//! loaded into memory on open and written through on every `put`.

use std::collections::BTreeMap;
use std::path::Path;

use dmf_works_models::{Coordinates, LocationKey};
use duckdb::Connection;

use crate::{CoordinateCache, DbError};

/// `DuckDB`-backed [`CoordinateCache`].
pub struct DuckDbCoordinateCache {
    conn: Connection,
    entries: BTreeMap<LocationKey, Option<Coordinates>>,
}

impl DuckDbCoordinateCache {
    /// Opens (or creates) the cache database and loads every entry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection, schema creation or load fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        crate::paths::ensure_parent(path)?;
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        let entries = load_entries(&conn)?;
        log::info!("Loaded {} cached village coordinates", entries.len());
        Ok(Self { conn, entries })
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS geocode_cache (
            location_key TEXT PRIMARY KEY,
            latitude DOUBLE,
            longitude DOUBLE,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

fn load_entries(conn: &Connection) -> Result<BTreeMap<LocationKey, Option<Coordinates>>, DbError> {
    let mut stmt = conn.prepare("SELECT location_key, latitude, longitude FROM geocode_cache")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<f64>>(1)?,
            row.get::<_, Option<f64>>(2)?,
        ))
    })?;

    let mut entries = BTreeMap::new();
    for row in rows {
        let (key, lat, lon) = row?;
        entries.insert(LocationKey::from_raw(&key), Coordinates::from_parts(lat, lon));
    }
    Ok(entries)
}

impl CoordinateCache for DuckDbCoordinateCache {
    fn get(&self, key: &LocationKey) -> Option<Option<Coordinates>> {
        self.entries.get(key).copied()
    }

    fn put(&mut self, key: LocationKey, coordinates: Option<Coordinates>) -> Result<(), DbError> {
        let lat = coordinates.map(|c| c.latitude);
        let lon = coordinates.map(|c| c.longitude);
        let result = self.conn.execute(
            "INSERT INTO geocode_cache (location_key, latitude, longitude)
             VALUES (?, ?, ?)
             ON CONFLICT (location_key) DO UPDATE SET
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude",
            duckdb::params![key.as_str(), lat, lon],
        );
        self.entries.insert(key, coordinates);
        result?;
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
    use super::*;

    #[test]
    fn writes_through_and_reloads() {
        let path = std::env::temp_dir().join(format!(
            "dmf_works_geocode_cache_{}.duckdb",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let mut cache = DuckDbCoordinateCache::open(&path).unwrap();
            cache
                .put(LocationKey::new("Aalnar", "Geedam"), Coordinates::checked(18.95, 81.26))
                .unwrap();
            cache.put(LocationKey::new("Kota", "Geedam"), None).unwrap();
            cache
                .put(LocationKey::new("Kota", "Geedam"), Coordinates::checked(18.9, 81.3))
                .unwrap();
        }

        let cache = DuckDbCoordinateCache::open(&path).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get(&LocationKey::new("KOTA", "GEEDAM")),
            Some(Coordinates::checked(18.9, 81.3))
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn records_misses() {
        let mut cache = DuckDbCoordinateCache::open_in_memory().unwrap();
        cache.put(LocationKey::new("Kota", "Geedam"), None).unwrap();
        assert_eq!(cache.get(&LocationKey::new("Kota", "Geedam")), Some(None));
    }
}
