//! Village coordinate cache kept as a CSV file.
//!
//! Format: `location_key,latitude,longitude`, one row per village/block
//! key. A failed lookup is stored with both coordinate cells empty. The
//! file is read fully on open and rewritten fully on every flush.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dmf_works_models::{Coordinates, LocationKey};

use crate::{CoordinateCache, DbError};

const HEADER: [&str; 3] = ["location_key", "latitude", "longitude"];

/// CSV-file-backed [`CoordinateCache`].
#[derive(Debug)]
pub struct CsvCoordinateCache {
    path: PathBuf,
    entries: BTreeMap<LocationKey, Option<Coordinates>>,
    pending: usize,
    flush_every: usize,
}

impl CsvCoordinateCache {
    /// Loads the cache at `path`. A missing file is an empty cache.
    ///
    /// `flush_every` new entries trigger a rewrite of the file; `0`
    /// disables periodic flushing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file exists but cannot be read.
    pub fn open(path: &Path, flush_every: usize) -> Result<Self, DbError> {
        let entries = if path.exists() {
            read_entries(path)?
        } else {
            log::info!("No coordinate cache at {}, starting empty", path.display());
            BTreeMap::new()
        };

        log::info!(
            "Loaded {} cached village coordinates from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            pending: 0,
            flush_every,
        })
    }
}

fn parse_axis(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
}

fn read_entries(path: &Path) -> Result<BTreeMap<LocationKey, Option<Coordinates>>, DbError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers = reader.headers()?.clone();
    let position = |name: &str, fallback: usize| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .unwrap_or(fallback)
    };
    let key_idx = position(HEADER[0], 0);
    let lat_idx = position(HEADER[1], 1);
    let lon_idx = position(HEADER[2], 2);

    let mut entries = BTreeMap::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::warn!("Skipping unreadable cache row in {}: {e}", path.display());
                continue;
            }
        };

        let Some(raw_key) = record.get(key_idx).filter(|k| !k.trim().is_empty()) else {
            continue;
        };
        let coordinates = Coordinates::from_parts(
            parse_axis(record.get(lat_idx)),
            parse_axis(record.get(lon_idx)),
        );
        entries.insert(LocationKey::from_raw(raw_key), coordinates);
    }

    Ok(entries)
}

impl CoordinateCache for CsvCoordinateCache {
    fn get(&self, key: &LocationKey) -> Option<Option<Coordinates>> {
        self.entries.get(key).copied()
    }

    fn put(&mut self, key: LocationKey, coordinates: Option<Coordinates>) -> Result<(), DbError> {
        self.entries.insert(key, coordinates);
        self.pending += 1;

        if self.flush_every > 0 && self.pending >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DbError> {
        crate::paths::ensure_parent(&self.path)?;

        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(HEADER)?;
            for (key, coordinates) in &self.entries {
                let (lat, lon) = coordinates.map_or_else(
                    || (String::new(), String::new()),
                    |c| (c.latitude.to_string(), c.longitude.to_string()),
                );
                writer.write_record([key.as_str(), lat.as_str(), lon.as_str()])?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        log::debug!(
            "Flushed {} cache entries to {}",
            self.entries.len(),
            self.path.display()
        );
        self.pending = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
