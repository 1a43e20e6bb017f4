//! District profile: names used in geocoding queries, block centroids and
//! hand-researched village overrides.
//!
//! The default profile is `district.toml`, embedded at compile time.

use std::collections::BTreeMap;
use std::path::Path;

use dmf_works_geocoder::query::Region;
use dmf_works_models::{Coordinates, LocationKey};
use serde::Deserialize;

use crate::IngestError;

const EMBEDDED_DISTRICT: &str = include_str!("../district.toml");

#[derive(Debug, Clone, Copy, Deserialize)]
struct PointDef {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    district: String,
    state: String,
    #[serde(default)]
    centroids: BTreeMap<String, PointDef>,
    #[serde(default)]
    overrides: BTreeMap<String, PointDef>,
}

/// Parsed and validated district profile.
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictProfile {
    pub district: String,
    pub state: String,
    /// Uppercased block name → centroid.
    centroids: BTreeMap<String, Coordinates>,
    overrides: BTreeMap<LocationKey, Coordinates>,
}

fn validate(name: &str, point: PointDef) -> Result<Coordinates, IngestError> {
    Coordinates::checked(point.latitude, point.longitude).ok_or_else(|| IngestError::District {
        message: format!(
            "{name}: invalid point ({}, {})",
            point.latitude, point.longitude
        ),
    })
}

impl DistrictProfile {
    /// Returns the embedded default profile.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `district.toml` is malformed.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(EMBEDDED_DISTRICT)
            .unwrap_or_else(|e| panic!("Failed to parse embedded district.toml: {e}"))
    }

    /// Parses a profile from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the text does not parse or a point is out
    /// of range.
    pub fn from_toml_str(text: &str) -> Result<Self, IngestError> {
        let file: ProfileFile = toml::de::from_str(text)?;

        let mut centroids = BTreeMap::new();
        for (block, point) in file.centroids {
            let point = validate(&block, point)?;
            centroids.insert(block.trim().to_uppercase(), point);
        }

        let mut overrides = BTreeMap::new();
        for (key, point) in file.overrides {
            let point = validate(&key, point)?;
            overrides.insert(LocationKey::from_raw(&key), point);
        }

        Ok(Self {
            district: file.district,
            state: file.state,
            centroids,
            overrides,
        })
    }

    /// Loads a profile from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Centroid of `block`, matched case-insensitively.
    #[must_use]
    pub fn block_centroid(&self, block: &str) -> Option<Coordinates> {
        self.centroids.get(&block.trim().to_uppercase()).copied()
    }

    #[must_use]
    pub fn manual_override(&self, key: &LocationKey) -> Option<Coordinates> {
        self.overrides.get(key).copied()
    }

    /// District and state names for geocoding query variants.
    #[must_use]
    pub fn region(&self) -> Region<'_> {
        Region {
            district: &self.district,
            state: &self.state,
        }
    }
}

impl Default for DistrictProfile {
    fn default() -> Self {
        Self::embedded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_profile_parses() {
        let profile = DistrictProfile::embedded();
        assert_eq!(profile.district, "Dantewada");
        assert_eq!(profile.state, "Chhattisgarh");
        assert_eq!(
            profile.block_centroid("Geedam"),
            Coordinates::checked(18.9748, 81.3938)
        );
        assert_eq!(
            profile.manual_override(&LocationKey::new("Badegadam", "Katekalyan")),
            Coordinates::checked(18.71118, 81.66386)
        );
    }

    #[test]
    fn centroid_lookup_ignores_case_and_padding() {
        let profile = DistrictProfile::embedded();
        assert!(profile.block_centroid(" katekalyan ").is_some());
        assert!(profile.block_centroid("Bastar").is_none());
    }

    #[test]
    fn rejects_out_of_range_points() {
        let err = DistrictProfile::from_toml_str(
            "district = \"D\"\nstate = \"S\"\n[centroids]\nX = { latitude = 95.0, longitude = 81.0 }\n",
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::District { .. }));
    }
}
