//! Header alias registry.
//!
//! Works exports have gone through several schema revisions (English
//! labels, transliterated labels, snake_case re-exports of our own output).
//! [`ColumnMap`] lists, per logical field, every known header spelling in
//! priority order. The default registry is `columns.toml`, embedded at
//! compile time; a deployment can point at its own file instead.

use std::path::Path;

use serde::Deserialize;

use crate::SourceError;

const EMBEDDED_COLUMNS: &str = include_str!("../columns.toml");

/// Ordered header aliases for every logical field of a work record.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMap {
    /// Primary identifier columns.
    pub work_code: Vec<String>,
    /// Fallback unique-ID columns.
    pub unique_id: Vec<String>,
    /// Fallback administrative sanction number columns.
    pub as_number: Vec<String>,
    pub department: Vec<String>,
    pub financial_year: Vec<String>,
    pub block: Vec<String>,
    pub panchayat: Vec<String>,
    pub work_name: Vec<String>,
    pub work_name_brief: Vec<String>,
    pub sanctioned_amount: Vec<String>,
    pub sanctioned_date: Vec<String>,
    pub tender_date: Vec<String>,
    pub evaluation_amount: Vec<String>,
    pub agency_release_details: Vec<String>,
    pub total_released_amount: Vec<String>,
    pub amount_pending: Vec<String>,
    pub agency_name: Vec<String>,
    pub completion_timelimit_days: Vec<String>,
    pub probable_completion_date: Vec<String>,
    pub current_status: Vec<String>,
    pub work_percentage: Vec<String>,
    pub verified_on_ground: Vec<String>,
    pub inspection_date: Vec<String>,
    pub remark: Vec<String>,
    pub csv_photo_info: Vec<String>,
    pub latitude: Vec<String>,
    pub longitude: Vec<String>,
    /// Flag column marking works that are deliberately block-level.
    #[serde(default)]
    pub block_level: Vec<String>,
}

impl ColumnMap {
    /// Returns the embedded default registry.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `columns.toml` is malformed (covered by the
    /// tests below).
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(EMBEDDED_COLUMNS)
            .unwrap_or_else(|e| panic!("Failed to parse embedded columns.toml: {e}"))
    }

    /// Parses a registry from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Registry`] if the text is not a valid registry.
    pub fn from_toml_str(text: &str) -> Result<Self, SourceError> {
        Ok(toml::de::from_str(text)?)
    }

    /// Loads a registry from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Identifier alias groups in derivation priority order.
    #[must_use]
    pub fn identifier_chain(&self) -> [&[String]; 3] {
        [&self.work_code, &self.unique_id, &self.as_number]
    }
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self::embedded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_registry_parses() {
        let map = ColumnMap::embedded();
        assert_eq!(map.work_code.first().map(String::as_str), Some("Work Id Number"));
        assert!(map.block.iter().any(|a| a == "Block Name"));
        assert!(map.panchayat.iter().any(|a| a == "Gram Panchayat"));
    }

    #[test]
    fn aliases_are_stored_trimmed() {
        let map = ColumnMap::embedded();
        for alias in map
            .identifier_chain()
            .into_iter()
            .flatten()
            .chain(&map.work_name)
            .chain(&map.probable_completion_date)
        {
            assert_eq!(alias, alias.trim(), "alias {alias:?} has surrounding whitespace");
        }
    }

    #[test]
    fn rejects_incomplete_registry() {
        let err = ColumnMap::from_toml_str("work_code = [\"id\"]").unwrap_err();
        assert!(matches!(err, SourceError::Registry(_)));
    }
}
