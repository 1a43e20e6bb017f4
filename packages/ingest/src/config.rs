//! Pipeline configuration loading.
//!
//! Precedence, lowest first: built-in defaults, the TOML file named by
//! `--config` or `DMF_WORKS_CONFIG`, then individual environment
//! overrides.

use std::path::{Path, PathBuf};

use dmf_works_ingest_models::PipelineConfig;

use crate::IngestError;

/// Names the config file when `--config` is not given.
pub const CONFIG_ENV: &str = "DMF_WORKS_CONFIG";

const DB_ENV: &str = "DMF_WORKS_DB";
const CACHE_ENV: &str = "DMF_WORKS_CACHE";
const SHEET_URL_ENV: &str = "DMF_WORKS_SHEET_URL";
const SHEET_NAME_ENV: &str = "DMF_WORKS_SHEET_NAME";

/// Parses a config file. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be read or is not valid TOML.
pub fn from_path(path: &Path) -> Result<PipelineConfig, IngestError> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::de::from_str(&text)?)
}

/// Loads the effective configuration.
///
/// # Errors
///
/// Returns [`IngestError`] if a config file was named but cannot be loaded.
pub fn load(cli_path: Option<&Path>) -> Result<PipelineConfig, IngestError> {
    let path = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let config = match path {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            from_path(&path)?
        }
        None => PipelineConfig::default(),
    };

    Ok(apply_overrides(config, |name| std::env::var(name).ok()))
}

/// Applies the environment overrides, reading variables through `var`.
pub fn apply_overrides(
    mut config: PipelineConfig,
    var: impl Fn(&str) -> Option<String>,
) -> PipelineConfig {
    let lookup = |name: &str| var(name).filter(|v| !v.trim().is_empty());

    if let Some(db) = lookup(DB_ENV) {
        config.database_path = PathBuf::from(db);
    }
    if let Some(cache) = lookup(CACHE_ENV) {
        config.cache_path = PathBuf::from(cache);
    }
    if let Some(url) = lookup(SHEET_URL_ENV) {
        config.sheet.url = Some(url);
    }
    if let Some(name) = lookup(SHEET_NAME_ENV) {
        config.sheet.name = name;
    }
    config
}
