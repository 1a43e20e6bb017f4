#![allow(clippy::module_name_repetitions)]
//! Path helpers for the store and cache files.

use std::path::Path;

/// Returns `true` when `path` names a `DuckDB` file.
#[must_use]
pub fn is_duckdb_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("duckdb") || e.eq_ignore_ascii_case("db"))
}

/// Ensures the parent directory of `path` exists.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
