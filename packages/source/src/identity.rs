//! Work-code derivation and in-batch deduplication.

use std::collections::BTreeSet;

use crate::columns::ColumnMap;
use crate::parsing::clean_identifier;
use crate::{RawRow, first_match};

/// Derives the work code for a row.
///
/// Tries the primary identifier columns, then unique-ID columns, then the
/// sanction number. The winning value is identifier-cleaned; a value that
/// cleans to nothing counts as absent.
#[must_use]
pub fn resolve_work_code(row: &RawRow, columns: &ColumnMap) -> Option<String> {
    first_match(columns.identifier_chain(), |aliases| {
        row.first(aliases)
            .map(clean_identifier)
            .filter(|code| !code.is_empty())
    })
}

/// Tracks codes already admitted in the current batch. First occurrence
/// wins.
#[derive(Debug, Default)]
pub struct BatchDeduper {
    seen: BTreeSet<String>,
}

impl BatchDeduper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `code` is seen and `false` afterwards.
    pub fn admit(&mut self, code: &str) -> bool {
        if self.seen.contains(code) {
            false
        } else {
            self.seen.insert(code.to_owned());
            true
        }
    }

    /// Number of distinct codes admitted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
