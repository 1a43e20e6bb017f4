//! Query variants for a village/block pair.
//!
//! Gram panchayat names are often missing from `OpenStreetMap` under their
//! exact sheet spelling, so a lookup walks from the most specific query to
//! the loosest one.

/// District and state names appended to queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region<'a> {
    pub district: &'a str,
    pub state: &'a str,
}

/// Builds the ordered, de-duplicated query list for one location.
///
/// ```
/// use dmf_works_geocoder::query::{Region, query_variants};
///
/// let region = Region { district: "Dantewada", state: "Chhattisgarh" };
/// let queries = query_variants("AALNAR", "GEEDAM", &region);
/// assert_eq!(queries[0], "AALNAR, GEEDAM");
/// assert_eq!(queries[2], "Aalnar, Geedam");
/// ```
#[must_use]
pub fn query_variants(village: &str, block: &str, region: &Region<'_>) -> Vec<String> {
    let v = village.trim();
    let b = block.trim();
    let tv = title_case(v);
    let tb = title_case(b);
    let Region { district, state } = region;

    let mut candidates = Vec::with_capacity(7);
    if !b.is_empty() {
        candidates.push(format!("{v}, {b}"));
        candidates.push(format!("{v}, {b}, {district}"));
        candidates.push(format!("{tv}, {tb}"));
        candidates.push(format!("{tv}, {tb}, {district}, {state}"));
    }
    candidates.push(format!("{tv}, {district}"));
    candidates.push(format!("{tv}, {state}"));
    candidates.push(tv);

    let mut queries: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !queries.contains(&candidate) {
            queries.push(candidate);
        }
    }
    queries
}

/// Uppercases the first letter of each word and lowercases the rest.
#[must_use]
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
