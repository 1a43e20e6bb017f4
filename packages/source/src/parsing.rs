//! Field-level coercion for spreadsheet cells.
//!
//! Nothing here fails: amounts fall back to `0.0`, dates and coordinates
//! fall back to `None`. A neutral zero amount is safe to store, a made-up
//! date is not.

use std::sync::LazyLock;

use chrono::{Datelike as _, NaiveDate, NaiveDateTime};
use regex::Regex;

use dmf_works_models::DEFAULT_STATUS;

/// Currency glyphs, unit labels, separators and the `/-` rupee suffix.
static CURRENCY_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)₹|\binr\b|\brs\.?|,|/-|\s").expect("valid regex"));

/// Date-time layouts, tried before the date-only layouts.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date layouts. Day-first layouts come before month-first ambiguity can
/// arise; ISO layouts are unambiguous.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%y", "%d-%m-%y",
    "%d.%m.%y", "%d-%b-%Y", "%d-%b-%y", "%d %b %Y", "%d %B %Y", "%d-%B-%Y",
];

/// Years outside this window are treated as parse accidents (e.g. `%Y`
/// swallowing a two-digit year).
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1950..=2100;

/// Status spellings rewritten to a canonical label. Matched
/// case-insensitively; anything else passes through.
const STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("unstarted", "Not Started"),
    ("not started", "Not Started"),
    ("prossece", "In Progress"),
];

/// Parses a currency cell such as `"₹1,20,000"` or `"45,000/-"`.
///
/// Empty, `-`, unparsable, negative and non-finite values all yield `0.0`.
#[must_use]
pub fn parse_currency(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    let cleaned = CURRENCY_NOISE_RE.replace_all(raw, "");
    if cleaned.is_empty() || cleaned == "-" {
        return 0.0;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

/// Parses a date cell, resolving `01/02/2024` as 1 February.
///
/// Accepts day-first and ISO layouts, an optional time component, and a
/// bare year (`2024` or `2024.0`, read as 1 January).
#[must_use]
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let value = raw?.trim();
    if value.is_empty() || value == "-" {
        return None;
    }

    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .filter(|d| PLAUSIBLE_YEARS.contains(&d.year()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .filter_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .find(|d| PLAUSIBLE_YEARS.contains(&d.year()))
        });

    parsed.or_else(|| {
        let year = clean_identifier(value).parse::<i32>().ok()?;
        if PLAUSIBLE_YEARS.contains(&year) {
            NaiveDate::from_ymd_opt(year, 1, 1)
        } else {
            None
        }
    })
}

/// Strips the `.0` tail that numeric-to-text conversion leaves on
/// identifiers (`"10023.0"` → `"10023"`).
#[must_use]
pub fn clean_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

/// Parses one coordinate axis. Range checks happen when both axes are
/// combined into [`dmf_works_models::Coordinates`].
#[must_use]
pub fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a whole number of days, truncating decimals. Anything unparsable
/// is `0`.
#[must_use]
pub fn parse_days(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0 && *v < 1e12)
        .map_or(0, |v| {
            #[allow(clippy::cast_possible_truncation)]
            let days = v.trunc() as i64;
            days
        })
}

/// Normalizes a status cell. Blank → `"Not Started"`; known typos are
/// rewritten; everything else is kept as written (trimmed).
#[must_use]
pub fn normalize_status(raw: Option<&str>) -> String {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_STATUS.to_string();
    };
    STATUS_SYNONYMS
        .iter()
        .find(|(synonym, _)| value.eq_ignore_ascii_case(synonym))
        .map_or_else(|| value.to_string(), |(_, canonical)| (*canonical).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_indian_grouped_amounts() {
        assert!((parse_currency(Some("₹1,20,000")) - 120_000.0).abs() < f64::EPSILON);
        assert!((parse_currency(Some("1,20,000")) - 120_000.0).abs() < f64::EPSILON);
        assert!((parse_currency(Some("Rs. 45,000/-")) - 45_000.0).abs() < f64::EPSILON);
        assert!((parse_currency(Some(" 1500.50 ")) - 1500.5).abs() < f64::EPSILON);
    }

    #[test]
    fn unusable_amounts_are_zero() {
        for raw in ["-", "", "  ", "pending", "nan", "inf", "-500"] {
            assert!(parse_currency(Some(raw)).abs() < f64::EPSILON, "{raw:?}");
        }
        assert!(parse_currency(None).abs() < f64::EPSILON);
    }

    #[test]
    fn dates_are_day_first() {
        assert_eq!(
            parse_date(Some("01/02/2024")),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(
            parse_date(Some("15-01-2024")),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_date(Some("05/03/24")),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn parses_iso_and_timestamps() {
        assert_eq!(
            parse_date(Some("2024-01-15")),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_date(Some("2024-01-15 00:00:00")),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_date(Some("12 Mar 2025")),
            NaiveDate::from_ymd_opt(2025, 3, 12)
        );
    }

    #[test]
    fn bare_year_is_first_of_january() {
        assert_eq!(parse_date(Some("2024")), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parse_date(Some("2024.0")), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn unparsable_dates_are_absent() {
        assert_eq!(parse_date(Some("soon")), None);
        assert_eq!(parse_date(Some("-")), None);
        assert_eq!(parse_date(Some("31/02/2024")), None);
        assert_eq!(parse_date(None), None);
    }

    #[test]
    fn strips_float_artifact_from_identifiers() {
        assert_eq!(clean_identifier("10023.0"), "10023");
        assert_eq!(clean_identifier(" 10023 "), "10023");
        assert_eq!(clean_identifier("DMF/10.05"), "DMF/10.05");
    }

    #[test]
    fn status_synonyms() {
        assert_eq!(normalize_status(Some("unstarted")), "Not Started");
        assert_eq!(normalize_status(Some("UNSTARTED ")), "Not Started");
        assert_eq!(normalize_status(Some("Prossece")), "In Progress");
        assert_eq!(normalize_status(Some("Completed")), "Completed");
        assert_eq!(normalize_status(None), "Not Started");
    }

    #[test]
    fn days_truncate_and_default_to_zero() {
        assert_eq!(parse_days(Some("90")), 90);
        assert_eq!(parse_days(Some("90.0")), 90);
        assert_eq!(parse_days(Some("ninety")), 0);
        assert_eq!(parse_days(None), 0);
    }

    #[test]
    fn coordinate_axes() {
        assert_eq!(parse_coordinate(Some(" 18.95 ")), Some(18.95));
        assert_eq!(parse_coordinate(Some("NaN")), None);
        assert_eq!(parse_coordinate(Some("north")), None);
    }
}
