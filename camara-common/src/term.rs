//! Legislative term banding
//!
//! Each legislative year maps to exactly one four-year legislative term.
//! Years outside the supported window are rejected before any I/O happens.

use std::ops::RangeInclusive;

/// Years the ingestion pipeline accepts.
pub const SUPPORTED_YEARS: RangeInclusive<i32> = 2011..=2027;

/// The full set of terms spanning the supported years, oldest first.
/// Party ingestion merges rosters across all of these.
pub const TARGET_TERMS: [i64; 4] = [54, 55, 56, 57];

/// Map a legislative year onto its term id.
///
/// Returns `None` for years outside 2011-2027; callers treat that as a
/// hard input-validation failure.
pub fn term_for_year(year: i32) -> Option<i64> {
    match year {
        2011..=2014 => Some(54),
        2015..=2018 => Some(55),
        2019..=2022 => Some(56),
        2023..=2027 => Some(57),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_band_edges_onto_terms() {
        assert_eq!(term_for_year(2011), Some(54));
        assert_eq!(term_for_year(2014), Some(54));
        assert_eq!(term_for_year(2015), Some(55));
        assert_eq!(term_for_year(2018), Some(55));
        assert_eq!(term_for_year(2019), Some(56));
        assert_eq!(term_for_year(2022), Some(56));
        assert_eq!(term_for_year(2023), Some(57));
        assert_eq!(term_for_year(2027), Some(57));
    }

    #[test]
    fn rejects_years_outside_supported_window() {
        assert_eq!(term_for_year(2010), None);
        assert_eq!(term_for_year(2028), None);
        assert_eq!(term_for_year(1999), None);
    }

    #[test]
    fn supported_years_agree_with_banding() {
        for year in SUPPORTED_YEARS {
            assert!(term_for_year(year).is_some(), "year {} should map", year);
        }
    }
}
