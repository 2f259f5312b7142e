//! Day-first date parsing for CSV date fields.
//!
//! Strict formats are tried first against the literal string, then a looser
//! UK-style fallback covering the shapes spreadsheet exports commonly emit.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Strict day-first formats, in the order they are tried.
///
/// chrono's `%d`/`%m` accept one or two digits, so each entry covers the
/// `dd/MM/yyyy` and `d/M/yyyy` variants for its separator.
const STRICT_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Strict formats require exactly four year digits and one or two day/month digits.
static STRICT_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2}[/.\-]\d{1,2}[/.\-]\d{4}$").expect("strict date regex")
});

/// Two-digit years at or below this value land in the 2000s, the rest in the 1900s.
const TWO_DIGIT_YEAR_PIVOT: i32 = 49;

/// Day-first dates ending in a two-digit year: `26/01/55`, `26 Jan 62`, `26-Jan-62`.
static TWO_DIGIT_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}[/.\-]\d{1,2}[/.\-]|\d{1,2}[ \-][A-Za-z]+[ \-])(\d{2})$")
        .expect("two-digit year regex")
});

/// `%Y` accepts short years, so the four-digit fallbacks require one.
static FOUR_DIGIT_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\D)\d{4}(\D|$)").expect("four-digit year regex")
});

/// Date-only fallback formats for the UK locale.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%B-%Y",
];

/// Date-with-time fallback formats; the time part is discarded.
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a day-first date. Returns `None` for blank or unrecognised input.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    parse_strict(value)
        .or_else(|| parse_two_digit_year(value))
        .or_else(|| parse_fallback(value))
}

fn parse_strict(value: &str) -> Option<NaiveDate> {
    if !STRICT_SHAPE_RE.is_match(value) {
        return None;
    }
    STRICT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Expand the trailing two-digit year around the pivot, then parse as four-digit.
fn parse_two_digit_year(value: &str) -> Option<NaiveDate> {
    let caps = TWO_DIGIT_YEAR_RE.captures(value)?;
    let yy: i32 = caps[2].parse().ok()?;
    let year = if yy <= TWO_DIGIT_YEAR_PIVOT {
        2000 + yy
    } else {
        1900 + yy
    };
    let expanded = format!("{}{year}", &caps[1]);
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&expanded, fmt).ok())
}

fn parse_fallback(value: &str) -> Option<NaiveDate> {
    if !FOUR_DIGIT_YEAR_RE.is_match(value) {
        return None;
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            FALLBACK_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn strict_formats_agree() {
        for input in [
            "1/3/1990",
            "01/03/1990",
            "1/03/1990",
            "01/3/1990",
            "1-3-1990",
            "01-03-1990",
            "1.3.1990",
            "01.03.1990",
        ] {
            assert_eq!(parse_date(input), Some(ymd(1990, 3, 1)), "input {input}");
        }
    }

    #[test]
    fn day_comes_first() {
        assert_eq!(parse_date("26/01/1955"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("18/04/2013"), Some(ymd(2013, 4, 18)));
        assert_eq!(parse_date("01/26/1955"), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_date("  26/01/1955 "), Some(ymd(1955, 1, 26)));
    }

    #[test]
    fn fallback_shapes() {
        assert_eq!(parse_date("1955-01-26"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("26 Jan 1955"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("26 January 1955"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("26-Jan-1955"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("26/01/1955 00:00:00"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("18/04/2013 09:30"), Some(ymd(2013, 4, 18)));
        assert_eq!(parse_date("18/04/13"), Some(ymd(2013, 4, 18)));
    }

    #[test]
    fn two_digit_years_pivot_at_2049() {
        assert_eq!(parse_date("26/01/55"), Some(ymd(1955, 1, 26)));
        assert_eq!(parse_date("01/05/62"), Some(ymd(1962, 5, 1)));
        assert_eq!(parse_date("26 Jan 62"), Some(ymd(1962, 1, 26)));
        assert_eq!(parse_date("26-Jan-62"), Some(ymd(1962, 1, 26)));
        assert_eq!(parse_date("1.3.90"), Some(ymd(1990, 3, 1)));
        assert_eq!(parse_date("26/01/49"), Some(ymd(2049, 1, 26)));
        assert_eq!(parse_date("26/01/50"), Some(ymd(1950, 1, 26)));
        assert_eq!(parse_date("26/01/00"), Some(ymd(2000, 1, 26)));
    }

    #[test]
    fn short_years_never_parse_as_four_digit() {
        assert_eq!(parse_date("62-01-26"), None);
        assert_eq!(parse_date("26/01/5"), None);
        assert_eq!(parse_date("26/01/055"), None);
        assert_eq!(parse_date("26/01/55 10:30"), None);
    }

    #[test]
    fn rejects_garbage_and_impossible_dates() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("31/02/1990"), None);
        assert_eq!(parse_date("1/3/1990/"), None);
        assert_eq!(parse_date("12/13/1990"), None);
    }
}
