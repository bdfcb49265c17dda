// ⏳ Periods - reporting windows of a record table
//
// A period is "<timerange> months ended on <timestamp>". Both parts are kept
// as header text so malformed headers survive until validation reports them.

use crate::cell::{Cell, TextCell};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMERANGE: &str = "0";
pub const DEFAULT_TIMESTAMP: &str = "0001-01-01";
/// Timerange text for "no specific period length"
pub const NO_TIMERANGE: &str = "none";

const HEADER_SEPARATOR: &str = " months ended on ";

// ============================================================================
// PERIOD
// ============================================================================

/// Caller-supplied metadata for a new or edited column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodSpec {
    pub timerange: String,
    pub timestamp: String,
}

impl PeriodSpec {
    pub fn new(timerange: impl Into<String>, timestamp: impl Into<String>) -> Self {
        PeriodSpec {
            timerange: timerange.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn months(months: i64, timestamp: impl Into<String>) -> Self {
        PeriodSpec::new(months.to_string(), timestamp)
    }

    /// Parse a header label like `"3 months ended on 2020-06"`.
    pub fn parse_header(label: &str) -> Option<Self> {
        let (timerange, timestamp) = label.trim().split_once(HEADER_SEPARATOR)?;
        Some(PeriodSpec::new(timerange.trim(), timestamp.trim()))
    }
}

impl Default for PeriodSpec {
    fn default() -> Self {
        PeriodSpec::new(DEFAULT_TIMERANGE, DEFAULT_TIMESTAMP)
    }
}

/// A column header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub id: u32,
    pub timerange: TextCell,
    pub timestamp: TextCell,
}

impl Period {
    pub fn new(id: u32, spec: &PeriodSpec) -> Self {
        Period {
            id,
            timerange: TextCell::new(&spec.timerange),
            timestamp: TextCell::new(&spec.timestamp),
        }
    }

    pub fn update(&mut self, spec: &PeriodSpec) {
        self.timerange.set(&spec.timerange);
        self.timestamp.set(&spec.timestamp);
    }

    /// Length in months, `None` for `"none"` or malformed text.
    pub fn months(&self) -> Option<i64> {
        parse_timerange(self.timerange.get())
    }

    pub fn timestamp_normalized(&self) -> String {
        normalize_timestamp(self.timestamp.get())
    }

    pub fn timerange_is_valid(&self) -> bool {
        self.months().is_some()
    }

    pub fn timestamp_is_valid(&self) -> bool {
        is_valid_timestamp(self.timestamp.get())
    }

    pub fn label(&self) -> String {
        format!(
            "{}{}{}",
            self.timerange.get(),
            HEADER_SEPARATOR,
            self.timestamp.get()
        )
    }

    pub fn spec(&self) -> PeriodSpec {
        PeriodSpec::new(self.timerange.get(), self.timestamp.get())
    }
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

pub fn parse_timerange(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Last calendar day of the given month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Month a timestamp refers to. Accepts `YYYY-MM` and `YYYY-MM-DD`; month
/// and day may be a single digit (`2020-6`). Trailing text is rejected.
fn parse_month(text: &str) -> Option<(i32, u32)> {
    let text = text.trim();
    match text.matches('-').count() {
        1 => {
            let first = NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d").ok()?;
            Some((first.year(), first.month()))
        }
        2 => {
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
            Some((date.year(), date.month()))
        }
        _ => None,
    }
}

/// Expand a timestamp to the last day of its month (`YYYY-MM-DD`).
/// Text that is not a month or a date passes through unchanged.
pub fn normalize_timestamp(text: &str) -> String {
    match parse_month(text).and_then(|(year, month)| last_day_of_month(year, month)) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => text.to_string(),
    }
}

pub fn is_valid_timestamp(text: &str) -> bool {
    NaiveDate::parse_from_str(&normalize_timestamp(text), "%Y-%m-%d").is_ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_month_to_month_end() {
        assert_eq!(normalize_timestamp("2020-06"), "2020-06-30");
        assert_eq!(normalize_timestamp("2020-02"), "2020-02-29");
        assert_eq!(normalize_timestamp("2019-02"), "2019-02-28");
        assert_eq!(normalize_timestamp("2020-12"), "2020-12-31");
    }

    #[test]
    fn test_normalize_full_date_snaps_to_month_end() {
        assert_eq!(normalize_timestamp("2020-06-15"), "2020-06-30");
        assert_eq!(normalize_timestamp("2021-03-31"), "2021-03-31");
    }

    #[test]
    fn test_normalize_passes_through_garbage() {
        assert_eq!(normalize_timestamp("last quarter"), "last quarter");
        assert_eq!(normalize_timestamp("2020-13"), "2020-13");
        assert_eq!(normalize_timestamp(""), "");
    }

    #[test]
    fn test_normalize_single_digit_month() {
        assert_eq!(normalize_timestamp("2020-6"), "2020-06-30");
        assert_eq!(normalize_timestamp("2020-6-5"), "2020-06-30");
        assert_eq!(normalize_timestamp("2020-06 Q2"), "2020-06 Q2");
        assert!(is_valid_timestamp("2021-2"));
        assert!(!is_valid_timestamp("2020-06x"));
    }

    #[test]
    fn test_timestamp_validity() {
        assert!(is_valid_timestamp("2020-06"));
        assert!(is_valid_timestamp("0001-01-01"));
        assert!(!is_valid_timestamp("2020-02-30"));
        assert!(!is_valid_timestamp("June 2020"));
    }

    #[test]
    fn test_timerange() {
        assert_eq!(parse_timerange("12"), Some(12));
        assert_eq!(parse_timerange(" 3 "), Some(3));
        assert_eq!(parse_timerange(NO_TIMERANGE), None);
        assert_eq!(parse_timerange("3.5"), None);
    }

    #[test]
    fn test_period_defaults_and_label() {
        let period = Period::new(0, &PeriodSpec::default());

        assert_eq!(period.months(), Some(0));
        assert!(period.timestamp_is_valid());
        assert_eq!(period.label(), "0 months ended on 0001-01-01");
    }

    #[test]
    fn test_parse_header_label() {
        let spec = PeriodSpec::parse_header("3 months ended on 2020-06").unwrap();
        assert_eq!(spec, PeriodSpec::months(3, "2020-06"));

        let spec = PeriodSpec::parse_header("none months ended on 2020-12-31").unwrap();
        assert_eq!(spec.timerange, "none");

        assert!(PeriodSpec::parse_header("Q2 2020").is_none());
    }

    #[test]
    fn test_period_update() {
        let mut period = Period::new(4, &PeriodSpec::default());
        period.update(&PeriodSpec::new(" 6 ", "2021-06"));

        assert_eq!(period.id, 4);
        assert_eq!(period.months(), Some(6));
        assert_eq!(period.timestamp_normalized(), "2021-06-30");
    }
}
