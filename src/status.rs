//! Lifecycle status classification from the upstream end date.

use chrono::NaiveDate;

use crate::record::LifecycleStatus;

/// Parses the upstream dotted date format (`2024.01.31`).
pub fn parse_dotted_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y.%m.%d").ok()
}

/// `Archived` iff the end date is strictly before `today`.
///
/// An end date that does not parse never compares as past, so it stays `Active`.
pub fn classify(end_date: &str, today: NaiveDate) -> LifecycleStatus {
    match parse_dotted_date(end_date) {
        Some(end) if end < today => LifecycleStatus::Archived,
        _ => LifecycleStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_date_today_is_active() {
        assert_eq!(classify("2024.02.01", date(2024, 2, 1)), LifecycleStatus::Active);
    }

    #[test]
    fn end_date_yesterday_is_archived() {
        assert_eq!(classify("2024.01.31", date(2024, 2, 1)), LifecycleStatus::Archived);
    }

    #[test]
    fn future_end_date_is_active() {
        assert_eq!(classify("2024.12.31", date(2024, 2, 1)), LifecycleStatus::Active);
    }

    #[test]
    fn unparseable_end_date_is_active() {
        assert_eq!(classify("", date(2024, 2, 1)), LifecycleStatus::Active);
        assert_eq!(classify("2024-01-01", date(2024, 2, 1)), LifecycleStatus::Active);
        assert_eq!(classify("2024.13.01", date(2024, 2, 1)), LifecycleStatus::Active);
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        assert_eq!(parse_dotted_date(" 2024.01.01\n"), Some(date(2024, 1, 1)));
    }
}
