/// "Time for a new scan" decision, driven by `lastReportDate`.
use super::AppConfig;
use chrono::{DateTime, Months, Utc};
use std::time::Duration;

/// How often a long-running host should re-evaluate [`is_report_due`].
pub const REMINDER_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// User-facing reminder text.
pub const REMINDER_MESSAGE: &str =
    "It's been more than a month since your last security report. Please run a new scan.";

/// True when the last report is strictly older than one calendar month
/// before `now`. A host that never produced a report is never due.
pub fn is_report_due(config: &AppConfig, now: DateTime<Utc>) -> bool {
    let Some(last) = config.last_report_date else {
        return false;
    };
    match now.checked_sub_months(Months::new(1)) {
        Some(one_month_ago) => last < one_month_ago,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn with_last(last: Option<DateTime<Utc>>) -> AppConfig {
        AppConfig {
            keep_in_background: false,
            last_report_date: last,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    #[test]
    fn never_reported_is_not_due() {
        assert!(!is_report_due(&with_last(None), at(2026, 6, 1)));
    }

    #[test]
    fn recent_report_is_not_due() {
        assert!(!is_report_due(&with_last(Some(at(2026, 5, 20))), at(2026, 6, 1)));
    }

    #[test]
    fn exactly_one_month_is_not_yet_due() {
        assert!(!is_report_due(&with_last(Some(at(2026, 5, 1))), at(2026, 6, 1)));
    }

    #[test]
    fn older_than_a_month_is_due() {
        assert!(is_report_due(&with_last(Some(at(2026, 4, 30))), at(2026, 6, 1)));
    }

    #[test]
    fn month_end_clamps_to_shorter_month() {
        // 31 March minus one month clamps to 28 February.
        let now = at(2026, 3, 31);
        assert!(!is_report_due(&with_last(Some(at(2026, 2, 28))), now));
        assert!(is_report_due(&with_last(Some(at(2026, 2, 27))), now));
    }
}
