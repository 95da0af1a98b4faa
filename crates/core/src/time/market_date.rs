use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

// Ranking dates are published on the US market clock. Fixed EST offset;
// the backend applies the same convention.
const ET_OFFSET_SECS: i32 = -5 * 3600;

const DATE_FMT: &str = "%Y-%m-%d";

/// Shift a `YYYY-MM-DD` string by `delta` civil days. Pure calendar
/// arithmetic with no time-of-day or timezone component; month, year, and
/// leap-day boundaries roll over exactly. Inputs that do not parse as a
/// calendar date are returned unchanged.
pub fn add_days(date: &str, delta: i64) -> String {
    let Ok(parsed) = NaiveDate::parse_from_str(date, DATE_FMT) else {
        return date.to_string();
    };
    match Duration::try_days(delta).and_then(|span| parsed.checked_add_signed(span)) {
        Some(shifted) => shifted.format(DATE_FMT).to_string(),
        None => date.to_string(),
    }
}

/// Today's civil date on the US-Eastern market clock, as `YYYY-MM-DD`.
/// The wall clock is injected so everything downstream stays
/// deterministic under test; callers pass `Utc::now()`.
pub fn today(now_utc: DateTime<Utc>) -> anyhow::Result<String> {
    let eastern = chrono::FixedOffset::east_opt(ET_OFFSET_SECS).context("invalid ET offset")?;
    Ok(now_utc
        .with_timezone(&eastern)
        .date_naive()
        .format(DATE_FMT)
        .to_string())
}

/// Human-readable date for headers, e.g. `2024年5月1日（水）`. Anything
/// that does not parse as a calendar date is returned unchanged.
pub fn format_display(date: &str) -> String {
    let Ok(parsed) = NaiveDate::parse_from_str(date, DATE_FMT) else {
        return date.to_string();
    };
    let weekday = match parsed.weekday() {
        Weekday::Mon => "月",
        Weekday::Tue => "火",
        Weekday::Wed => "水",
        Weekday::Thu => "木",
        Weekday::Fri => "金",
        Weekday::Sat => "土",
        Weekday::Sun => "日",
    };
    format!(
        "{}年{}月{}日（{}）",
        parsed.year(),
        parsed.month(),
        parsed.day(),
        weekday
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn add_days_crosses_leap_day() {
        assert_eq!(add_days("2024-02-28", 1), "2024-02-29");
        assert_eq!(add_days("2024-03-01", -1), "2024-02-29");
        // 2023 is not a leap year.
        assert_eq!(add_days("2023-02-28", 1), "2023-03-01");
    }

    #[test]
    fn add_days_crosses_year_boundary() {
        assert_eq!(add_days("2024-12-31", 1), "2025-01-01");
        assert_eq!(add_days("2025-01-01", -1), "2024-12-31");
    }

    #[test]
    fn add_days_round_trips() {
        for date in ["2024-01-01", "2024-02-29", "2024-07-15", "2099-12-31"] {
            for delta in [-400, -31, -1, 0, 1, 30, 365] {
                assert_eq!(add_days(&add_days(date, delta), -delta), date);
            }
        }
    }

    #[test]
    fn add_days_keeps_zero_padding() {
        assert_eq!(add_days("2024-05-09", 1), "2024-05-10");
        assert_eq!(add_days("2024-10-01", -1), "2024-09-30");
    }

    #[test]
    fn add_days_passes_garbage_through() {
        assert_eq!(add_days("", 3), "");
        assert_eq!(add_days("not-a-date", 3), "not-a-date");
        assert_eq!(add_days("2024-13-40", 3), "2024-13-40");
    }

    #[test]
    fn today_uses_eastern_civil_date() {
        // 04:00 UTC is 23:00 the previous evening in EST.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 4, 0, 0).unwrap();
        assert_eq!(today(now).unwrap(), "2026-01-04");

        // 06:00 UTC is 01:00 EST the same day.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 6, 0, 0).unwrap();
        assert_eq!(today(now).unwrap(), "2026-01-05");
    }

    #[test]
    fn format_display_renders_japanese_long_date() {
        assert_eq!(format_display("2024-05-01"), "2024年5月1日（水）");
        assert_eq!(format_display("2024-12-31"), "2024年12月31日（火）");
    }

    #[test]
    fn format_display_passes_garbage_through() {
        assert_eq!(format_display("latest"), "latest");
        assert_eq!(format_display(""), "");
    }
}
