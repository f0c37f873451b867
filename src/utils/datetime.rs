use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// The most recent Sunday on or before `day`; the sheet's weeks start on Sunday.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

/// Short day/month form used in notification lines.
pub fn format_event_date(date: NaiveDate) -> String {
    date.format("%d/%m").to_string()
}

/// Parses a weekday name such as `wed` or `Wednesday`.
pub fn parse_weekday(input: &str) -> Result<Weekday> {
    input
        .trim()
        .parse::<Weekday>()
        .map_err(|_| anyhow!("Invalid weekday '{}'", input.trim()))
}
