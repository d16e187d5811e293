//! Display helpers shared by the calendar, reports and CLI output.

use chrono::{NaiveDate, NaiveTime};

/// Hours with one decimal place: `1.5`.
pub fn format_hours(hours: f64) -> String {
    format!("{hours:.1}")
}

/// Percentage with one decimal place: `75.0%`.
pub fn format_percent(pct: f64) -> String {
    format!("{pct:.1}%")
}

/// Formats minutes as "Xh Ym", or "Ym" under an hour.
pub fn format_duration_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let minutes = minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// 24-hour `HH:MM`.
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// "March 2024". Falls back to the numbers for an invalid month.
pub fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1).map_or_else(
        || format!("{year}-{month:02}"),
        |first| first.format("%B %Y").to_string(),
    )
}

/// First eight characters of an ID, for compact tables.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}
