// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, Days, Local, NaiveDate, Utc};

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Today's date in the server's local timezone (form default).
pub fn today_local() -> String {
    format_date(Local::now().date_naive())
}

/// Yesterday's date in the server's local timezone.
pub fn yesterday_local() -> String {
    let today = Local::now().date_naive();
    format_date(today.checked_sub_days(Days::new(1)).unwrap_or(today))
}

/// ISO date of a UTC timestamp, used to stamp export filenames.
pub fn iso_date(at: DateTime<Utc>) -> String {
    format_date(at.date_naive())
}
