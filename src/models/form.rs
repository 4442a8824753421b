// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout form input and conversion to [`Entry`].

use crate::error::AppError;
use crate::models::Entry;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const MISSING_REQUIRED: &str = "Please enter a date and distance.";

/// Raw form values as typed by the user.
///
/// Numeric fields arrive as strings so that locale input like `5,2` can be
/// accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkoutForm {
    pub date: String,
    pub distance: String,
    pub pace_min: String,
    pub pace_sec: String,
    pub pain_start: String,
    pub pain_level: String,
    pub stretched: bool,
    pub exercised: bool,
    pub notes: String,
}

/// Pace split back into form fields for editing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct PaceParts {
    pub min: String,
    pub sec: String,
}

impl WorkoutForm {
    /// Build an entry from the form, validating required fields.
    pub fn into_entry(self, id: String, created_at: i64) -> Result<Entry, AppError> {
        let date = self.date.trim().to_string();
        let distance = parse_decimal(&self.distance);

        let distance = match distance {
            Some(d) if !date.is_empty() => d,
            _ => return Err(AppError::Validation(MISSING_REQUIRED.to_string())),
        };

        let entry = Entry {
            id,
            created_at,
            date,
            distance,
            pace: format_pace(parse_int(&self.pace_min), parse_int(&self.pace_sec)),
            pain_start: parse_decimal(&self.pain_start),
            pain_level: parse_pain_level(&self.pain_level)?,
            stretched: self.stretched,
            exercised: self.exercised,
            notes: self.notes.trim().to_string(),
        };

        entry.validate()?;
        Ok(entry)
    }
}

/// Parse a decimal accepting a comma as the decimal separator.
///
/// Only the leading number is read, so `5km` is 5. Input that does not
/// start with a number is `None`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let raw = raw.trim().replacen(',', ".", 1);
    numeric_prefix(&raw, true)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse the leading integer, ignoring anything after it (`8.5` is 8).
fn parse_int(raw: &str) -> Option<i64> {
    numeric_prefix(raw.trim(), false).parse().ok()
}

/// The longest prefix of `raw` that reads as a number: an optional sign and
/// digits, plus a fraction and exponent when `decimal` is set. Empty when
/// there are no digits.
fn numeric_prefix(raw: &str, decimal: bool) -> &str {
    let bytes = raw.as_bytes();
    let digits_from = |start: usize| {
        start + bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count()
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;

    if decimal && bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if has_digits || frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }

    if !has_digits {
        return "";
    }

    if decimal && matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    &raw[..end]
}

fn parse_pain_level(raw: &str) -> Result<u8, AppError> {
    let level = parse_int(raw).unwrap_or(0);
    u8::try_from(level)
        .ok()
        .filter(|l| *l <= 10)
        .ok_or_else(|| {
            AppError::Validation("pain level must be between 0 and 10".to_string())
        })
}

/// Format pace sub-fields as `M:SS/mi`.
///
/// Empty when neither part is given. Minutes are floored at zero and
/// seconds clamped to 0-59.
pub fn format_pace(minutes: Option<i64>, seconds: Option<i64>) -> String {
    if minutes.is_none() && seconds.is_none() {
        return String::new();
    }
    let mm = minutes.unwrap_or(0).max(0);
    let ss = seconds.unwrap_or(0).clamp(0, 59);
    format!("{}:{:02}/mi", mm, ss)
}

/// Split a stored pace (`M:SS...`) into minutes and seconds strings.
pub fn pace_parts(pace: &str) -> PaceParts {
    let Some((min, rest)) = pace.split_once(':') else {
        return PaceParts::default();
    };
    let sec: String = rest.chars().take_while(|c| c.is_ascii_digit()).take(2).collect();

    if min.is_empty() || !min.chars().all(|c| c.is_ascii_digit()) || sec.is_empty() {
        return PaceParts::default();
    }

    PaceParts {
        min: min.to_string(),
        sec,
    }
}
