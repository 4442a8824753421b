// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout entry model for storage and API.

use crate::time_utils::now_millis;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// One logged workout.
///
/// Stored both in the local collection and as one Firestore document per
/// entry. Everything except `id` has a default so that older or partial
/// records still load; form submissions are validated separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct Entry {
    /// Stable identifier (also used as document ID)
    pub id: String,
    /// Creation time in epoch millis; never changes after the first write
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub created_at: i64,
    /// Workout date (`YYYY-MM-DD`)
    #[serde(default)]
    #[validate(length(min = 1, message = "date is required"))]
    pub date: String,
    /// Distance in miles
    #[serde(default)]
    #[validate(range(min = 0.0, message = "distance must not be negative"))]
    pub distance: f64,
    /// Pace as `M:SS/mi`, or empty
    #[serde(default)]
    pub pace: String,
    /// Distance into the run where pain began
    #[serde(default)]
    #[validate(range(min = 0.0, message = "pain start must not be negative"))]
    pub pain_start: Option<f64>,
    /// Pain level 0-10
    #[serde(default)]
    #[validate(range(max = 10, message = "pain level must be between 0 and 10"))]
    pub pain_level: u8,
    #[serde(default)]
    pub stretched: bool,
    #[serde(default)]
    pub exercised: bool,
    #[serde(default)]
    pub notes: String,
}

impl Entry {
    /// Create an empty entry with the given identity.
    pub fn new(id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            created_at,
            date: String::new(),
            distance: 0.0,
            pace: String::new(),
            pain_start: None,
            pain_level: 0,
            stretched: false,
            exercised: false,
            notes: String::new(),
        }
    }
}

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a fresh identifier for a locally created entry.
///
/// Format: `w_<epoch millis>_<8 hex>`. The suffix comes from the system
/// RNG, with a process-local counter mixed in if the RNG is unavailable.
pub fn new_entry_id() -> String {
    let mut suffix = [0u8; 4];
    if SystemRandom::new().fill(&mut suffix).is_err() {
        tracing::warn!("System RNG unavailable, using counter for entry id suffix");
        suffix = ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes();
    }
    format!("w_{}_{}", now_millis(), hex::encode(suffix))
}

/// Sort entries newest first by `createdAt`.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Decode a JSON value as an entry, rejecting records without a usable id.
///
/// Returns `None` for non-objects, missing/empty/non-string ids, and
/// records whose fields have the wrong shape.
pub fn entry_from_value(value: serde_json::Value) -> Option<Entry> {
    let has_id = value
        .as_object()
        .and_then(|obj| obj.get("id"))
        .and_then(|id| id.as_str())
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        return None;
    }
    serde_json::from_value(value).ok()
}
