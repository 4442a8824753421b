// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod entry;
pub mod form;

pub use entry::{new_entry_id, sort_newest_first, Entry};
pub use form::{PaceParts, WorkoutForm};
