// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Workout Log: a personal workout journal with optional account sync.
//!
//! Entries live on the device by default. Signing in with Google switches
//! the app to a per-user Firestore collection and offers to copy local
//! entries into an empty account.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{AssetCache, IdentityGate, SyncCoordinator};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<SyncCoordinator>,
    pub identity: Arc<IdentityGate>,
    pub assets: AssetCache,
}
