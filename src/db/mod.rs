// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: the on-device store, the Firestore store, and the
//! backend interface the sync coordinator talks to.

pub mod firestore;
pub mod local;
pub mod remote;

pub use firestore::{FirestoreDb, WorkoutDocuments};
pub use local::LocalStore;
pub use remote::{RemoteSession, RemoteStore, Snapshot};

use crate::error::AppError;
use crate::models::Entry;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Per-user subcollection: `users/{uid}/workouts/{entry_id}`
    pub const WORKOUTS: &str = "workouts";
}

/// Which store currently backs the visible collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub enum BackendKind {
    Local,
    Remote,
}

/// Operations shared by every entry store.
///
/// Every write returns a `Result` so callers must acknowledge failure,
/// even where the caller's only option is to log it.
pub trait EntryBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// The backend's latest known collection. Never fails: unreadable
    /// storage or a missing snapshot yields an empty collection.
    fn snapshot(&self) -> BoxFuture<'_, Vec<Entry>>;

    /// Replace the entry with a matching id, or append it.
    fn upsert<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, Result<(), AppError>>;

    /// Remove the entry with the given id, if present.
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), AppError>>;

    /// Upsert a batch, returning how many entries were written.
    ///
    /// Stops at the first failure; earlier writes are kept.
    fn upsert_many<'a>(&'a self, entries: &'a [Entry]) -> BoxFuture<'a, Result<usize, AppError>> {
        Box::pin(async move {
            for entry in entries {
                self.upsert(entry).await?;
            }
            Ok(entries.len())
        })
    }

    /// Live snapshot channel, for backends that push changes.
    fn subscription(&self) -> Option<watch::Receiver<Snapshot>> {
        None
    }
}
