// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync coordinator: the single entry point for reading and changing
//! workouts.
//!
//! Holds the currently active backend (local or remote) and routes every
//! operation to it. Only the identity gate switches backends, through
//! [`SyncCoordinator::activate_remote`] and
//! [`SyncCoordinator::activate_local`].

use crate::db::{BackendKind, EntryBackend, LocalStore, RemoteSession, RemoteStore, Snapshot};
use crate::error::{AppError, Result};
use crate::models::entry::entry_from_value;
use crate::models::{new_entry_id, sort_newest_first, Entry, WorkoutForm};
use crate::services::identity::Identity;
use crate::time_utils::{iso_date, now_millis};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Serialized snapshot of the visible collection.
#[derive(Debug, Clone)]
pub struct Export {
    pub filename: String,
    pub body: String,
}

/// Outcome of copying local entries into the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub copied: usize,
    pub failed: usize,
}

pub struct SyncCoordinator {
    local: Arc<LocalStore>,
    remote: Option<Arc<RemoteStore>>,
    active: RwLock<Arc<dyn EntryBackend>>,
}

impl SyncCoordinator {
    /// Create a coordinator with the local store active.
    pub fn new(local: Arc<LocalStore>, remote: Option<Arc<RemoteStore>>) -> Self {
        let active: Arc<dyn EntryBackend> = local.clone();
        Self {
            local,
            remote,
            active: RwLock::new(active),
        }
    }

    /// The on-device store, regardless of which backend is active.
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Whether a remote store is configured at all.
    pub fn sync_available(&self) -> bool {
        self.remote.is_some()
    }

    async fn active(&self) -> Arc<dyn EntryBackend> {
        self.active.read().await.clone()
    }

    pub async fn backend_kind(&self) -> BackendKind {
        self.active().await.kind()
    }

    /// Live snapshots of the active backend, if it pushes them.
    pub async fn subscription(&self) -> Option<watch::Receiver<Snapshot>> {
        self.active().await.subscription()
    }

    // ─── Backend Transitions ─────────────────────────────────────

    /// Make the remote store authoritative for `identity`.
    ///
    /// Any previous subscription is torn down before the new one opens.
    /// Returns the new subscription, or `None` when no remote store is
    /// configured (the local store stays active).
    pub async fn activate_remote(&self, identity: &Identity) -> Option<watch::Receiver<Snapshot>> {
        let Some(remote) = self.remote.clone() else {
            tracing::warn!(uid = %identity.uid, "Signed in but no remote store configured");
            return None;
        };

        let mut active = self.active.write().await;
        let snapshots = remote.subscribe(Some(&identity.uid));
        let session: Arc<dyn EntryBackend> =
            Arc::new(RemoteSession::new(remote, identity.uid.clone(), snapshots.clone()));
        *active = session;

        tracing::info!(uid = %identity.uid, "Remote backend active");
        Some(snapshots)
    }

    /// Make the local store authoritative and close any remote subscription.
    pub async fn activate_local(&self) {
        let mut active = self.active.write().await;
        if let Some(remote) = &self.remote {
            remote.unsubscribe();
        }
        let local: Arc<dyn EntryBackend> = self.local.clone();
        *active = local;

        tracing::info!("Local backend active");
    }

    // ─── Entry Operations ────────────────────────────────────────

    /// Insert or replace an entry by id in the active backend.
    pub async fn upsert_entry(&self, entry: Entry) -> Result<()> {
        let backend = self.active().await;
        backend.upsert(&entry).await.inspect_err(|e| {
            tracing::warn!(
                backend = ?backend.kind(),
                entry_id = %entry.id,
                error = %e,
                "Upsert failed"
            );
        })
    }

    /// Delete an entry by id from the active backend.
    pub async fn delete_entry(&self, id: &str) -> Result<()> {
        let backend = self.active().await;
        backend.delete(id).await.inspect_err(|e| {
            tracing::warn!(backend = ?backend.kind(), entry_id = id, error = %e, "Delete failed");
        })
    }

    /// The active backend's latest collection, newest first.
    pub async fn visible_entries(&self) -> Vec<Entry> {
        let mut entries = self.active().await.snapshot().await;
        sort_newest_first(&mut entries);
        entries
    }

    /// Look up one visible entry.
    pub async fn entry(&self, id: &str) -> Option<Entry> {
        self.active()
            .await
            .snapshot()
            .await
            .into_iter()
            .find(|e| e.id == id)
    }

    /// Save a form submission.
    ///
    /// Without `editing_id` a new entry is created with a fresh id and the
    /// current time. When editing, the id is kept and `createdAt` is taken
    /// from the existing entry (now, if it is no longer visible).
    pub async fn submit_form(&self, form: WorkoutForm, editing_id: Option<String>) -> Result<Entry> {
        let (id, created_at) = match editing_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let created_at = self
                    .entry(&id)
                    .await
                    .map(|existing| existing.created_at)
                    .unwrap_or_else(now_millis);
                (id, created_at)
            }
            None => (new_entry_id(), now_millis()),
        };

        let entry = form.into_entry(id, created_at)?;
        self.upsert_entry(entry.clone()).await?;
        Ok(entry)
    }

    /// Merge an exported file into the active backend.
    ///
    /// Each object with a non-empty string `id` replaces the stored entry
    /// with that id (or is added). Other records are skipped. Entries not
    /// mentioned in the file are untouched.
    pub async fn import_entries(&self, raw: &str) -> Result<ImportReport> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            tracing::warn!(error = %e, "Import file is not valid JSON");
            AppError::BadRequest("Failed to import file.".to_string())
        })?;

        let serde_json::Value::Array(items) = value else {
            return Err(AppError::BadRequest("Invalid file content.".to_string()));
        };

        let total = items.len();
        let entries: Vec<Entry> = items.into_iter().filter_map(entry_from_value).collect();
        let skipped = total - entries.len();

        let backend = self.active().await;
        let imported = backend.upsert_many(&entries).await.inspect_err(|e| {
            tracing::warn!(backend = ?backend.kind(), error = %e, "Import failed");
        })?;

        tracing::info!(backend = ?backend.kind(), imported, skipped, "Import complete");
        Ok(ImportReport { imported, skipped })
    }

    /// Pretty-printed JSON of the visible collection.
    pub async fn export_entries(&self) -> Result<Export> {
        let entries = self.visible_entries().await;
        let body = serde_json::to_string_pretty(&entries)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize export: {}", e)))?;

        Ok(Export {
            filename: format!("workouts_{}.json", iso_date(chrono::Utc::now())),
            body,
        })
    }

    /// Copy every local entry into the active backend, one upsert at a time.
    ///
    /// Not transactional: failures are counted and logged, and entries
    /// copied before a failure stay copied.
    pub async fn migrate_local(&self) -> MigrationReport {
        let entries = self.local.read_all();
        let backend = self.active().await;
        let mut report = MigrationReport::default();

        for entry in &entries {
            match backend.upsert(entry).await {
                Ok(()) => report.copied += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(entry_id = %entry.id, error = %e, "Failed to migrate entry");
                }
            }
        }

        tracing::info!(
            backend = ?backend.kind(),
            copied = report.copied,
            failed = report.failed,
            "Local entries migrated"
        );
        report
    }
}
