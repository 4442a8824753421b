// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-device entry storage.
//!
//! The whole collection lives under one namespaced key, stored as a JSON
//! array in `<data_dir>/<key>.json`. Reads fail soft: a missing, unreadable
//! or malformed file is an empty collection. Array items that are not
//! entries are hidden from readers but kept by upserts and deletes. Writes
//! go through a temp file and a rename so readers never see a partial array.
//!
//! Only one process is expected to use a data directory at a time; two
//! processes writing the same key can lose each other's updates.

use crate::db::{BackendKind, EntryBackend};
use crate::error::AppError;
use crate::models::entry::{entry_from_value, Entry};
use futures_util::future::{self, BoxFuture};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key the workout collection is stored under.
pub const STORAGE_KEY: &str = "workouts_v1";

/// Durable key-value store holding one entry collection.
pub struct LocalStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Open the workout collection in `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::with_key(data_dir, STORAGE_KEY)
    }

    /// Open an arbitrary key in `data_dir`.
    pub fn with_key<P: AsRef<Path>>(data_dir: P, key: &str) -> Self {
        let file_name = format!("{}.json", urlencoding::encode(key));
        Self {
            path: data_dir.as_ref().join(file_name),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted collection.
    pub fn read_all(&self) -> Vec<Entry> {
        self.try_read_all().unwrap_or_default()
    }

    /// Read the persisted collection, or `None` when nothing usable has
    /// been stored under this key (missing, unreadable or malformed file).
    pub fn try_read_all(&self) -> Option<Vec<Entry>> {
        self.read_raw().map(|(entries, _)| entries)
    }

    /// Split the stored array into entries and records that are not entries.
    /// The latter are not shown but are written back untouched.
    fn read_raw(&self) -> Option<(Vec<Entry>, Vec<serde_json::Value>)> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Unreadable local store, treating as empty");
                return None;
            }
        };

        if raw.trim().is_empty() {
            return None;
        }

        let items = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Local store is not a JSON array, treating as empty");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Local store is not valid JSON, treating as empty");
                return None;
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        let mut others = Vec::new();
        for item in items {
            match entry_from_value(item.clone()) {
                Some(entry) => entries.push(entry),
                None => others.push(item),
            }
        }
        if !others.is_empty() {
            tracing::warn!(
                path = %self.path.display(),
                unknown = others.len(),
                "Local store has records that are not entries, keeping them as-is"
            );
        }
        Some((entries, others))
    }

    /// Overwrite the persisted collection.
    pub fn write_all(&self, entries: &[Entry]) -> Result<(), AppError> {
        let _guard = self.lock();
        self.write_unlocked(entries, Vec::new())
    }

    /// Replace the entry with a matching id, or append it.
    pub fn upsert(&self, entry: &Entry) -> Result<(), AppError> {
        self.upsert_all(std::slice::from_ref(entry)).map(|_| ())
    }

    /// Merge a batch by id with a single read and a single write.
    ///
    /// Later records in `entries` win over earlier ones with the same id.
    pub fn upsert_all(&self, entries: &[Entry]) -> Result<usize, AppError> {
        let _guard = self.lock();
        let (mut items, others) = self.read_raw().unwrap_or_default();
        let mut index: HashMap<String, usize> = items
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        for entry in entries {
            match index.get(&entry.id) {
                Some(&i) => items[i] = entry.clone(),
                None => {
                    index.insert(entry.id.clone(), items.len());
                    items.push(entry.clone());
                }
            }
        }

        self.write_unlocked(&items, others)?;
        Ok(entries.len())
    }

    /// Remove the entry with the given id.
    pub fn delete(&self, id: &str) -> Result<(), AppError> {
        let _guard = self.lock();
        let (mut items, others) = self.read_raw().unwrap_or_default();
        let before = items.len();
        items.retain(|e| e.id != id);
        if items.len() == before {
            tracing::debug!(id, "Delete of unknown local entry");
        }
        self.write_unlocked(&items, others)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no bad state.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_unlocked(
        &self,
        entries: &[Entry],
        others: Vec<serde_json::Value>,
    ) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let serialize_err =
            |e: serde_json::Error| AppError::Storage(format!("Failed to serialize entries: {}", e));
        let body = if others.is_empty() {
            serde_json::to_string(entries).map_err(serialize_err)?
        } else {
            let mut items = entries
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()
                .map_err(serialize_err)?;
            items.extend(others);
            serde_json::to_string(&items).map_err(serialize_err)?
        };

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(count = entries.len(), path = %self.path.display(), "Local store written");
        Ok(())
    }
}

impl EntryBackend for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn snapshot(&self) -> BoxFuture<'_, Vec<Entry>> {
        Box::pin(future::ready(self.read_all()))
    }

    fn upsert<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(future::ready(LocalStore::upsert(self, entry)))
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(future::ready(LocalStore::delete(self, id)))
    }

    fn upsert_many<'a>(&'a self, entries: &'a [Entry]) -> BoxFuture<'a, Result<usize, AppError>> {
        Box::pin(future::ready(self.upsert_all(entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, created_at: i64, notes: &str) -> Entry {
        let mut e = Entry::new(id, created_at);
        e.date = "2025-01-01".to_string();
        e.notes = notes.to_string();
        e
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());
        assert!(store.read_all().is_empty());
    }

    #[test]
    fn test_malformed_content_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());

        for raw in ["not json", "{\"id\":\"1\"}", "42", ""] {
            fs::write(store.path(), raw).unwrap();
            assert!(store.read_all().is_empty(), "content {:?}", raw);
        }
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());
        fs::write(store.path(), r#"[{"notes":"no id"},{"id":"2","notes":"ok"},7]"#).unwrap();

        let items = store.read_all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "2");
    }

    #[test]
    fn test_unknown_records_survive_write_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());
        fs::write(store.path(), r#"[{"notes":"no id"},{"id":"2","notes":"ok"},7]"#).unwrap();

        store.upsert(&entry("3", 3, "new")).unwrap();
        store.delete("2").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let items = raw.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.contains(&serde_json::json!({"notes": "no id"})));
        assert!(items.contains(&serde_json::json!(7)));

        let ids: Vec<String> = store.read_all().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["3"]);
    }

    #[test]
    fn test_try_read_all_distinguishes_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());
        assert_eq!(store.try_read_all(), None);

        store.write_all(&[]).unwrap();
        assert_eq!(store.try_read_all(), Some(vec![]));

        fs::write(store.path(), "not json").unwrap();
        assert_eq!(store.try_read_all(), None);
    }

    #[test]
    fn test_upsert_replaces_or_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());

        store.upsert(&entry("a", 1, "first")).unwrap();
        store.upsert(&entry("b", 2, "second")).unwrap();
        store.upsert(&entry("a", 1, "edited")).unwrap();

        let items = store.read_all();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].notes, "edited");
        assert_eq!(items[1].id, "b");
    }

    #[test]
    fn test_upsert_all_last_duplicate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());

        let written = store
            .upsert_all(&[entry("x", 1, "one"), entry("x", 1, "two")])
            .unwrap();

        assert_eq!(written, 2);
        let items = store.read_all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].notes, "two");
    }

    #[test]
    fn test_delete_removes_only_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path());
        store
            .write_all(&[entry("a", 1, ""), entry("b", 2, ""), entry("c", 3, "")])
            .unwrap();

        store.delete("b").unwrap();

        let ids: Vec<String> = store.read_all().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_keys_are_namespaced() {
        let dir = tempfile::tempdir().unwrap();
        let workouts = LocalStore::open(dir.path());
        let other = LocalStore::with_key(dir.path(), "remote/uid-1");

        workouts.upsert(&entry("a", 1, "")).unwrap();

        assert!(other.read_all().is_empty());
        assert_eq!(other.path().parent(), Some(dir.path()));
    }
}
