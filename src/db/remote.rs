// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user remote store with a live snapshot subscription.
//!
//! A subscription publishes the user's full collection on a `watch`
//! channel: once when it opens, after every write made through this store,
//! and on a poll interval to pick up changes made elsewhere. Writes are
//! never applied optimistically; the visible collection only changes when
//! a fresh snapshot arrives.
//!
//! Each snapshot is also written to a per-user cache file so an initial
//! fetch that fails (offline, transient error) can still deliver the last
//! known collection.

use crate::db::{BackendKind, EntryBackend, LocalStore, WorkoutDocuments};
use crate::error::AppError;
use crate::models::Entry;
use futures_util::future::{self, BoxFuture};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Latest collection delivered by a subscription; `None` until the first
/// delivery.
pub type Snapshot = Option<Vec<Entry>>;

struct Subscription {
    uid: String,
    sender: watch::Sender<Snapshot>,
    poller: JoinHandle<()>,
}

/// Remote entry store addressed by user identity.
pub struct RemoteStore {
    docs: Arc<dyn WorkoutDocuments>,
    poll_interval: Duration,
    cache_dir: Option<PathBuf>,
    current: Mutex<Option<Subscription>>,
}

impl RemoteStore {
    pub fn new(docs: Arc<dyn WorkoutDocuments>, poll_interval: Duration) -> Self {
        Self {
            docs,
            poll_interval,
            cache_dir: None,
            current: Mutex::new(None),
        }
    }

    /// Keep a best-effort copy of each user's last snapshot in `dir`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Open the subscription for `uid`, replacing any existing one.
    ///
    /// With no identity the returned channel holds an empty collection and
    /// never changes.
    pub fn subscribe(&self, uid: Option<&str>) -> watch::Receiver<Snapshot> {
        self.unsubscribe();

        let Some(uid) = uid else {
            let (_sender, receiver) = watch::channel(Some(Vec::new()));
            return receiver;
        };

        let (sender, receiver) = watch::channel(None);
        let poller = tokio::spawn(poll_snapshots(
            self.docs.clone(),
            uid.to_string(),
            sender.clone(),
            self.poll_interval,
            self.cache_for(uid),
        ));

        tracing::info!(uid, "Remote subscription opened");
        *self.lock() = Some(Subscription {
            uid: uid.to_string(),
            sender,
            poller,
        });
        receiver
    }

    /// Stop the current subscription, if any.
    pub fn unsubscribe(&self) {
        if let Some(sub) = self.lock().take() {
            sub.poller.abort();
            tracing::info!(uid = %sub.uid, "Remote subscription closed");
        }
    }

    /// Identity of the open subscription.
    pub fn current_uid(&self) -> Option<String> {
        self.lock().as_ref().map(|sub| sub.uid.clone())
    }

    /// Merge-write one entry for the current identity. No-op when signed out.
    pub async fn upsert(&self, entry: &Entry) -> Result<(), AppError> {
        let Some((uid, sender)) = self.active() else {
            tracing::debug!(entry_id = %entry.id, "No identity, skipping remote upsert");
            return Ok(());
        };
        self.merge_and_refresh(&uid, &sender, entry).await
    }

    /// Delete one entry for the current identity. No-op when signed out.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let Some((uid, sender)) = self.active() else {
            tracing::debug!(entry_id = id, "No identity, skipping remote delete");
            return Ok(());
        };
        self.remove_and_refresh(&uid, &sender, id).await
    }

    /// Merge-write one entry into `uid`'s collection.
    ///
    /// Fails without writing unless `uid` owns the open subscription.
    pub async fn upsert_for(&self, uid: &str, entry: &Entry) -> Result<(), AppError> {
        let sender = self.sender_for(uid)?;
        self.merge_and_refresh(uid, &sender, entry).await
    }

    /// Delete one entry from `uid`'s collection.
    ///
    /// Fails without writing unless `uid` owns the open subscription.
    pub async fn delete_for(&self, uid: &str, id: &str) -> Result<(), AppError> {
        let sender = self.sender_for(uid)?;
        self.remove_and_refresh(uid, &sender, id).await
    }

    async fn merge_and_refresh(
        &self,
        uid: &str,
        sender: &watch::Sender<Snapshot>,
        entry: &Entry,
    ) -> Result<(), AppError> {
        self.docs.merge(uid, entry).await?;
        refresh(self.docs.as_ref(), uid, sender, self.cache_for(uid).as_ref()).await;
        Ok(())
    }

    async fn remove_and_refresh(
        &self,
        uid: &str,
        sender: &watch::Sender<Snapshot>,
        id: &str,
    ) -> Result<(), AppError> {
        self.docs.remove(uid, id).await?;
        refresh(self.docs.as_ref(), uid, sender, self.cache_for(uid).as_ref()).await;
        Ok(())
    }

    fn active(&self) -> Option<(String, watch::Sender<Snapshot>)> {
        self.lock()
            .as_ref()
            .map(|sub| (sub.uid.clone(), sub.sender.clone()))
    }

    fn sender_for(&self, uid: &str) -> Result<watch::Sender<Snapshot>, AppError> {
        match self.active() {
            Some((current, sender)) if current == uid => Ok(sender),
            current => {
                tracing::warn!(
                    uid,
                    current = current.as_ref().map(|(c, _)| c.as_str()),
                    "Rejecting write for a closed remote session"
                );
                Err(AppError::SessionClosed(uid.to_string()))
            }
        }
    }

    fn cache_for(&self, uid: &str) -> Option<LocalStore> {
        self.cache_dir
            .as_ref()
            .map(|dir| LocalStore::with_key(dir, &format!("remote_{}", uid)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Subscription>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn poll_snapshots(
    docs: Arc<dyn WorkoutDocuments>,
    uid: String,
    sender: watch::Sender<Snapshot>,
    every: Duration,
    cache: Option<LocalStore>,
) {
    match docs.list(&uid).await {
        Ok(entries) => publish(&sender, entries, cache.as_ref()),
        Err(e) => {
            tracing::warn!(uid = %uid, error = %e, "Initial remote fetch failed");
            // No cache file means nothing is known about the collection yet.
            if let Some(cached) = cache.as_ref().and_then(LocalStore::try_read_all) {
                tracing::info!(uid = %uid, count = cached.len(), "Serving cached remote snapshot");
                sender.send_replace(Some(cached));
            }
        }
    }

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if sender.is_closed() {
            break;
        }
        refresh(docs.as_ref(), &uid, &sender, cache.as_ref()).await;
    }
}

async fn refresh(
    docs: &dyn WorkoutDocuments,
    uid: &str,
    sender: &watch::Sender<Snapshot>,
    cache: Option<&LocalStore>,
) {
    match docs.list(uid).await {
        Ok(entries) => publish(sender, entries, cache),
        Err(e) => tracing::warn!(uid, error = %e, "Remote refresh failed"),
    }
}

fn publish(sender: &watch::Sender<Snapshot>, entries: Vec<Entry>, cache: Option<&LocalStore>) {
    if let Some(cache) = cache {
        if let Err(e) = cache.write_all(&entries) {
            tracing::debug!(error = %e, "Remote snapshot cache not written");
        }
    }

    let count = entries.len();
    let changed = sender.send_if_modified(|current| {
        if current.as_ref() == Some(&entries) {
            false
        } else {
            *current = Some(entries);
            true
        }
    });
    if changed {
        tracing::debug!(count, "Remote snapshot delivered");
    }
}

/// The remote store bound to one user's subscription, as seen by the
/// coordinator. Writes fail once another subscription replaces it.
pub struct RemoteSession {
    store: Arc<RemoteStore>,
    uid: String,
    snapshots: watch::Receiver<Snapshot>,
}

impl RemoteSession {
    pub fn new(
        store: Arc<RemoteStore>,
        uid: impl Into<String>,
        snapshots: watch::Receiver<Snapshot>,
    ) -> Self {
        Self {
            store,
            uid: uid.into(),
            snapshots,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl EntryBackend for RemoteSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn snapshot(&self) -> BoxFuture<'_, Vec<Entry>> {
        let latest = self.snapshots.borrow().clone().unwrap_or_default();
        Box::pin(future::ready(latest))
    }

    fn upsert<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(self.store.upsert_for(&self.uid, entry))
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(self.store.delete_for(&self.uid, id))
    }

    fn subscription(&self) -> Option<watch::Receiver<Snapshot>> {
        Some(self.snapshots.clone())
    }
}
