// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity gate: sign-in state and backend switching.
//!
//! Two states, `SignedOut` (initial) and `SignedIn(identity)`. Signing in
//! makes the remote store authoritative and, once per sign-in, offers to
//! copy local entries into an empty remote collection. Signing out returns
//! to the local store.

use crate::db::Snapshot;
use crate::error::AppError;
use crate::models::Entry;
use crate::services::sync::{MigrationReport, SyncCoordinator};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Stable provider subject; addresses the user's remote collection
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    /// Human-readable label for the signed-in user.
    pub fn label(&self) -> &str {
        self.email
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or("Signed in")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn(Identity),
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::SignedOut => None,
            AuthState::SignedIn(identity) => Some(identity),
        }
    }
}

/// Why a sign-in attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("domain not authorized")]
    UnauthorizedDomain,
    #[error("popup blocked")]
    PopupBlocked,
    #[error("cancelled by user")]
    Cancelled,
    #[error("another sign-in is in progress")]
    ConcurrentRequest,
    #[error("sign-in provider disabled")]
    ProviderDisabled,
    #[error("cookies disabled")]
    CookiesDisabled,
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

impl AuthFailure {
    /// Map a provider error code (e.g. `auth/popup-blocked`).
    pub fn from_code(code: &str) -> Self {
        if code.contains("auth/unauthorized-domain") {
            AuthFailure::UnauthorizedDomain
        } else if code.contains("auth/popup-blocked") {
            AuthFailure::PopupBlocked
        } else if code.contains("auth/popup-closed-by-user") {
            AuthFailure::Cancelled
        } else if code.contains("auth/cancelled-popup-request") {
            AuthFailure::ConcurrentRequest
        } else if code.contains("auth/operation-not-allowed") {
            AuthFailure::ProviderDisabled
        } else if code.contains("auth/cookie-not-supported") {
            AuthFailure::CookiesDisabled
        } else if code.contains("network") {
            AuthFailure::Network(code.to_string())
        } else {
            AuthFailure::Other(code.to_string())
        }
    }

    /// Message suitable for a transient notice.
    pub fn friendly_message(&self) -> String {
        match self {
            AuthFailure::UnauthorizedDomain => {
                "Auth domain not authorized. Add this site's domain to the sign-in provider's authorized domains.".to_string()
            }
            AuthFailure::PopupBlocked => {
                "Popup blocked. Allow popups for this site and try again.".to_string()
            }
            AuthFailure::Cancelled => "Sign-in canceled.".to_string(),
            AuthFailure::ConcurrentRequest => "Another sign-in is in progress.".to_string(),
            AuthFailure::ProviderDisabled => {
                "Google sign-in is not enabled. Configure GOOGLE_CLIENT_ID and GCP_PROJECT_ID to turn on sync.".to_string()
            }
            AuthFailure::CookiesDisabled => {
                "Browser cookies are disabled or blocked. Enable cookies for this site.".to_string()
            }
            AuthFailure::Network(_) => {
                "Network error. Check your connection and try again.".to_string()
            }
            AuthFailure::Other(code) => format!("Sign-in failed. {}", code).trim().to_string(),
        }
    }
}

/// Credential handed over by the client-side sign-in widget.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    /// Google ID token from a successful sign-in
    pub id_token: Option<String>,
    /// Provider error code from a failed sign-in
    pub error: Option<String>,
}

/// External authentication collaborator.
pub trait IdentityProvider: Send + Sync {
    fn sign_in(&self, request: SignInRequest) -> BoxFuture<'_, Result<Identity, AuthFailure>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AppError>>;

    /// Session changes; the receiver holds the current state immediately.
    fn on_auth_state_changed(&self) -> watch::Receiver<Option<Identity>>;
}

/// What happened to the local-to-remote copy after a sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationDecision {
    /// Nothing to copy, remote already has data, or the first snapshot
    /// never arrived.
    Skipped,
    /// Waiting for the user to accept.
    Offered,
    Completed(MigrationReport),
}

pub struct IdentityGate {
    coordinator: Arc<SyncCoordinator>,
    provider: Option<Arc<dyn IdentityProvider>>,
    state: RwLock<AuthState>,
    migration_offered: AtomicBool,
    sign_in_lock: Mutex<()>,
    auto_migrate: bool,
    settle_timeout: Duration,
}

impl IdentityGate {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        provider: Option<Arc<dyn IdentityProvider>>,
        auto_migrate: bool,
        settle_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            provider,
            state: RwLock::new(AuthState::SignedOut),
            migration_offered: AtomicBool::new(false),
            sign_in_lock: Mutex::new(()),
            auto_migrate,
            settle_timeout,
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    pub fn sign_in_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn migration_pending(&self) -> bool {
        self.migration_offered.load(Ordering::SeqCst)
    }

    /// Status line describing where data is being saved.
    pub async fn data_note(&self) -> &'static str {
        let signed_in = matches!(*self.state.read().await, AuthState::SignedIn(_));
        if signed_in && self.coordinator.sync_available() {
            "Data sync is ON (private to your account)."
        } else {
            "Data is saved on this device only."
        }
    }

    /// Follow the provider's session changes until the provider goes away.
    pub fn spawn_watcher(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut changes = self.provider.as_ref()?.on_auth_state_changed();
        let gate = self.clone();

        Some(tokio::spawn(async move {
            loop {
                let current = changes.borrow_and_update().clone();
                gate.handle_auth_change(current).await;
                if changes.changed().await.is_err() {
                    break;
                }
            }
        }))
    }

    /// Sign in with a client credential.
    pub async fn sign_in(&self, request: SignInRequest) -> Result<Identity, AuthFailure> {
        let provider = self.provider.as_ref().ok_or(AuthFailure::ProviderDisabled)?;
        let _guard = self
            .sign_in_lock
            .try_lock()
            .map_err(|_| AuthFailure::ConcurrentRequest)?;

        let identity = provider.sign_in(request).await.inspect_err(|e| {
            tracing::warn!(error = %e, "Sign-in failed");
        })?;

        self.handle_auth_change(Some(identity.clone())).await;
        Ok(identity)
    }

    /// Sign out. Provider failures are logged and otherwise ignored; the
    /// gate always returns to the local store.
    pub async fn sign_out(&self) {
        if let Some(provider) = &self.provider {
            if let Err(e) = provider.sign_out().await {
                tracing::warn!(error = %e, "Sign-out failed, continuing cleanup");
            }
        }
        self.handle_auth_change(None).await;
    }

    /// Apply a session change reported by the provider.
    ///
    /// Repeated reports of the current state are ignored. Returns the
    /// migration decision after a fresh sign-in.
    pub async fn handle_auth_change(&self, session: Option<Identity>) -> Option<MigrationDecision> {
        let snapshots = {
            let mut state = self.state.write().await;
            let current = state.identity().map(|i| i.uid.clone());

            match session {
                Some(identity) if state.identity() == Some(&identity) => return None,
                None if current.is_none() => return None,
                None => {
                    self.migration_offered.store(false, Ordering::SeqCst);
                    self.coordinator.activate_local().await;
                    *state = AuthState::SignedOut;
                    tracing::info!(uid = current.as_deref(), "Signed out");
                    return None;
                }
                Some(identity) => {
                    self.migration_offered.store(false, Ordering::SeqCst);
                    let local_count = self.coordinator.local().read_all().len();
                    let snapshots = self.coordinator.activate_remote(&identity).await;
                    tracing::info!(uid = %identity.uid, label = identity.label(), "Signed in");
                    *state = AuthState::SignedIn(identity.clone());
                    snapshots.map(|rx| (identity, rx, local_count))
                }
            }
        };

        let (identity, rx, local_count) = snapshots?;
        Some(self.check_migration(&identity, rx, local_count).await)
    }

    /// Accept a pending migration offer.
    pub async fn accept_migration(&self) -> Result<MigrationReport, AppError> {
        if !matches!(*self.state.read().await, AuthState::SignedIn(_)) {
            return Err(AppError::BadRequest("Not signed in".to_string()));
        }
        if !self.migration_offered.swap(false, Ordering::SeqCst) {
            return Err(AppError::BadRequest("No migration pending".to_string()));
        }
        Ok(self.coordinator.migrate_local().await)
    }

    async fn check_migration(
        &self,
        identity: &Identity,
        rx: watch::Receiver<Snapshot>,
        local_count: usize,
    ) -> MigrationDecision {
        if local_count == 0 {
            return MigrationDecision::Skipped;
        }

        let Some(first) = first_snapshot(rx, self.settle_timeout).await else {
            tracing::warn!(
                uid = %identity.uid,
                timeout_ms = self.settle_timeout.as_millis() as u64,
                "No remote snapshot before settle timeout, not offering migration"
            );
            return MigrationDecision::Skipped;
        };

        if !first.is_empty() {
            return MigrationDecision::Skipped;
        }

        // The session may have changed while waiting.
        if self.state.read().await.identity() != Some(identity) {
            return MigrationDecision::Skipped;
        }

        tracing::info!(uid = %identity.uid, local_count, "Remote collection empty, offering migration");

        if self.auto_migrate {
            MigrationDecision::Completed(self.coordinator.migrate_local().await)
        } else {
            self.migration_offered.store(true, Ordering::SeqCst);
            MigrationDecision::Offered
        }
    }
}

/// Wait for a subscription's first delivery, up to `timeout`.
async fn first_snapshot(mut rx: watch::Receiver<Snapshot>, timeout: Duration) -> Option<Vec<Entry>> {
    let waited = tokio::time::timeout(timeout, rx.wait_for(|snapshot| snapshot.is_some())).await;
    match waited {
        Ok(Ok(snapshot)) => snapshot.clone(),
        _ => None,
    }
}
