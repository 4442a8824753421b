// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::{self, BoxFuture};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;
use workout_log::config::Config;
use workout_log::db::{FirestoreDb, LocalStore, RemoteStore, WorkoutDocuments};
use workout_log::error::AppError;
use workout_log::models::Entry;
use workout_log::routes::create_router;
use workout_log::services::{
    AssetCache, AuthFailure, FsAssetSource, Identity, IdentityGate, IdentityProvider,
    SignInRequest, SyncCoordinator,
};
use workout_log::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Build an entry with the fields tests usually care about.
#[allow(dead_code)]
pub fn entry(id: &str, created_at: i64, notes: &str) -> Entry {
    let mut e = Entry::new(id, created_at);
    e.date = "2025-05-01".to_string();
    e.distance = 3.1;
    e.notes = notes.to_string();
    e
}

#[allow(dead_code)]
pub fn identity(uid: &str) -> Identity {
    Identity {
        uid: uid.to_string(),
        email: Some(format!("{}@example.com", uid)),
        display_name: None,
    }
}

// ─── In-memory document store ────────────────────────────────

/// Stand-in for Firestore: per-user maps of entry id to entry.
#[derive(Default)]
pub struct MemoryDocuments {
    users: Mutex<HashMap<String, HashMap<String, Entry>>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub list_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryDocuments {
    /// Seed a user's collection directly, bypassing the remote store.
    pub fn seed(&self, uid: &str, entries: &[Entry]) {
        let mut users = self.users.lock().unwrap();
        let docs = users.entry(uid.to_string()).or_default();
        for e in entries {
            docs.insert(e.id.clone(), e.clone());
        }
    }

    pub fn entries(&self, uid: &str) -> Vec<Entry> {
        let users = self.users.lock().unwrap();
        let mut items: Vec<Entry> = users
            .get(uid)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), AppError> {
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::Database(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

impl WorkoutDocuments for MemoryDocuments {
    fn list<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Vec<Entry>, AppError>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .check(&self.fail_reads, "read")
            .map(|_| self.entries(uid));
        Box::pin(future::ready(result))
    }

    fn merge<'a>(&'a self, uid: &'a str, entry: &'a Entry) -> BoxFuture<'a, Result<(), AppError>> {
        let result = self.check(&self.fail_writes, "write").map(|_| {
            self.seed(uid, std::slice::from_ref(entry));
        });
        Box::pin(future::ready(result))
    }

    fn remove<'a>(&'a self, uid: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), AppError>> {
        let result = self.check(&self.fail_writes, "write").map(|_| {
            if let Some(docs) = self.users.lock().unwrap().get_mut(uid) {
                docs.remove(id);
            }
        });
        Box::pin(future::ready(result))
    }
}

// ─── Fake identity provider ──────────────────────────────────

/// Treats the ID token as the uid; error codes map as the real provider's
/// client errors do.
pub struct FakeProvider {
    session: watch::Sender<Option<Identity>>,
    pub fail_sign_out: AtomicBool,
    pub sign_in_delay: Mutex<Option<Duration>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            session,
            fail_sign_out: AtomicBool::new(false),
            sign_in_delay: Mutex::new(None),
        }
    }
}

impl IdentityProvider for FakeProvider {
    fn sign_in(&self, request: SignInRequest) -> BoxFuture<'_, Result<Identity, AuthFailure>> {
        let delay = *self.sign_in_delay.lock().unwrap();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(code) = request.error {
                return Err(AuthFailure::from_code(&code));
            }
            let uid = request
                .id_token
                .ok_or_else(|| AuthFailure::Other("missing ID token".to_string()))?;
            let identity = identity(&uid);
            self.session.send_replace(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AppError>> {
        self.session.send_replace(None);
        let result = if self.fail_sign_out.load(Ordering::SeqCst) {
            Err(AppError::Internal(anyhow::anyhow!("provider unavailable")))
        } else {
            Ok(())
        };
        Box::pin(future::ready(result))
    }

    fn on_auth_state_changed(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

// ─── App builders ────────────────────────────────────────────

/// Files making up a minimal app shell.
#[allow(dead_code)]
pub fn write_app_shell(dir: &Path) {
    std::fs::create_dir_all(dir.join("icons")).unwrap();
    std::fs::write(dir.join("index.html"), "<!doctype html><title>Workouts</title>").unwrap();
    std::fs::write(dir.join("style.css"), "body { margin: 0 }").unwrap();
    std::fs::write(dir.join("app.js"), "console.log('app')").unwrap();
    std::fs::write(dir.join("manifest.webmanifest"), "{\"name\":\"Workouts\"}").unwrap();
    std::fs::write(dir.join("icons/logo.svg"), "<svg/>").unwrap();
}

pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub docs: Arc<MemoryDocuments>,
    pub provider: Arc<FakeProvider>,
    pub dir: tempfile::TempDir,
}

#[allow(dead_code)]
pub struct TestOptions {
    /// Configure a remote store and identity provider
    pub sync: bool,
    pub auto_migrate: bool,
    pub settle: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            sync: true,
            auto_migrate: false,
            settle: Duration::from_millis(500),
        }
    }
}

/// Create a test app with sync enabled and manual migration.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    create_test_app_with(TestOptions::default()).await
}

/// Create a test app backed by a temp directory and in-memory documents.
pub async fn create_test_app_with(options: TestOptions) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let assets_dir = dir.path().join("web");
    write_app_shell(&assets_dir);

    let mut config = Config::test_default();
    config.data_dir = dir.path().join("data");
    config.assets_dir = assets_dir.clone();
    config.auto_migrate = options.auto_migrate;
    config.migration_settle = options.settle;

    let docs = Arc::new(MemoryDocuments::default());
    let provider = Arc::new(FakeProvider::default());

    let local = Arc::new(LocalStore::open(&config.data_dir));
    let remote = options.sync.then(|| {
        Arc::new(
            RemoteStore::new(docs.clone(), config.sync_poll_interval)
                .with_cache_dir(config.data_dir.join("remote")),
        )
    });
    let coordinator = Arc::new(SyncCoordinator::new(local, remote));

    let identity_provider: Option<Arc<dyn IdentityProvider>> = if options.sync {
        let p: Arc<dyn IdentityProvider> = provider.clone();
        Some(p)
    } else {
        None
    };
    let identity = Arc::new(IdentityGate::new(
        coordinator.clone(),
        identity_provider,
        config.auto_migrate,
        config.migration_settle,
    ));

    let assets = AssetCache::new(
        config.cache_version.clone(),
        Arc::new(FsAssetSource::new(&assets_dir)),
    );
    assets.install().await.unwrap();
    assets.activate();

    let state = Arc::new(AppState {
        config,
        coordinator,
        identity,
        assets,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        docs,
        provider,
        dir,
    }
}

/// Send a request and decode the JSON response body (`Null` when empty).
#[allow(dead_code)]
pub async fn send_json(
    router: &axum::Router,
    request: Request<Body>,
) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
