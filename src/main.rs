// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout Log server
//!
//! Serves the app shell and the workout API. Sync to Firestore is enabled
//! when both `GCP_PROJECT_ID` and `GOOGLE_CLIENT_ID` are set.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workout_log::{
    config::Config,
    db::{FirestoreDb, LocalStore, RemoteStore},
    services::{
        AssetCache, FsAssetSource, GoogleIdTokenVerifier, GoogleIdentityProvider, IdentityGate,
        IdentityProvider, SyncCoordinator,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        data_dir = %config.data_dir.display(),
        sync = config.sync_configured(),
        "Starting Workout Log"
    );

    let local = Arc::new(LocalStore::open(&config.data_dir));

    let remote = match &config.gcp_project_id {
        Some(project_id) => {
            let db = FirestoreDb::new(project_id).await?;
            let store = RemoteStore::new(Arc::new(db), config.sync_poll_interval)
                .with_cache_dir(config.data_dir.join("remote"));
            Some(Arc::new(store))
        }
        None => {
            tracing::info!("GCP_PROJECT_ID not set, running local-only");
            None
        }
    };

    let coordinator = Arc::new(SyncCoordinator::new(local, remote));

    let provider: Option<Arc<dyn IdentityProvider>> = match &config.google_client_id {
        Some(client_id) => {
            let verifier = GoogleIdTokenVerifier::new(client_id.clone())?;
            let provider: Arc<dyn IdentityProvider> =
                Arc::new(GoogleIdentityProvider::new(verifier));
            Some(provider)
        }
        None => {
            tracing::info!("GOOGLE_CLIENT_ID not set, sign-in disabled");
            None
        }
    };

    let identity = Arc::new(IdentityGate::new(
        coordinator.clone(),
        provider,
        config.auto_migrate,
        config.migration_settle,
    ));
    identity.spawn_watcher();

    let assets = AssetCache::new(
        config.cache_version.clone(),
        Arc::new(FsAssetSource::new(&config.assets_dir)),
    );
    match assets.install().await {
        Ok(count) => {
            assets.activate();
            tracing::info!(count, version = assets.version(), "App shell cached");
        }
        Err(e) => {
            tracing::warn!(error = %e, "App shell not cached, serving from disk only");
        }
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        coordinator,
        identity,
        assets,
    });

    let app = workout_log::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("workout_log=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
