// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Versioned cache for the app shell.
//!
//! Installing fetches every manifest path into the cache for the current
//! version (all or nothing). Activating deletes caches left by other
//! versions. Navigations are network-first with a cached `index.html`
//! fallback; everything else is served cache-first.

use axum::body::Bytes;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Paths making up the app shell.
pub const ASSET_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/app.js",
    "/manifest.webmanifest",
    "/icons/logo.svg",
];

const SHELL_PATH: &str = "/index.html";

/// A response body held in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    pub body: Bytes,
    pub content_type: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

/// Where assets come from when the cache misses (the "network").
pub trait AssetSource: Send + Sync {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<CachedAsset, AssetError>>;
}

/// Serves assets from a directory on disk.
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = match path.trim_start_matches('/') {
            "" => "index.html",
            other => other,
        };
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    async fn read(&self, path: &str) -> Result<CachedAsset, AssetError> {
        let file = self
            .resolve(path)
            .ok_or_else(|| AssetError::NotFound(path.to_string()))?;

        match tokio::fs::read(&file).await {
            Ok(body) => Ok(CachedAsset {
                body: Bytes::from(body),
                content_type: content_type_for(&file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(path.to_string()))
            }
            Err(e) => Err(AssetError::Io {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl AssetSource for FsAssetSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<CachedAsset, AssetError>> {
        Box::pin(self.read(path))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("webmanifest") => "application/manifest+json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Version-keyed asset cache.
#[derive(Clone)]
pub struct AssetCache {
    version: String,
    source: Arc<dyn AssetSource>,
    storage: Arc<DashMap<String, HashMap<String, CachedAsset>>>,
}

impl AssetCache {
    pub fn new(version: impl Into<String>, source: Arc<dyn AssetSource>) -> Self {
        Self {
            version: version.into(),
            source,
            storage: Arc::new(DashMap::new()),
        }
    }

    /// Another version sharing this cache's storage.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            source: self.source.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Versions currently holding a cache.
    pub fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.storage.iter().map(|e| e.key().clone()).collect();
        versions.sort();
        versions
    }

    /// Fetch every manifest path into this version's cache.
    ///
    /// If any fetch fails nothing is stored.
    pub async fn install(&self) -> Result<usize, AssetError> {
        let mut assets = HashMap::with_capacity(ASSET_MANIFEST.len());
        for path in ASSET_MANIFEST {
            let asset = self.source.fetch(path).await.inspect_err(|e| {
                tracing::warn!(version = %self.version, path, error = %e, "Asset install failed");
            })?;
            assets.insert(path.to_string(), asset);
        }

        let count = assets.len();
        self.storage.insert(self.version.clone(), assets);
        tracing::info!(version = %self.version, count, "Asset cache installed");
        Ok(count)
    }

    /// Delete every cache whose version differs from this one.
    pub fn activate(&self) -> usize {
        let before = self.storage.len();
        self.storage.retain(|version, _| *version == self.version);
        let removed = before - self.storage.len();
        if removed > 0 {
            tracing::info!(version = %self.version, removed, "Old asset caches deleted");
        }
        removed
    }

    /// Serve `path`.
    ///
    /// Navigations try the source first and fall back to the cached app
    /// shell. Other requests use the cache and fall back to the source.
    pub async fn fetch(&self, path: &str, navigate: bool) -> Option<CachedAsset> {
        if navigate {
            return match self.source.fetch(path).await {
                Ok(asset) => Some(asset),
                Err(e) => {
                    tracing::debug!(path, error = %e, "Navigation offline, serving cached shell");
                    self.cached(SHELL_PATH)
                }
            };
        }

        if let Some(asset) = self.cached(path) {
            return Some(asset);
        }
        self.source.fetch(path).await.ok()
    }

    fn cached(&self, path: &str) -> Option<CachedAsset> {
        self.storage
            .get(&self.version)
            .and_then(|assets| assets.get(path).cloned())
    }
}
