// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod asset_cache;
pub mod google_oidc;
pub mod identity;
pub mod sync;

pub use asset_cache::{AssetCache, AssetSource, CachedAsset, FsAssetSource};
pub use google_oidc::{GoogleIdTokenVerifier, GoogleIdentityProvider, OidcError};
pub use identity::{
    AuthFailure, AuthState, Identity, IdentityGate, IdentityProvider, MigrationDecision,
    SignInRequest,
};
pub use sync::{Export, ImportReport, MigrationReport, SyncCoordinator};
