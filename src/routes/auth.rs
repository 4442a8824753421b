// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in and sign-out routes.
//!
//! The browser runs Google's sign-in widget and posts the resulting ID
//! token here, or the provider's error code if sign-in failed client-side.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::post,
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::routes::api::{session_response, SessionResponse};
use crate::routes::is_allowed_origin;
use crate::services::{AuthFailure, SignInRequest};
use crate::AppState;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SessionResponse>> {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or("");
        if !is_allowed_origin(&state.config.frontend_url, origin) {
            tracing::warn!(origin, "Sign-in from unauthorized origin");
            return Err(AppError::Auth(AuthFailure::UnauthorizedDomain));
        }
    }

    state.identity.sign_in(request).await?;
    Ok(Json(session_response(&state).await))
}

/// Always succeeds; the app returns to on-device storage.
async fn sign_out(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.identity.sign_out().await;
    Json(session_response(&state).await)
}
