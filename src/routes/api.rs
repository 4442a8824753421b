// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout and session API routes.

use crate::db::BackendKind;
use crate::error::{AppError, Result};
use crate::models::form::pace_parts;
use crate::models::{Entry, PaceParts, WorkoutForm};
use crate::services::MigrationReport;
use crate::time_utils::{today_local, yesterday_local};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/workouts", get(list_workouts).post(submit_workout))
        .route("/api/workouts/import", post(import_workouts))
        .route("/api/workouts/export", get(export_workouts))
        .route("/api/workouts/{id}", get(get_workout).delete(delete_workout))
        .route("/api/form/dates", get(form_dates))
        .route("/api/session", get(get_session))
        .route("/api/session/migrate", post(accept_migration))
}

// ─── Workouts ────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct WorkoutsResponse {
    pub backend: BackendKind,
    pub entries: Vec<Entry>,
}

/// Visible entries, newest first.
async fn list_workouts(State(state): State<Arc<AppState>>) -> Json<WorkoutsResponse> {
    Json(WorkoutsResponse {
        backend: state.coordinator.backend_kind().await,
        entries: state.coordinator.visible_entries().await,
    })
}

/// One entry plus its pace split for the edit form.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct WorkoutResponse {
    pub entry: Entry,
    pub pace: PaceParts,
}

async fn get_workout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkoutResponse>> {
    let entry = state
        .coordinator
        .entry(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Workout {} not found", id)))?;

    Ok(Json(WorkoutResponse {
        pace: pace_parts(&entry.pace),
        entry,
    }))
}

/// Form submission; `editingId` selects edit mode.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWorkoutRequest {
    #[serde(default)]
    pub editing_id: Option<String>,
    #[serde(flatten)]
    pub form: WorkoutForm,
}

async fn submit_workout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitWorkoutRequest>,
) -> Result<(StatusCode, Json<Entry>)> {
    let editing = request.editing_id.is_some();
    let entry = state
        .coordinator
        .submit_form(request.form, request.editing_id)
        .await?;

    tracing::info!(entry_id = %entry.id, editing, "Workout saved");

    let status = if editing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(entry)))
}

async fn delete_workout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.coordinator.delete_entry(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Import / Export ─────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct ImportResponse {
    pub imported: usize,
    pub skipped: usize,
    pub message: String,
}

/// Merge an exported file; the request body is the file content.
async fn import_workouts(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<ImportResponse>> {
    let report = state.coordinator.import_entries(&body).await?;
    Ok(Json(ImportResponse {
        imported: report.imported,
        skipped: report.skipped,
        message: "Import complete.".to_string(),
    }))
}

async fn export_workouts(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let export = state.coordinator.export_entries().await?;
    let disposition = format!("attachment; filename=\"{}\"", export.filename);

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    ))
}

// ─── Form Helpers ────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct FormDatesResponse {
    pub today: String,
    pub yesterday: String,
}

/// Quick-pick dates in server local time.
async fn form_dates() -> Json<FormDatesResponse> {
    Json(FormDatesResponse {
        today: today_local(),
        yesterday: yesterday_local(),
    })
}

// ─── Session ─────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct SessionResponse {
    pub signed_in: bool,
    pub user: Option<String>,
    pub sync_available: bool,
    pub sign_in_available: bool,
    pub data_note: String,
    pub migration_pending: bool,
    pub backend: BackendKind,
}

pub(crate) async fn session_response(state: &AppState) -> SessionResponse {
    let auth = state.identity.state().await;
    let user = auth.identity().map(|i| i.label().to_string());

    SessionResponse {
        signed_in: user.is_some(),
        user,
        sync_available: state.coordinator.sync_available(),
        sign_in_available: state.identity.sign_in_available(),
        data_note: state.identity.data_note().await.to_string(),
        migration_pending: state.identity.migration_pending(),
        backend: state.coordinator.backend_kind().await,
    }
}

async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(session_response(&state).await)
}

/// Accept the pending offer to copy local entries into the account.
async fn accept_migration(State(state): State<Arc<AppState>>) -> Result<Json<MigrationReport>> {
    let report = state.identity.accept_migration().await?;
    Ok(Json(report))
}
