// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Workouts are stored one document per entry at
//! `users/{uid}/workouts/{entry_id}`. Entry ids are percent-encoded when
//! used as document IDs so an id containing `/` still addresses a single
//! document.

use crate::db::collections;
use crate::error::AppError;
use crate::models::Entry;
use futures_util::future::BoxFuture;

/// Per-user workout document operations used by the remote store.
pub trait WorkoutDocuments: Send + Sync {
    /// All workouts for a user, newest first.
    fn list<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Vec<Entry>, AppError>>;

    /// Merge-write one workout. Fields not present in the entry are left
    /// untouched on the stored document.
    fn merge<'a>(&'a self, uid: &'a str, entry: &'a Entry) -> BoxFuture<'a, Result<(), AppError>>;

    /// Delete one workout.
    fn remove<'a>(&'a self, uid: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), AppError>>;
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes an unauthenticated connection; skip the
        // credential lookup entirely.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    fn user_path(&self, uid: &str) -> Result<firestore::ParentPathBuilder, AppError> {
        self.get_client()?
            .parent_path(collections::USERS, uid)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Workout Operations ──────────────────────────────────────

    /// Get all workouts for a user, newest first.
    pub async fn list_workouts(&self, uid: &str) -> Result<Vec<Entry>, AppError> {
        let parent = self.user_path(uid)?;
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WORKOUTS)
            .parent(&parent)
            .order_by([("createdAt", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Merge-write a workout, touching only the fields the entry carries.
    pub async fn merge_workout(&self, uid: &str, entry: &Entry) -> Result<(), AppError> {
        let parent = self.user_path(uid)?;
        let fields = entry_field_paths(entry)?;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::WORKOUTS)
            .document_id(document_id(&entry.id))
            .parent(&parent)
            .object(entry)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(uid, entry_id = %entry.id, "Workout merged");
        Ok(())
    }

    /// Delete a workout.
    pub async fn delete_workout(&self, uid: &str, id: &str) -> Result<(), AppError> {
        let parent = self.user_path(uid)?;
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::WORKOUTS)
            .document_id(document_id(id))
            .parent(&parent)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(uid, entry_id = id, "Workout deleted");
        Ok(())
    }
}

impl WorkoutDocuments for FirestoreDb {
    fn list<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Vec<Entry>, AppError>> {
        Box::pin(self.list_workouts(uid))
    }

    fn merge<'a>(&'a self, uid: &'a str, entry: &'a Entry) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(self.merge_workout(uid, entry))
    }

    fn remove<'a>(&'a self, uid: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(self.delete_workout(uid, id))
    }
}

/// Document ID for an entry id.
pub fn document_id(entry_id: &str) -> String {
    urlencoding::encode(entry_id).into_owned()
}

/// Top-level field names present in the serialized entry, used as the
/// update mask for a merge write.
fn entry_field_paths(entry: &Entry) -> Result<Vec<String>, AppError> {
    let value = serde_json::to_value(entry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize entry: {}", e)))?;
    Ok(value
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default())
}
