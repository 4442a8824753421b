// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP API tests.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{create_test_app, empty_request, json_request, send_json};

#[tokio::test]
async fn test_health() {
    let app = create_test_app().await;
    let (status, body) = send_json(&app.router, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_list_edit_delete() {
    let app = create_test_app().await;

    let (status, created) = send_json(
        &app.router,
        json_request(
            "POST",
            "/api/workouts",
            json!({
                "date": "2025-05-01",
                "distance": "3,5",
                "paceMin": "8",
                "paceSec": "5",
                "painStart": "1.5",
                "painLevel": "2",
                "stretched": true,
                "notes": "easy"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["distance"], 3.5);
    assert_eq!(created["pace"], "8:05/mi");
    assert_eq!(created["painStart"], 1.5);
    assert_eq!(created["painLevel"], 2);
    let id = created["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("w_"));

    let (status, list) = send_json(&app.router, empty_request("GET", "/api/workouts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["backend"], "local");
    assert_eq!(list["entries"].as_array().unwrap().len(), 1);

    let (status, one) =
        send_json(&app.router, empty_request("GET", &format!("/api/workouts/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["pace"], json!({ "min": "8", "sec": "05" }));

    let (status, edited) = send_json(
        &app.router,
        json_request(
            "POST",
            "/api/workouts",
            json!({ "editingId": id, "date": "2025-05-01", "distance": "4", "notes": "longer" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["id"], created["id"]);
    assert_eq!(edited["createdAt"], created["createdAt"]);
    assert_eq!(edited["painStart"], serde_json::Value::Null);

    let (status, _) =
        send_json(&app.router, empty_request("DELETE", &format!("/api/workouts/{}", id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = send_json(&app.router, empty_request("GET", "/api/workouts")).await;
    assert!(list["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_required_fields_rejected() {
    let app = create_test_app().await;

    let (status, body) = send_json(
        &app.router,
        json_request("POST", "/api/workouts", json!({ "date": "2025-05-01", "distance": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"], "Please enter a date and distance.");
}

#[tokio::test]
async fn test_unknown_workout_not_found() {
    let app = create_test_app().await;
    let (status, body) = send_json(&app.router, empty_request("GET", "/api/workouts/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_import_and_export() {
    let app = create_test_app().await;
    let file = json!([
        { "id": "a", "createdAt": 1, "date": "2025-01-01", "distance": 2.0 },
        { "notes": "no id" },
        { "id": "b", "createdAt": 2, "date": "2025-01-02", "distance": 3.0 }
    ]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/workouts/import")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(file.to_string()))
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imported"], 2);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["message"], "Import complete.");

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/workouts/export"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"workouts_"));
    assert!(disposition.ends_with(".json\""));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let exported: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let ids: Vec<_> = exported
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn test_import_invalid_file() {
    let app = create_test_app().await;

    for (raw, details) in [
        ("{not json", "Failed to import file."),
        ("{\"id\":\"a\"}", "Invalid file content."),
    ] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/workouts/import")
            .body(Body::from(raw))
            .unwrap();
        let (status, body) = send_json(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], details);
    }
}

#[tokio::test]
async fn test_form_dates() {
    let app = create_test_app().await;
    let (status, body) = send_json(&app.router, empty_request("GET", "/api/form/dates")).await;

    assert_eq!(status, StatusCode::OK);
    let today = chrono::NaiveDate::parse_from_str(body["today"].as_str().unwrap(), "%Y-%m-%d")
        .unwrap();
    let yesterday =
        chrono::NaiveDate::parse_from_str(body["yesterday"].as_str().unwrap(), "%Y-%m-%d")
            .unwrap();
    assert_eq!(today - yesterday, chrono::Duration::days(1));
}

#[tokio::test]
async fn test_session_sign_in_and_out() {
    let app = create_test_app().await;

    let (_, session) = send_json(&app.router, empty_request("GET", "/api/session")).await;
    assert_eq!(session["signedIn"], false);
    assert_eq!(session["syncAvailable"], true);
    assert_eq!(session["dataNote"], "Data is saved on this device only.");

    let (status, session) = send_json(
        &app.router,
        json_request("POST", "/auth/signin", json!({ "idToken": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["signedIn"], true);
    assert_eq!(session["user"], "alice@example.com");
    assert_eq!(session["backend"], "remote");
    assert_eq!(session["dataNote"], "Data sync is ON (private to your account).");

    let (status, session) =
        send_json(&app.router, empty_request("POST", "/auth/signout")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["signedIn"], false);
    assert_eq!(session["backend"], "local");
}

#[tokio::test]
async fn test_sign_in_failure_message() {
    let app = create_test_app().await;

    let (status, body) = send_json(
        &app.router,
        json_request("POST", "/auth/signin", json!({ "error": "auth/popup-blocked" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "auth_error");
    assert_eq!(
        body["details"],
        "Popup blocked. Allow popups for this site and try again."
    );
}

#[tokio::test]
async fn test_sign_in_from_unauthorized_origin() {
    let app = create_test_app().await;

    for origin in ["https://elsewhere.example.com", "http://localhost.evil.example"] {
        let request = Request::builder()
            .method("POST")
            .uri("/auth/signin")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, origin)
            .body(Body::from(json!({ "idToken": "mallory" }).to_string()))
            .unwrap();
        let (status, body) = send_json(&app.router, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED, "origin {}", origin);
        assert!(body["details"]
            .as_str()
            .unwrap()
            .starts_with("Auth domain not authorized."));
    }
}

#[tokio::test]
async fn test_migration_accept_via_api() {
    let app = create_test_app().await;
    app.state
        .coordinator
        .local()
        .upsert(&common::entry("l1", 1, "local run"))
        .unwrap();

    let (_, session) = send_json(
        &app.router,
        json_request("POST", "/auth/signin", json!({ "idToken": "bob" })),
    )
    .await;
    assert_eq!(session["migrationPending"], true);

    let (_, list) = send_json(&app.router, empty_request("GET", "/api/workouts")).await;
    assert!(list["entries"].as_array().unwrap().is_empty());

    let (status, report) =
        send_json(&app.router, empty_request("POST", "/api/session/migrate")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report, json!({ "copied": 1, "failed": 0 }));

    let (_, list) = send_json(&app.router, empty_request("GET", "/api/workouts")).await;
    assert_eq!(list["entries"][0]["id"], "l1");

    let (status, _) =
        send_json(&app.router, empty_request("POST", "/api/session/migrate")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_security_headers_on_api() {
    let app = create_test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/health"))
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("X-Content-Type-Options").unwrap(),
        "nosniff"
    );
    assert_eq!(
        response.headers().get("Referrer-Policy").unwrap(),
        "strict-origin-when-cross-origin"
    );
}
