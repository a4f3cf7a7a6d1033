mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use campus_portal::api::{build_client, HttpPortalApi, PortalApi};
use campus_portal::dashboard::{DashboardAggregator, DashboardState, UNAVAILABLE_MESSAGE};
use campus_portal::models::{Identity, NoteView, UserId};
use campus_portal::roles::Role;
use campus_portal::session::SessionStore;
use campus_portal::storage::MemoryStorage;

fn api(base_url: &str) -> HttpPortalApi {
    let client = build_client(Duration::from_secs(5)).expect("client");
    HttpPortalApi::new(client, base_url)
}

fn student() -> Identity {
    Identity {
        id: Some(UserId::new("5")),
        email: "lea@campus.test".to_string(),
        role: Role::Student,
    }
}

#[tokio::test]
async fn session_token_is_sent_as_bearer() {
    let app = Router::new().route(
        "/classes",
        get(|headers: HeaderMap| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                == Some("Bearer jwt-5");
            if authorized {
                Json(json!([{"id": 2, "label": "Dev Web"}])).into_response()
            } else {
                StatusCode::UNAUTHORIZED.into_response()
            }
        }),
    );
    let base = common::spawn_server(app).await;
    let store = SessionStore::new(Arc::new(MemoryStorage::new()));
    store.set(&student(), Some("jwt-5"));

    let classes = api(&base).with_session(store).classes().await.expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].label, "Dev Web");
}

#[tokio::test]
async fn error_responses_carry_the_server_message() {
    let app = Router::new()
        .route(
            "/classes",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"message": "database offline"})),
                )
            }),
        )
        .route("/planning", get(|| async { StatusCode::BAD_GATEWAY }));
    let base = common::spawn_server(app).await;
    let api = api(&base);

    let err = api.classes().await.unwrap_err();
    assert_eq!(err.to_string(), "database offline");
    let err = api.all_planning().await.unwrap_err();
    assert_eq!(err.to_string(), "API error (502)");
}

#[tokio::test]
async fn no_content_is_an_empty_list() {
    let app = Router::new().route("/documents/pending", get(|| async { StatusCode::NO_CONTENT }));
    let base = common::spawn_server(app).await;

    let documents = api(&base).pending_documents().await.expect("documents");
    assert!(documents.is_empty());
}

fn student_portal(classes_available: bool) -> Router {
    let router = Router::new()
        .route(
            "/planning/student/{id}",
            get(|Path(id): Path<String>| async move {
                assert_eq!(id, "5");
                Json(json!([{
                    "slot_id": 1,
                    "course_label": "Algo",
                    "room": "B201",
                    "date": "2025-12-05T00:00:00.000Z",
                    "start_time": "08:30:00",
                    "end_time": "10:00:00",
                    "class_id": 2,
                    "class_label": "A2",
                    "teacher_user_id": 4,
                    "teacher_name": "Mme Martin"
                }]))
            }),
        )
        .route(
            "/notes/student/{id}",
            get(|| async {
                Json(json!([
                    {"id": 1, "student_user_id": 5, "teacher_user_id": 4, "class_id": 2, "value": "16.00", "ects": 6},
                    {"id": 2, "student_user_id": 5, "teacher_user_id": 4, "class_id": 9, "value": 12.5, "ects": "3"}
                ]))
            }),
        );
    if classes_available {
        router.route(
            "/classes",
            get(|| async { Json(json!([{"id": 2, "label": "Dev Web"}])) }),
        )
    } else {
        router.route("/classes", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
    }
}

#[tokio::test]
async fn student_dashboard_over_http() {
    let base = common::spawn_server(student_portal(true)).await;
    let aggregator = DashboardAggregator::new(api(&base));

    assert!(aggregator.refresh(Some(student())).await);

    let DashboardState::Ready(result) = aggregator.state() else {
        panic!("dashboard did not load: {:?}", aggregator.state());
    };
    assert_eq!(result.planning.len(), 1);
    assert_eq!(
        result.notes,
        vec![
            NoteView {
                class_label: "Dev Web".to_string(),
                value: 16.0,
                ects: 6.0,
            },
            NoteView {
                class_label: "Class #9".to_string(),
                value: 12.5,
                ects: 3.0,
            },
        ]
    );
    assert_eq!(result.pending_document_count, 0);
}

#[tokio::test]
async fn one_failing_endpoint_fails_the_dashboard() {
    let base = common::spawn_server(student_portal(false)).await;
    let aggregator = DashboardAggregator::new(api(&base));

    aggregator.refresh(Some(student())).await;
    assert_eq!(
        aggregator.state(),
        DashboardState::Failed(UNAVAILABLE_MESSAGE.to_string())
    );
}
