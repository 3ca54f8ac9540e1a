use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use roster_core::admission::EmployeeDraft;
use roster_core::types::{Employee, EmployeePatch};

use crate::error::ApiError;
use crate::router::AppState;

/// Raw create request before validation. Both fields are optional here so
/// the admission rules, not serde, decide what a missing field means.
#[derive(Debug, Deserialize)]
pub struct CreatePayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    age: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBody {
    id: i64,
    name: String,
    age: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UpdatedBody {
    id: i64,
    name: String,
    age: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    message: String,
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreatePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedBody>), ApiError> {
    counter!("employee_requests_total", "op" => "create").increment(1);
    let Json(payload) = payload?;
    let draft = EmployeeDraft::new(payload.name, payload.age)?;

    let employee = state
        .storage()
        .employees()
        .create(&draft, state.now())
        .await?;
    info!(stage = "api", op = "create", id = employee.id, "employee created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedBody {
            id: employee.id,
            name: employee.name,
            age: employee.age,
            created_at: employee.created_at,
        }),
    ))
}

pub async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Employee>, ApiError> {
    counter!("employee_requests_total", "op" => "fetch").increment(1);
    let employee = state.storage().employees().fetch(id).await?;
    Ok(Json(employee))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<EmployeePatch>, JsonRejection>,
) -> Result<Json<UpdatedBody>, ApiError> {
    counter!("employee_requests_total", "op" => "update").increment(1);
    let Json(patch) = payload?;

    let updated_at = state.now();
    let employee = state
        .storage()
        .employees()
        .update(id, &patch, updated_at)
        .await?;
    info!(stage = "api", op = "update", id, "employee updated");

    Ok(Json(UpdatedBody {
        id: employee.id,
        name: employee.name,
        age: employee.age,
        updated_at,
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageBody>, ApiError> {
    counter!("employee_requests_total", "op" => "delete").increment(1);
    state.storage().employees().delete(id).await?;
    info!(stage = "api", op = "delete", id, "employee deleted");

    Ok(Json(MessageBody {
        message: format!("Employee with ID {id} deleted."),
    }))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Employee>>, ApiError> {
    counter!("employee_requests_total", "op" => "list").increment(1);
    let employees = state.storage().employees().list().await?;
    Ok(Json(employees))
}

pub async fn clear(State(state): State<AppState>) -> Result<Json<MessageBody>, ApiError> {
    counter!("employee_requests_total", "op" => "clear").increment(1);
    let removed = state.storage().employees().clear().await?;
    info!(stage = "api", op = "clear", removed, "all employees removed");

    Ok(Json(MessageBody {
        message: "All employees have been removed.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request},
        Router,
    };
    use http_body_util::BodyExt;
    use roster_storage::Database;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::router::{app_router, AppState};
    use crate::telemetry;

    use super::*;

    async fn setup_state() -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let database = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");
        AppState::new(metrics, database)
    }

    async fn setup_app() -> Router {
        app_router(setup_state().await)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("handler should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn create_returns_the_new_record() {
        let app = setup_app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 1);
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["age"], 30);
        assert!(body["created_at"].is_string());
        assert!(body.get("updated_at").is_none());
    }

    #[tokio::test]
    async fn create_stamps_created_at_from_the_clock() {
        let state = setup_state().await.with_clock(Arc::new(|| {
            "2024-05-01T12:00:00Z".parse().expect("timestamp")
        }));
        let app = app_router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let created_at = body["created_at"].as_str().expect("created_at");
        assert!(created_at.starts_with("2024-05-01T12:00:00"));
    }

    #[tokio::test]
    async fn create_requires_name_and_age() {
        let app = setup_app().await;

        for payload in [
            json!({}),
            json!({"name": "Alice"}),
            json!({"age": 30}),
            json!({"name": "", "age": 30}),
            json!({"name": "Alice", "age": 0}),
        ] {
            let (status, body) = send(&app, Method::POST, "/api/employee", Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Name and age are required.");
        }
    }

    #[tokio::test]
    async fn create_rejects_malformed_json() {
        let app = setup_app().await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/employee")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.expect("handler should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_case_insensitively() {
        let app = setup_app().await;

        send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "alice", "age": 30})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Duplicate entry: Employee with name \"alice\" and age 30 already exists."
        );
    }

    #[tokio::test]
    async fn capacity_is_exhausted_at_thirty_records() {
        let app = setup_app().await;

        for i in 1..=30 {
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/employee",
                Some(json!({"name": format!("Employee {i}"), "age": 20 + i})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED, "create #{i} should succeed");
        }

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "One Too Many", "age": 99})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Employee ID limit exceeded. Cannot add more than 30 employees."
        );
    }

    #[tokio::test]
    async fn fetch_returns_the_full_record_or_404() {
        let app = setup_app().await;

        send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;

        let (status, body) = send(&app, Method::GET, "/api/employee/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["age"], 30);

        let (status, body) = send(&app, Method::GET, "/api/employee/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Employee not found.");
    }

    #[tokio::test]
    async fn update_preserves_omitted_fields() {
        let app = setup_app().await;

        send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/employee/1",
            Some(json!({"age": 31})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["age"], 31);
        assert!(body["updated_at"].is_string());

        let (_, body) = send(&app, Method::GET, "/api/employee/1", None).await;
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["age"], 31);
        assert!(body["updated_at"].is_string());
    }

    #[tokio::test]
    async fn update_missing_record_returns_404() {
        let app = setup_app().await;

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/employee/42",
            Some(json!({"name": "Ghost"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Employee not found.");
    }

    #[tokio::test]
    async fn delete_removes_the_record_or_404() {
        let app = setup_app().await;

        send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;

        let (status, body) = send(&app, Method::DELETE, "/api/employee/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Employee with ID 1 deleted.");

        let (status, _) = send(&app, Method::DELETE, "/api/employee/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_removes_everything_even_when_empty() {
        let app = setup_app().await;

        let (status, body) = send(&app, Method::DELETE, "/api/employees", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "All employees have been removed.");

        send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;
        send(&app, Method::DELETE, "/api/employees", None).await;

        let (status, body) = send(&app, Method::GET, "/api/employees", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn deleted_ids_are_never_reassigned() {
        let app = setup_app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Alice", "age": 30})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 1);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "alice", "age": 30})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Bob", "age": 25})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 2);

        let (status, _) = send(&app, Method::DELETE, "/api/employee/1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/employee",
            Some(json!({"name": "Carol", "age": 40})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 3);

        let (status, body) = send(&app, Method::GET, "/api/employees", None).await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().expect("array body");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], 2);
        assert_eq!(records[0]["name"], "Bob");
        assert_eq!(records[1]["id"], 3);
        assert_eq!(records[1]["name"], "Carol");
    }
}
