// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! HTTP and SSE surface over the registry service and the event hub.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::registry::{ListFilter, RegistryService};
use crate::domain::error::RegistryError;
use crate::domain::events::{ExecutionEvent, ExecutionId, NodeId, StepStatus, WorkflowId};
use crate::domain::registration::{EntityId, EntityKind, NewRegistration, RegistrationRecord};
use crate::infrastructure::event_hub::EventHub;

pub struct AppState {
    pub registry: Arc<RegistryService>,
    pub hub: Arc<EventHub>,
}

/// Build the HTTP router. Dashboards connect cross-origin, so CORS stays
/// permissive; request tracing comes from the tower-http layer.
pub fn app(registry: Arc<RegistryService>, hub: Arc<EventHub>) -> Router {
    let state = Arc::new(AppState { registry, hub });

    Router::new()
        .route("/health", get(health))
        .route("/registry/register", post(register))
        .route("/registry/heartbeat", post(heartbeat))
        .route("/registry/discover", get(discover))
        .route("/registry/discover/{id}", get(discover_one))
        .route("/registry/discover/capability/{name}", get(discover_by_capability))
        .route("/registry/unregister/{id}", delete(unregister))
        .route("/registry/stats", get(stats))
        .route("/executions/{id}/events", post(publish_event))
        .route("/executions/{id}/stream", get(stream_execution))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error envelope shared by every endpoint: a status code plus
/// `{"error": "..."}` in the body.
pub enum ApiError {
    Registry(RegistryError),
    BadRequest(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Registry(RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.message())
            }
            ApiError::Registry(RegistryError::InvalidRecord(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.message())
            }
            ApiError::Registry(RegistryError::Conflict(_)) => {
                (StatusCode::CONFLICT, self.message())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.message()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl ApiError {
    fn message(&self) -> String {
        match self {
            ApiError::Registry(err) => err.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
        }
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRegistration>,
) -> Result<Json<RegistrationRecord>, ApiError> {
    let record = state.registry.register(payload)?;
    Ok(Json(record))
}

#[derive(serde::Deserialize)]
pub struct HeartbeatRequest {
    pub id: String,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.heartbeat(&EntityId::new(&payload.id))?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(serde::Deserialize, Default)]
pub struct DiscoverQuery {
    pub kind: Option<EntityKind>,
    pub tag: Option<String>,
}

async fn discover(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiscoverQuery>,
) -> Json<Vec<RegistrationRecord>> {
    Json(state.registry.list(&ListFilter {
        kind: query.kind,
        tag: query.tag,
    }))
}

async fn discover_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RegistrationRecord>, ApiError> {
    let record = state.registry.get(&EntityId::new(&id))?;
    Ok(Json(record))
}

async fn discover_by_capability(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Vec<RegistrationRecord>> {
    Json(state.registry.find_by_capability(&name))
}

async fn unregister(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let removed = state.registry.unregister(&EntityId::new(&id));
    Json(json!({ "removed": removed }))
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.stats())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "meridian-registry",
        "registered": state.registry.stats().total,
        "subscribers": state.hub.total_subscribers(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Side-channel publish for executors that report progress over HTTP
/// instead of holding a hub handle in-process.
#[derive(serde::Deserialize)]
pub struct PublishEventRequest {
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub status: StepStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
}

async fn publish_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<PublishEventRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let execution_id = parse_execution_id(&id)?;
    let delivered = state.hub.publish(ExecutionEvent {
        execution_id,
        workflow_id: payload.workflow_id,
        node_id: payload.node_id,
        status: payload.status,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        message: payload.message,
        data: payload.data,
    });
    Ok(Json(json!({ "delivered": delivered })))
}

async fn stream_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let execution_id = parse_execution_id(&id)?;
    let subscription = state.hub.subscribe(execution_id);

    // The subscription is owned by the stream, so client disconnect drops it
    // and the hub forgets the connection.
    let stream = futures::stream::unfold(subscription, |mut sub| async move {
        let event = sub.recv().await?;
        let sse = Event::default().data(serde_json::to_string(&event).unwrap_or_default());
        Some((Ok(sse), sub))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn parse_execution_id(raw: &str) -> Result<ExecutionId, ApiError> {
    Uuid::parse_str(raw)
        .map(ExecutionId)
        .map_err(|_| ApiError::BadRequest(format!("Invalid execution id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        app(
            Arc::new(RegistryService::default()),
            Arc::new(EventHub::default()),
        )
    }

    fn register_body(id: &str) -> String {
        json!({
            "id": id,
            "kind": "tool",
            "name": id,
            "capabilities": [{"name": "add", "description": "", "parameters": null, "returns": null}],
            "endpoint": {"host": "localhost", "port": 9000},
        })
        .to_string()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn register_then_discover_roundtrip() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(
                Request::post("/registry/register")
                    .header("content-type", "application/json")
                    .body(Body::from(register_body("calc-1")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/registry/discover/calc-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], "calc-1");
        assert_eq!(body["kind"], "tool");
    }

    #[tokio::test]
    async fn register_without_capabilities_is_unprocessable() {
        let app = test_app();
        let body = json!({
            "id": "calc-1",
            "kind": "tool",
            "name": "calc-1",
            "capabilities": [],
            "endpoint": {"host": "localhost", "port": 9000},
        })
        .to_string();

        let response = app
            .oneshot(
                Request::post("/registry/register")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_id_is_not_found() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::post("/registry/heartbeat")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"id": "ghost"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unregister_is_idempotent_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(
                Request::post("/registry/register")
                    .header("content-type", "application/json")
                    .body(Body::from(register_body("calc-1")))
                    .unwrap(),
            )
            .await
            .unwrap();

        for expected in [true, false] {
            let response = app
                .clone()
                .oneshot(
                    Request::delete("/registry/unregister/calc-1")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["removed"], expected);
        }
    }

    #[tokio::test]
    async fn publish_rejects_malformed_execution_id() {
        let app = test_app();
        let body = json!({
            "workflow_id": Uuid::new_v4(),
            "node_id": "step-1",
            "status": "running",
        })
        .to_string();

        let response = app
            .oneshot(
                Request::post("/executions/not-a-uuid/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn publish_reports_delivery_count() {
        let registry = Arc::new(RegistryService::default());
        let hub = Arc::new(EventHub::default());
        let app = app(Arc::clone(&registry), Arc::clone(&hub));

        let execution_id = ExecutionId::new();
        let mut sub = hub.subscribe(execution_id);

        let body = json!({
            "workflow_id": Uuid::new_v4(),
            "node_id": "step-1",
            "status": "completed",
            "message": "done",
        })
        .to_string();

        let response = app
            .oneshot(
                Request::post(format!("/executions/{execution_id}/events"))
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["delivered"], 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.status, StepStatus::Completed);
        assert_eq!(event.message.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let app = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["registered"], 0);
    }
}
