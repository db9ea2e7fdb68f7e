//! HTTP surface — the transport adapter in front of the coordinator.
//!
//! Protocol endpoints (`/api/v1/handshake|heartbeat|configure`) always
//! answer `200` with a structured body; a rejection never aborts the
//! connection. The event retrieval endpoint is an authenticated long-poll
//! that drains the session's bounded bus queue. The admin endpoints expose
//! definitions and instances; instance payloads never include auth tokens.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use hive_core::{
    AuthToken, ConfigureRequest, ConfigureResponse, EventPollResponse, HandshakeRequest,
    HandshakeResponse, HeartbeatRequest, HeartbeatResponse, HiveError, PluginDefinition,
    PluginId, PluginInstance, SessionId,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;
use crate::health::{self, HealthResponse};

/// Longest first-event wait a poll may request.
const MAX_POLL_WAIT: Duration = Duration::from_secs(30);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The coordinator behind every endpoint.
    pub coordinator: Arc<Coordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// Build the router with all routes.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let state = AppState {
        coordinator,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/handshake", post(handshake))
        .route("/api/v1/heartbeat", post(heartbeat))
        .route("/api/v1/configure", post(configure))
        .route("/api/v1/events", get(poll_events))
        .route("/api/v1/plugins", get(list_definitions))
        .route("/api/v1/plugins/instances", get(list_instances))
        .route(
            "/api/v1/plugins/instances/{id}",
            get(get_instance).put(update_instance),
        )
        .route(
            "/api/v1/plugins/{id}",
            get(get_definition).put(update_definition),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────────

/// JSON error body for non-protocol endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
    /// Stable machine-readable code.
    pub code: String,
}

struct ApiError(HiveError);

impl From<HiveError> for ApiError {
    fn from(err: HiveError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HiveError::Authentication => StatusCode::UNAUTHORIZED,
            HiveError::Authorization => StatusCode::FORBIDDEN,
            HiveError::VersionIncompatible { .. } => StatusCode::BAD_REQUEST,
            HiveError::SessionNotFound(_)
            | HiveError::DefinitionNotFound(_)
            | HiveError::NotSubscribed(_) => StatusCode::NOT_FOUND,
            HiveError::ChannelFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            HiveError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

// ── Protocol endpoints ──────────────────────────────────────────────────

/// POST /api/v1/handshake
async fn handshake(
    State(state): State<AppState>,
    Json(req): Json<HandshakeRequest>,
) -> Json<HandshakeResponse> {
    Json(state.coordinator.handshake(req).await)
}

/// POST /api/v1/heartbeat
async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    Json(state.coordinator.heartbeat(req).await)
}

/// POST /api/v1/configure
async fn configure(
    State(state): State<AppState>,
    Json(req): Json<ConfigureRequest>,
) -> Json<ConfigureResponse> {
    Json(state.coordinator.configure(req).await)
}

/// Query parameters for event retrieval.
#[derive(Debug, Deserialize)]
struct EventPollQuery {
    session_id: String,
    auth_token: String,
    /// How long to wait for the first event, in milliseconds. Defaults to
    /// an immediate drain.
    #[serde(default)]
    wait_ms: u64,
}

/// GET /api/v1/events — authenticated long-poll draining the session queue.
async fn poll_events(
    State(state): State<AppState>,
    Query(query): Query<EventPollQuery>,
) -> Result<Json<EventPollResponse>, ApiError> {
    let wait = Duration::from_millis(query.wait_ms).min(MAX_POLL_WAIT);
    let batch = state
        .coordinator
        .poll_events(
            &SessionId::from(query.session_id),
            &AuthToken::from(query.auth_token),
            wait,
        )
        .await?;
    Ok(Json(batch))
}

// ── Admin endpoints ─────────────────────────────────────────────────────

/// Definition payload exposed over the admin API.
#[derive(Debug, Serialize, Deserialize)]
pub struct DefinitionResponse {
    /// Plugin id.
    pub id: String,
    /// Plugin build version.
    pub version: String,
    /// Declared API version.
    pub api_version: String,
    /// Dependency plugin ids.
    pub depends_on: Vec<String>,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Whether the definition is enabled.
    pub enabled: bool,
}

impl From<PluginDefinition> for DefinitionResponse {
    fn from(def: PluginDefinition) -> Self {
        Self {
            id: def.id.into_inner(),
            version: def.version,
            api_version: def.api_version,
            depends_on: def.depends_on.into_iter().map(PluginId::into_inner).collect(),
            capabilities: def.capabilities.into_iter().collect(),
            enabled: def.enabled,
        }
    }
}

/// List wrapper for definitions.
#[derive(Debug, Serialize, Deserialize)]
pub struct DefinitionListResponse {
    /// Registered definitions.
    pub plugins: Vec<DefinitionResponse>,
    /// Count of `plugins`.
    pub total: usize,
}

/// Instance payload exposed over the admin API. Never carries the auth
/// token.
#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceResponse {
    /// Session id.
    pub id: String,
    /// Owning plugin id.
    pub plugin_id: String,
    /// Liveness state.
    pub status: String,
    /// Whether the instance is enabled.
    pub enabled: bool,
    /// When the session was established.
    pub started_at: DateTime<Utc>,
    /// Last recorded heartbeat, if any.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl From<PluginInstance> for InstanceResponse {
    fn from(inst: PluginInstance) -> Self {
        Self {
            id: inst.id.into_inner(),
            plugin_id: inst.definition_id.into_inner(),
            status: inst.status.as_str().to_owned(),
            enabled: inst.enabled,
            started_at: inst.started_at,
            last_heartbeat: inst.last_heartbeat,
        }
    }
}

/// List wrapper for instances.
#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceListResponse {
    /// All instance rows.
    pub instances: Vec<InstanceResponse>,
    /// Count of `instances`.
    pub total: usize,
}

/// Body for the enabled-flag update endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateEnabledRequest {
    /// Desired enabled state.
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

/// GET /api/v1/plugins
async fn list_definitions(
    State(state): State<AppState>,
) -> Result<Json<DefinitionListResponse>, ApiError> {
    let defs = state.coordinator.list_definitions().await?;
    let plugins: Vec<DefinitionResponse> = defs.into_iter().map(Into::into).collect();
    let total = plugins.len();
    Ok(Json(DefinitionListResponse { plugins, total }))
}

/// GET /api/v1/plugins/{id}
async fn get_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DefinitionResponse>, ApiError> {
    let def = state.coordinator.get_definition(&PluginId::from(id)).await?;
    Ok(Json(def.into()))
}

/// PUT /api/v1/plugins/{id}
async fn update_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEnabledRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .coordinator
        .set_definition_enabled(&PluginId::from(id), req.enabled)
        .await?;
    Ok(Json(StatusBody { status: "ok" }))
}

/// GET /api/v1/plugins/instances
async fn list_instances(
    State(state): State<AppState>,
) -> Result<Json<InstanceListResponse>, ApiError> {
    let rows = state.coordinator.list_instances().await?;
    let instances: Vec<InstanceResponse> = rows.into_iter().map(Into::into).collect();
    let total = instances.len();
    Ok(Json(InstanceListResponse { instances, total }))
}

/// GET /api/v1/plugins/instances/{id}
async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InstanceResponse>, ApiError> {
    let inst = state.coordinator.get_instance(&SessionId::from(id)).await?;
    Ok(Json(inst.into()))
}

/// PUT /api/v1/plugins/instances/{id}
async fn update_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEnabledRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .coordinator
        .set_instance_enabled(&SessionId::from(id), req.enabled)
        .await?;
    Ok(Json(StatusBody { status: "ok" }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let subscribers = state.coordinator.bus().subscriber_count().await;
    Json(health::health_check(state.start_time, subscribers))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
