//! Axum server and routes.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use caller_spam::{SpamDetectionService, SpamServiceError};
use caller_types::{
    CallDirection, CallFilters, CallsResponse, ErrorKind, ErrorResponse, GraphQuery, GraphStore,
    GraphStoreError, HealthResponse, Node, RulesResponse, SpamDetectionRequest,
    SpamDetectionResult,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub graph: Arc<dyn GraphStore>,
    pub spam: SpamDetectionService,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/spam/detect", post(handle_detect))
        .route("/api/v1/spam/score", get(handle_score))
        .route("/api/v1/spam/rules", get(handle_rules))
        .route("/api/v1/graph/nodes/:phone", get(handle_get_node))
        .route("/api/v1/graph/calls/:phone", get(handle_get_calls))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response: status from the error kind, body `{error, message}`.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::Validation | ErrorKind::Deserialization => StatusCode::BAD_REQUEST,
            ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.kind, message = %self.message, "request failed");
        }
        let body = ErrorResponse {
            error: self.kind,
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<GraphStoreError> for ApiError {
    fn from(e: GraphStoreError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<SpamServiceError> for ApiError {
    fn from(e: SpamServiceError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::new(
            ErrorKind::Deserialization,
            format!("Invalid request body: {}", e.body_text()),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::new(
            ErrorKind::Deserialization,
            format!("Invalid query string: {}", e.body_text()),
        )
    }
}

async fn detect(
    state: &AppState,
    req: &SpamDetectionRequest,
) -> Result<Json<SpamDetectionResult>, ApiError> {
    if req.phone_number.trim().is_empty() {
        return Err(ApiError::new(
            ErrorKind::Validation,
            "phone_number is required",
        ));
    }
    let result = state
        .spam
        .detect_spam(&req.phone_number, req.user_phone())
        .await?;
    Ok(Json(result))
}

async fn handle_detect(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SpamDetectionRequest>, JsonRejection>,
) -> Result<Json<SpamDetectionResult>, ApiError> {
    let Json(req) = body?;
    detect(&state, &req).await
}

async fn handle_score(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SpamDetectionRequest>, QueryRejection>,
) -> Result<Json<SpamDetectionResult>, ApiError> {
    let Query(req) = query?;
    detect(&state, &req).await
}

async fn handle_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    let rules = state.spam.get_registered_rules();
    Json(RulesResponse {
        count: rules.len(),
        rules,
    })
}

async fn handle_get_node(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> Result<Json<Node>, ApiError> {
    Ok(Json(state.graph.get_node(&phone).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallsQuery {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub is_answered: Option<bool>,
    #[serde(default)]
    pub min_duration: Option<i64>,
    #[serde(default)]
    pub max_duration: Option<i64>,
}

async fn handle_get_calls(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    query: Result<Query<CallsQuery>, QueryRejection>,
) -> Result<Json<CallsResponse>, ApiError> {
    let Query(q) = query?;
    let direction = match q.direction.as_deref() {
        Some(d) => d
            .parse::<CallDirection>()
            .map_err(|e| ApiError::new(ErrorKind::Validation, e.to_string()))?,
        None => CallDirection::default(),
    };
    let filters = CallFilters {
        is_answered: q.is_answered,
        min_duration: q.min_duration,
        max_duration: q.max_duration,
        ..CallFilters::default()
    };
    let edges = state
        .graph
        .get_calls_with_filters(&phone, &filters, direction)
        .await?;
    Ok(Json(CallsResponse {
        phone_number: phone,
        count: edges.len(),
        edges,
    }))
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
