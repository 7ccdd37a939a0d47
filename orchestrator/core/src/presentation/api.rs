// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Trigger surface for the engine: manual scheduler ticks, propagation cycles,
//! single agent runs and health, plus the graph editing endpoints. Handlers only
//! translate between JSON and [`Engine`] calls.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::agent::{CreateAgentRequest, LifecycleError, UpdateAgentRequest};
use crate::application::dispatcher::DispatchError;
use crate::application::engine::Engine;
use crate::domain::agent::{AgentId, RunKind, UserId};
use crate::domain::event::EventId;
use crate::domain::link::GraphError;
use crate::domain::repository::RepositoryError;

const DEFAULT_LIST_LIMIT: usize = 50;

pub fn app(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/schedule/run", post(run_schedule))
        .route("/v1/propagate", post(propagate))
        .route("/v1/events/cleanup", post(cleanup_events))
        .route("/v1/agents", get(list_agents).post(create_agent))
        .route("/v1/agents/{id}", get(get_agent).patch(update_agent).delete(delete_agent))
        .route("/v1/agents/{id}/run", post(run_agent))
        .route("/v1/agents/{id}/health", get(agent_health))
        .route("/v1/agents/{id}/events", get(agent_events).delete(remove_agent_events))
        .route("/v1/agents/{id}/logs", get(agent_logs))
        .route("/v1/agents/{id}/memory", delete(clear_memory))
        .route("/v1/agents/{id}/pending", delete(drop_pending))
        .route("/v1/links", get(list_links).post(create_link))
        .route("/v1/links/{source_id}/{receiver_id}", delete(delete_link))
        .route("/v1/users/{id}/deactivate", post(deactivate_user))
        .route("/v1/users/{id}/activate", post(activate_user))
        .with_state(engine)
}

/// Error body: `{"error": "..."}` with a status derived from the failure.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        let status = match err {
            RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        let status = match &err {
            LifecycleError::AgentNotFound(_) | LifecycleError::Graph(GraphError::UnknownAgent(_)) => {
                StatusCode::NOT_FOUND
            }
            LifecycleError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = match &err {
            DispatchError::AgentNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Busy(_) | DispatchError::NotRunnable(_) | DispatchError::NothingPending(_) => {
                StatusCode::CONFLICT
            }
            DispatchError::UnknownType(_) | DispatchError::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

type ApiResult = Result<Response, ApiError>;

fn ok<T: serde::Serialize>(value: T) -> ApiResult {
    Ok(Json(value).into_response())
}

async fn health_check(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": (Utc::now() - engine.started_at).num_seconds().max(0),
        "agent_types": engine.registry.descriptors().len(),
        "event_bus_subscribers": engine.event_bus.subscriber_count(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleRunRequest {
    /// Minute to evaluate; defaults to now.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

async fn run_schedule(State(engine): State<Arc<Engine>>, body: Bytes) -> ApiResult {
    let request: ScheduleRunRequest = if body.is_empty() {
        ScheduleRunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    };
    ok(engine.run_schedule(request.at.unwrap_or_else(Utc::now)).await?)
}

async fn propagate(State(engine): State<Arc<Engine>>) -> ApiResult {
    ok(engine.propagate().await?)
}

async fn cleanup_events(State(engine): State<Arc<Engine>>) -> ApiResult {
    let removed = engine.lifecycle.cleanup_expired(Utc::now()).await?;
    ok(json!({ "removed": removed }))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub user_id: Option<Uuid>,
}

async fn list_agents(State(engine): State<Arc<Engine>>, Query(query): Query<ListAgentsQuery>) -> ApiResult {
    ok(engine.lifecycle.list_agents(query.user_id.map(UserId)).await?)
}

async fn create_agent(State(engine): State<Arc<Engine>>, Json(request): Json<CreateAgentRequest>) -> ApiResult {
    let agent = engine.lifecycle.create_agent(request).await?;
    Ok((StatusCode::CREATED, Json(agent)).into_response())
}

async fn get_agent(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    ok(engine.lifecycle.get_agent(AgentId(id)).await?)
}

async fn update_agent(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAgentRequest>,
) -> ApiResult {
    ok(engine.lifecycle.update_agent(AgentId(id), request).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteAgentQuery {
    #[serde(default)]
    pub delete_events: bool,
}

async fn delete_agent(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteAgentQuery>,
) -> ApiResult {
    engine.lifecycle.delete_agent(AgentId(id), query.delete_events).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct RunAgentRequest {
    pub kind: RunKind,
    /// Explicit events for a receive; omitted means the pending batch.
    #[serde(default)]
    pub event_ids: Option<Vec<u64>>,
}

async fn run_agent(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RunAgentRequest>,
) -> ApiResult {
    let event_ids = request
        .event_ids
        .map(|ids| ids.into_iter().map(EventId).collect());
    ok(engine.run_agent(AgentId(id), request.kind, event_ids).await?)
}

async fn agent_health(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    ok(engine.health(AgentId(id), Utc::now()).await?)
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn agent_events(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    ok(engine.lifecycle.recent_events(AgentId(id), limit).await?)
}

async fn remove_agent_events(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    let removed = engine.lifecycle.remove_events(AgentId(id)).await?;
    ok(json!({ "removed": removed }))
}

async fn agent_logs(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    ok(engine.lifecycle.logs(AgentId(id), limit).await?)
}

async fn clear_memory(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    engine.lifecycle.clear_memory(AgentId(id)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn drop_pending(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    let cursor = engine.lifecycle.drop_pending_events(AgentId(id)).await?;
    ok(json!({ "cursor": cursor }))
}

async fn list_links(State(engine): State<Arc<Engine>>) -> ApiResult {
    ok(engine.lifecycle.list_links().await?)
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub source_id: Uuid,
    pub receiver_id: Uuid,
}

async fn create_link(State(engine): State<Arc<Engine>>, Json(request): Json<CreateLinkRequest>) -> ApiResult {
    let created = engine
        .lifecycle
        .connect(AgentId(request.source_id), AgentId(request.receiver_id))
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "created": created }))).into_response())
}

async fn delete_link(
    State(engine): State<Arc<Engine>>,
    Path((source_id, receiver_id)): Path<(Uuid, Uuid)>,
) -> ApiResult {
    let removed = engine
        .lifecycle
        .disconnect(AgentId(source_id), AgentId(receiver_id))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, "Link not found"))
    }
}

async fn deactivate_user(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    let agents = engine.lifecycle.deactivate_user(UserId(id)).await?;
    ok(json!({ "agents": agents }))
}

async fn activate_user(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> ApiResult {
    let agents = engine.lifecycle.activate_user(UserId(id)).await?;
    ok(json!({ "agents": agents }))
}
