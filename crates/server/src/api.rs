// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST surface for workflows and approvals.
//!
//! Error envelope: `{error, code, details?}`. Status mapping:
//! validation → 400, exclusivity → 409, cap → 429, not found → 404,
//! internal → 500.

use crate::ws::{ws_events, ConnectionManager, WsSettings};
use amelia_adapters::{Driver, Tracker};
use amelia_core::{Clock, EventRecord, IdGen, Workflow, WorkflowId, WorkflowStatus, WorkflowType};
use amelia_engine::{ActionOutcome, Orchestrator, OrchestratorError, StartWorkflowRequest};
use amelia_storage::EventStore;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

const DETAIL_RECENT_EVENTS: usize = 50;
const EVENTS_PAGE_LIMIT: usize = 200;

/// Shared state behind every handler.
pub struct AppState<D: Driver, T: Tracker, C: Clock + 'static, G: IdGen + 'static> {
    pub orchestrator: Orchestrator<D, T, C, G>,
    pub manager: Arc<ConnectionManager>,
    pub events: Arc<Mutex<EventStore>>,
    pub ws: WsSettings,
}

impl<D: Driver, T: Tracker, C: Clock + 'static, G: IdGen + 'static> Clone
    for AppState<D, T, C, G>
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            manager: Arc::clone(&self.manager),
            events: Arc::clone(&self.events),
            ws: self.ws.clone(),
        }
    }
}

/// Build the router for the full HTTP/WS surface.
pub fn router<D, T, C, G>(state: AppState<D, T, C, G>) -> Router
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route("/api/workflows/:id", get(workflow_detail))
        .route("/api/workflows/:id/events", get(workflow_events))
        .route("/api/workflows/:id/approve", post(approve_workflow))
        .route("/api/workflows/:id/reject", post(reject_workflow))
        .route("/api/workflows/:id/cancel", post(cancel_workflow))
        .route("/ws/events", get(ws_events))
        .route("/health", get(health))
        .with_state(state)
}

// -- error envelope --

pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: self.message,
            code: self.code,
            details: None,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let (status, code) = match &e {
            OrchestratorError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            OrchestratorError::NotAwaitingApproval { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_state")
            }
            OrchestratorError::WorkflowConflict { .. } => {
                (StatusCode::CONFLICT, "workflow_conflict")
            }
            OrchestratorError::RateLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limit"),
            OrchestratorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            OrchestratorError::Tracker(_) => (StatusCode::BAD_GATEWAY, "tracker_error"),
            OrchestratorError::InvalidTransition(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_transition")
            }
            OrchestratorError::Driver(_)
            | OrchestratorError::Cancelled
            | OrchestratorError::Persistence(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self {
            status,
            code,
            message: e.to_string(),
        }
    }
}

// -- request/response bodies --

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowBody {
    pub issue_id: String,
    pub worktree_path: PathBuf,
    #[serde(default)]
    pub worktree_name: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub task_description: Option<String>,
    #[serde(default)]
    pub workflow_type: Option<WorkflowType>,
}

#[derive(Serialize)]
struct ActionResponse {
    id: WorkflowId,
    status: WorkflowStatus,
    message: String,
}

#[derive(Serialize)]
struct WorkflowListResponse {
    workflows: Vec<Workflow>,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Comma-separated statuses.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub feedback: String,
}

// -- handlers --

async fn health() -> &'static str {
    "ok"
}

async fn create_workflow<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    Json(body): Json<CreateWorkflowBody>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let request = StartWorkflowRequest {
        issue_id: body.issue_id,
        worktree_path: body.worktree_path,
        worktree_name: body.worktree_name,
        profile: body.profile,
        driver: body.driver,
        task_title: body.task_title,
        task_description: body.task_description,
        workflow_type: body.workflow_type.unwrap_or_default(),
    };
    let id = state.orchestrator.start_workflow(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ActionResponse {
            id: id.clone(),
            status: WorkflowStatus::Pending,
            message: format!("workflow {id} created"),
        }),
    ))
}

async fn list_workflows<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<WorkflowListResponse>, ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let statuses = match &query.status {
        Some(raw) => {
            let mut statuses = Vec::new();
            for part in raw.split(',').filter(|s| !s.is_empty()) {
                let status: WorkflowStatus = part.parse().map_err(|e: String| ApiError {
                    status: StatusCode::BAD_REQUEST,
                    code: "invalid_request",
                    message: e,
                })?;
                statuses.push(status);
            }
            Some(statuses)
        }
        None => None,
    };

    let workflows = state.orchestrator.list_workflows(statuses.as_deref());
    Ok(Json(WorkflowListResponse { workflows }))
}

async fn workflow_detail<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<amelia_engine::WorkflowDetail>, ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let id = WorkflowId::new(id);
    state
        .orchestrator
        .detail(&id, DETAIL_RECENT_EVENTS)
        .map(Json)
        .ok_or_else(|| ApiError::from(OrchestratorError::NotFound(id)))
}

/// REST fallback when the WebSocket backfill cap is not enough.
async fn workflow_events<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let id = WorkflowId::new(id);
    if state.orchestrator.workflow(&id).is_none() {
        return Err(ApiError::from(OrchestratorError::NotFound(id)));
    }
    let limit = query.limit.unwrap_or(EVENTS_PAGE_LIMIT).min(EVENTS_PAGE_LIMIT);
    let events = state
        .events
        .lock()
        .after_sequence(&id, query.after.unwrap_or(0), limit);
    Ok(Json(EventsResponse { events }))
}

async fn approve_workflow<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ActionResponse>, ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let id = WorkflowId::new(id);
    let outcome = state.orchestrator.approve(&id)?;
    Ok(Json(action_response(&state, &id, outcome, "approved")))
}

async fn reject_workflow<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<RejectBody>,
) -> Result<Json<ActionResponse>, ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let id = WorkflowId::new(id);
    let outcome = state.orchestrator.reject(&id, body.feedback)?;
    Ok(Json(action_response(&state, &id, outcome, "rejected")))
}

async fn cancel_workflow<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ActionResponse>, ApiError>
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let id = WorkflowId::new(id);
    let outcome = state.orchestrator.cancel(&id)?;
    Ok(Json(action_response(
        &state,
        &id,
        outcome,
        "cancellation requested",
    )))
}

fn action_response<D, T, C, G>(
    state: &AppState<D, T, C, G>,
    id: &WorkflowId,
    outcome: ActionOutcome,
    verb: &str,
) -> ActionResponse
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let status = state
        .orchestrator
        .workflow(id)
        .map(|w| w.status)
        .unwrap_or(WorkflowStatus::Pending);
    let message = match outcome {
        ActionOutcome::Applied => format!("workflow {id} {verb}"),
        ActionOutcome::AlreadyTerminal(status) => {
            format!("workflow {id} is already {status}")
        }
    };
    ActionResponse {
        id: id.clone(),
        status,
        message,
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
