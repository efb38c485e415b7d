//! Route handlers. Thin: decode, call `WorkflowService`, encode.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bpmn_flow_core::service::MockExecuteRequest;
use bpmn_flow_core::types::{
    ExecuteRequest, ExecutionOutcome, Variables, WorkflowExecution, WorkflowInstance,
    WorkflowRecord,
};
use bpmn_flow_core::{EngineError, InterceptPolicy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiJson, AppError};
use crate::router::AppState;

pub const INTERCEPT_POLICY_HEADER: &str = "x-intercept-policy";

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWorkflowRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub bpmn_xml: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub variables: Variables,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Namespace prefix for BPMN elements; empty or absent writes unprefixed.
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/workflows
pub async fn register_workflow(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowRecord>), AppError> {
    let record = state
        .service
        .register_workflow(req.id, req.name, req.bpmn_xml)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/workflows/:id
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowRecord>, AppError> {
    Ok(Json(state.service.get_workflow(&id).await?))
}

/// GET /api/workflows/:id/export
pub async fn export_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let prefix = query.prefix.as_deref().filter(|p| !p.is_empty());
    let xml = state.service.export_workflow(&id, prefix).await?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

/// POST /api/workflow-instances
pub async fn create_instance(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateInstanceRequest>,
) -> Result<(StatusCode, Json<WorkflowInstance>), AppError> {
    let instance = state
        .service
        .create_instance(&req.workflow_id, req.variables)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// GET /api/workflow-instances/:id
pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowInstance>, AppError> {
    Ok(Json(state.service.get_instance(id).await?))
}

/// GET /api/workflow-instances/:id/executions
pub async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WorkflowExecution>>, AppError> {
    Ok(Json(state.service.list_executions(id).await?))
}

/// POST /api/workflow-instances/:id/execute
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ExecuteRequest>,
) -> Result<Json<ExecutionOutcome>, AppError> {
    let policy = policy_header(&state, &headers)?;
    let outcome = state.service.execute(id, req, policy.as_ref()).await?;
    Ok(Json(outcome))
}

/// POST /api/workflow-instances/mock/execute
pub async fn execute_mock(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<MockExecuteRequest>,
) -> Result<Json<ExecutionOutcome>, AppError> {
    let policy = policy_header(&state, &headers)?;
    let outcome = state.service.execute_mock(req, policy.as_ref()).await?;
    Ok(Json(outcome))
}

fn policy_header(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<InterceptPolicy>, EngineError> {
    let Some(value) = headers.get(INTERCEPT_POLICY_HEADER) else {
        return Ok(None);
    };
    let raw = value.to_str().map_err(|_| EngineError::InvalidRequest {
        message: format!("{INTERCEPT_POLICY_HEADER} is not valid UTF-8"),
    })?;
    let default_mode = state.service.config().default_intercept_mode;
    InterceptPolicy::from_header(raw, default_mode).map(Some)
}
