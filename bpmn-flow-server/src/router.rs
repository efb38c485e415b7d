use axum::{
    routing::{get, post},
    Router,
};
use bpmn_flow_core::WorkflowService;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(service: WorkflowService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Workflows
        .route("/api/workflows", post(handlers::register_workflow))
        .route("/api/workflows/:id", get(handlers::get_workflow))
        .route("/api/workflows/:id/export", get(handlers::export_workflow))
        // Instances
        .route("/api/workflow-instances", post(handlers::create_instance))
        .route(
            "/api/workflow-instances/mock/execute",
            post(handlers::execute_mock),
        )
        .route("/api/workflow-instances/:id", get(handlers::get_instance))
        .route(
            "/api/workflow-instances/:id/executions",
            get(handlers::list_executions),
        )
        .route(
            "/api/workflow-instances/:id/execute",
            post(handlers::execute),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
