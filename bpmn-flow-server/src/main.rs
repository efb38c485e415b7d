//! bpmn-flow server: REST front end over the in-memory store.

use anyhow::{Context, Result};
use bpmn_flow_core::store_memory::MemoryStore;
use bpmn_flow_core::WorkflowService;
use bpmn_flow_server::{build_router, AppState, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bpmn_flow_server=debug,bpmn_flow_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        service_task_timeout_ms = config.engine.service_task_timeout_ms,
        max_steps = config.engine.max_steps,
        default_intercept_mode = %config.engine.default_intercept_mode,
        "engine configuration"
    );

    let service = WorkflowService::new(Arc::new(MemoryStore::new()), config.engine.clone())?;
    let app = build_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!("bpmn-flow server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
