use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Persistence trait for workflows, instances and execution history.
///
/// The engine never calls this directly: every write goes through
/// [`crate::intercept::Interceptor`], which decides whether the real store is
/// touched at all.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ── Workflows ──

    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<()>;
    async fn load_workflow(&self, id: &str) -> Result<Option<WorkflowRecord>>;

    // ── Instances ──

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<()>;
    async fn load_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>>;

    /// Apply status and current nodes, bump the version and stamp
    /// `updated_at`. Fails with [`StoreError::VersionConflict`] when
    /// `expected_version` is set and does not match.
    async fn update_instance(&self, update: &InstanceUpdate) -> Result<WorkflowInstance>;

    // ── Executions ──

    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution>;
    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution>;

    /// Executions of an instance, oldest first.
    async fn list_executions(&self, instance_id: Uuid) -> Result<Vec<WorkflowExecution>>;
}

/// Typed failures a store adapter can raise inside its `anyhow::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("instance {instance_id} not found")]
    InstanceNotFound { instance_id: Uuid },

    #[error("execution {execution_id} not found")]
    ExecutionNotFound { execution_id: Uuid },

    #[error("instance {instance_id} is at version {actual}, expected {expected}")]
    VersionConflict {
        instance_id: Uuid,
        expected: u64,
        actual: u64,
    },
}
