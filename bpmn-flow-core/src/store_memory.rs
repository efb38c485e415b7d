use crate::store::{StoreError, WorkflowStore};
use crate::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory WorkflowStore for tests, mock runs and the default server.
///
/// Executions are kept per instance in insertion order.
pub struct MemoryStore {
    workflows: RwLock<HashMap<String, WorkflowRecord>>,
    instances: RwLock<HashMap<Uuid, WorkflowInstance>>,
    executions: RwLock<HashMap<Uuid, Vec<WorkflowExecution>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<()> {
        let mut store = self.workflows.write().map_err(|e| anyhow!("Lock: {}", e))?;
        store.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn load_workflow(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        let store = self.workflows.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(id).cloned())
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<()> {
        let mut store = self.instances.write().map_err(|e| anyhow!("Lock: {}", e))?;
        store.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn load_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>> {
        let store = self.instances.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(&id).cloned())
    }

    async fn update_instance(&self, update: &InstanceUpdate) -> Result<WorkflowInstance> {
        let mut store = self.instances.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let instance = store
            .get_mut(&update.instance_id)
            .ok_or(StoreError::InstanceNotFound {
                instance_id: update.instance_id,
            })?;

        if let Some(expected) = update.expected_version {
            if instance.version != expected {
                return Err(StoreError::VersionConflict {
                    instance_id: update.instance_id,
                    expected,
                    actual: instance.version,
                }
                .into());
            }
        }

        instance.status = update.status;
        instance.current_node_ids = update.current_node_ids.clone();
        instance.version += 1;
        instance.updated_at = Utc::now();
        Ok(instance.clone())
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution> {
        let mut store = self.executions.write().map_err(|e| anyhow!("Lock: {}", e))?;
        store
            .entry(execution.instance_id)
            .or_default()
            .push(execution.clone());
        Ok(execution.clone())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution> {
        let mut store = self.executions.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let slot = store
            .get_mut(&execution.instance_id)
            .and_then(|list| list.iter_mut().find(|e| e.id == execution.id))
            .ok_or(StoreError::ExecutionNotFound {
                execution_id: execution.id,
            })?;
        *slot = execution.clone();
        Ok(execution.clone())
    }

    async fn list_executions(&self, instance_id: Uuid) -> Result<Vec<WorkflowExecution>> {
        let store = self.executions.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(&instance_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_bumps_version_and_checks_expected() {
        let store = MemoryStore::new();
        let instance = WorkflowInstance::new("wf", Variables::new());
        store.save_instance(&instance).await.unwrap();

        let updated = store
            .update_instance(&InstanceUpdate {
                instance_id: instance.id,
                status: InstanceStatus::Running,
                current_node_ids: vec!["a".into()],
                expected_version: Some(0),
            })
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.current_node_ids, vec!["a"]);

        let stale = store
            .update_instance(&InstanceUpdate {
                instance_id: instance.id,
                status: InstanceStatus::Running,
                current_node_ids: vec!["b".into()],
                expected_version: Some(0),
            })
            .await
            .unwrap_err();
        assert_eq!(
            stale.downcast_ref::<StoreError>(),
            Some(&StoreError::VersionConflict {
                instance_id: instance.id,
                expected: 0,
                actual: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_update_unknown_instance_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_instance(&InstanceUpdate {
                instance_id: Uuid::new_v4(),
                status: InstanceStatus::Running,
                current_node_ids: vec![],
                expected_version: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InstanceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_execution_history_keeps_order() {
        let store = MemoryStore::new();
        let instance_id = Uuid::new_v4();
        let first = WorkflowExecution::pending(instance_id, Variables::new()).start();
        let second = WorkflowExecution::pending(instance_id, Variables::new()).start();
        store.create_execution(&first).await.unwrap();
        store.create_execution(&second).await.unwrap();

        let mut done = first.clone();
        done.finish(ExecutionStatus::Completed, None);
        store.update_execution(&done).await.unwrap();

        let history = store.list_executions(instance_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].status, ExecutionStatus::Completed);
        assert_eq!(history[1].status, ExecutionStatus::Running);
    }
}
