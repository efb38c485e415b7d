//! Request-scoped façade over store, parser and engine.
//!
//! Each execute call gets its own [`Interceptor`] (the request's policy and
//! execution log) while recordings are shared across calls so a later request
//! can replay what an earlier one recorded.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::definition::ProcessDefinition;
use crate::engine::ExecutionEngine;
use crate::error::EngineError;
use crate::executor::{HttpBusinessClient, NodeExecutor, NodeRunner};
use crate::export::{definition_to_bpmn_xml, is_valid_prefix};
use crate::intercept::{CallRecorder, InterceptPolicy, Interceptor, Recordings};
use crate::locks::InstanceLocks;
use crate::parser::parse_bpmn;
use crate::store::WorkflowStore;
use crate::store_memory::MemoryStore;
use crate::types::*;

/// Mock-mode input: everything the engine needs, nothing read from the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockExecuteRequest {
    pub instance: WorkflowInstance,
    pub bpmn_xml: String,
    #[serde(default)]
    pub from_node_id: String,
    #[serde(default)]
    pub business_params: Variables,
    /// Seeded results by call key.
    #[serde(default)]
    pub mocks: HashMap<String, Value>,
}

pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    executor: Arc<dyn NodeExecutor>,
    recordings: Arc<Recordings>,
    recorder: Option<Arc<dyn CallRecorder>>,
    locks: InstanceLocks,
    config: EngineConfig,
}

impl WorkflowService {
    /// Service with the HTTP node runner, using the configured timeout.
    pub fn new(store: Arc<dyn WorkflowStore>, config: EngineConfig) -> anyhow::Result<Self> {
        let client = HttpBusinessClient::new(config.service_task_timeout())?;
        let executor = Arc::new(NodeRunner::new(Arc::new(client)));
        Ok(Self::with_executor(store, executor, config))
    }

    pub fn with_executor(
        store: Arc<dyn WorkflowStore>,
        executor: Arc<dyn NodeExecutor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            executor,
            recordings: Arc::new(Recordings::bounded(config.max_recordings)),
            recorder: None,
            locks: InstanceLocks::new(),
            config,
        }
    }

    /// Report every intercepted call of every request to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn CallRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recordings(&self) -> &Arc<Recordings> {
        &self.recordings
    }

    /// Policy for a request: configured default mode plus the request's rules.
    pub fn policy_for(&self, overrides: Option<&InterceptPolicy>) -> InterceptPolicy {
        let base = InterceptPolicy::new(self.config.default_intercept_mode);
        match overrides {
            Some(rules) => base.merge(rules),
            None => base,
        }
    }

    // ── Workflows ──

    /// Parse to validate, then store. The id defaults to the process id.
    pub async fn register_workflow(
        &self,
        id: Option<String>,
        name: Option<String>,
        bpmn_xml: String,
    ) -> Result<WorkflowRecord, EngineError> {
        let def = parse_bpmn(&bpmn_xml)?;
        let record = WorkflowRecord {
            id: id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| def.process_id().to_string()),
            name: name.unwrap_or_else(|| def.process_id().to_string()),
            bpmn_xml,
        };
        self.store
            .save_workflow(&record)
            .await
            .map_err(EngineError::from_store)?;
        tracing::info!(
            workflow_id = %record.id,
            nodes = def.nodes().len(),
            fingerprint = %def.fingerprint(),
            "registered workflow"
        );
        Ok(record)
    }

    pub async fn get_workflow(&self, id: &str) -> Result<WorkflowRecord, EngineError> {
        self.store
            .load_workflow(id)
            .await
            .map_err(EngineError::from_store)?
            .ok_or_else(|| EngineError::WorkflowNotFound {
                workflow_id: id.to_string(),
            })
    }

    /// Stored BPMN re-serialized with the given namespace prefix.
    pub async fn export_workflow(
        &self,
        id: &str,
        prefix: Option<&str>,
    ) -> Result<String, EngineError> {
        if let Some(p) = prefix.filter(|p| !is_valid_prefix(p)) {
            return Err(EngineError::InvalidRequest {
                message: format!("'{p}' is not a usable XML namespace prefix"),
            });
        }
        let record = self.get_workflow(id).await?;
        let def = parse_bpmn(&record.bpmn_xml)?;
        definition_to_bpmn_xml(&def, prefix).map_err(|e| EngineError::Store {
            message: format!("{e:#}"),
        })
    }

    // ── Instances ──

    pub async fn create_instance(
        &self,
        workflow_id: &str,
        variables: Variables,
    ) -> Result<WorkflowInstance, EngineError> {
        self.get_workflow(workflow_id).await?;
        let instance = WorkflowInstance::new(workflow_id, variables);
        self.store
            .save_instance(&instance)
            .await
            .map_err(EngineError::from_store)?;
        tracing::info!(instance_id = %instance.id, workflow_id, "created instance");
        Ok(instance)
    }

    pub async fn get_instance(&self, id: Uuid) -> Result<WorkflowInstance, EngineError> {
        self.store
            .load_instance(id)
            .await
            .map_err(EngineError::from_store)?
            .ok_or(EngineError::InstanceNotFound { instance_id: id })
    }

    pub async fn list_executions(&self, id: Uuid) -> Result<Vec<WorkflowExecution>, EngineError> {
        self.get_instance(id).await?;
        self.store
            .list_executions(id)
            .await
            .map_err(EngineError::from_store)
    }

    // ── Execution ──

    /// `execute_from_node` against a stored instance, serialized per instance.
    pub async fn execute(
        &self,
        instance_id: Uuid,
        request: ExecuteRequest,
        policy: Option<&InterceptPolicy>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let _guard = self.locks.acquire(instance_id).await;

        let instance = self.get_instance(instance_id).await?;
        let workflow = self.get_workflow(&instance.workflow_id).await?;
        let def = parse_bpmn(&workflow.bpmn_xml)?;

        let interceptor = self.interceptor(
            self.store.clone(),
            self.policy_for(policy),
            self.recordings.clone(),
        );
        ExecutionEngine::new(Arc::new(interceptor), self.config.clone())
            .execute_from_node(&def, instance, request)
            .await
    }

    /// Run against a throwaway store with every call mocked unless `policy`
    /// says otherwise. Seeded `mocks` answer matching call keys.
    pub async fn execute_mock(
        &self,
        request: MockExecuteRequest,
        policy: Option<&InterceptPolicy>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let def: ProcessDefinition = parse_bpmn(&request.bpmn_xml)?;

        let scratch = Arc::new(MemoryStore::new());
        scratch
            .save_instance(&request.instance)
            .await
            .map_err(EngineError::from_store)?;

        let mut mock_policy = InterceptPolicy::mock_all();
        if let Some(overrides) = policy {
            mock_policy = mock_policy.merge(overrides);
        }
        let interceptor = self.interceptor(
            scratch,
            mock_policy,
            Arc::new(Recordings::from_map(request.mocks)),
        );

        let execute = ExecuteRequest {
            from_node_id: request.from_node_id,
            business_params: request.business_params,
        };
        ExecutionEngine::new(Arc::new(interceptor), self.config.clone())
            .execute_from_node(&def, request.instance, execute)
            .await
    }

    fn interceptor(
        &self,
        store: Arc<dyn WorkflowStore>,
        policy: InterceptPolicy,
        recordings: Arc<Recordings>,
    ) -> Interceptor {
        let interceptor = Interceptor::new(store, self.executor.clone())
            .with_policy(policy)
            .with_recordings(recordings);
        match &self.recorder {
            Some(recorder) => interceptor.with_recorder(recorder.clone()),
            None => interceptor,
        }
    }
}
