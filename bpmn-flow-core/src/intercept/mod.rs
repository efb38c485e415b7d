//! Interception of every externally visible engine effect.
//!
//! [`Interceptor`] decorates the store and the node executor. Each of the four
//! operations derives a call key, looks up its [`InterceptMode`] in the
//! request's [`InterceptPolicy`] and then calls through, replays, synthesizes
//! or records accordingly.

mod policy;
mod recorder;

pub use policy::{call_key, InterceptMode, InterceptPolicy, Operation, WILDCARD};
pub use recorder::{CallRecorder, InterceptedCall, MemoryRecorder, Recordings};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::error::{EngineError, ErrorBody};
use crate::executor::NodeExecutor;
use crate::store::WorkflowStore;
use crate::types::*;

pub struct Interceptor {
    store: Arc<dyn WorkflowStore>,
    executor: Arc<dyn NodeExecutor>,
    policy: InterceptPolicy,
    recordings: Arc<Recordings>,
    recorder: Option<Arc<dyn CallRecorder>>,
    log: Mutex<Vec<InterceptedCall>>,
    sequence: AtomicU64,
}

impl Interceptor {
    pub fn new(store: Arc<dyn WorkflowStore>, executor: Arc<dyn NodeExecutor>) -> Self {
        Self {
            store,
            executor,
            policy: InterceptPolicy::default(),
            recordings: Arc::new(Recordings::new()),
            recorder: None,
            log: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_policy(mut self, policy: InterceptPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_recordings(mut self, recordings: Arc<Recordings>) -> Self {
        self.recordings = recordings;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn CallRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn recordings(&self) -> &Arc<Recordings> {
        &self.recordings
    }

    /// Calls logged so far (enabled and record modes), in order.
    pub fn execution_log(&self) -> Vec<InterceptedCall> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Operations ──

    /// Persist new status / current nodes. Synthesized answer: `instance`
    /// with the update applied and its version bumped.
    pub async fn update_instance(
        &self,
        instance: &WorkflowInstance,
        update: InstanceUpdate,
    ) -> Result<WorkflowInstance, EngineError> {
        let params = vec![
            ("instance_id", json!(update.instance_id)),
            ("status", json!(update.status)),
            ("current_node_ids", json!(update.current_node_ids)),
        ];
        let synthesized = {
            let mut next = instance.clone();
            next.status = update.status;
            next.current_node_ids = update.current_node_ids.clone();
            next.version += 1;
            next.updated_at = Utc::now();
            next
        };
        self.intercept(
            Operation::UpdateInstance,
            params,
            || async {
                self.store
                    .update_instance(&update)
                    .await
                    .map_err(EngineError::from_store)
            },
            || synthesized,
        )
        .await
    }

    pub async fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecution, EngineError> {
        let params = vec![
            ("instance_id", json!(execution.instance_id)),
            ("variables", json!(execution.variables)),
        ];
        self.intercept(
            Operation::CreateExecution,
            params,
            || async {
                self.store
                    .create_execution(execution)
                    .await
                    .map_err(EngineError::from_store)
            },
            || execution.clone(),
        )
        .await
    }

    pub async fn update_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecution, EngineError> {
        let params = vec![
            ("execution_id", json!(execution.id)),
            ("status", json!(execution.status)),
            ("variables", json!(execution.variables)),
            ("error_message", json!(execution.error_message)),
        ];
        self.intercept(
            Operation::UpdateExecution,
            params,
            || async {
                self.store
                    .update_execution(execution)
                    .await
                    .map_err(EngineError::from_store)
            },
            || execution.clone(),
        )
        .await
    }

    /// Run a node. Synthesized answer: a 200 echo for service tasks, nothing
    /// for every other kind.
    pub async fn execute_node(
        &self,
        instance_id: Uuid,
        node: &Node,
        node_params: &Variables,
    ) -> Result<Option<BusinessResponse>, EngineError> {
        let params = vec![
            ("instance_id", json!(instance_id)),
            ("node_id", json!(node.id)),
            ("params", json!(node_params)),
        ];
        self.intercept(
            Operation::ExecuteNode,
            params,
            || self.executor.execute(node, node_params),
            || {
                (node.kind == NodeKind::ServiceTask).then(|| BusinessResponse {
                    status: 200,
                    body: json!({
                        "mocked": true,
                        "nodeId": node.id,
                        "params": node_params,
                    }),
                    headers: BTreeMap::new(),
                })
            },
        )
        .await
    }

    // ── Policy gate ──

    async fn intercept<T, F, Fut, S>(
        &self,
        op: Operation,
        params: Vec<(&'static str, Value)>,
        real: F,
        synthesize: S,
    ) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
        S: FnOnce() -> T,
    {
        let key = call_key(op, &params);
        let mode = self.policy.mode_for(&key);
        tracing::debug!(operation = %op, key = %key, mode = %mode, "intercepting");

        let outcome = match mode {
            InterceptMode::Disabled | InterceptMode::Record => {
                real().await.map(|result| (result, false))
            }
            InterceptMode::Enabled => match self.recordings.get(&key) {
                Some(recorded) => serde_json::from_value(recorded)
                    .map(|replayed| (replayed, true))
                    .map_err(|e| EngineError::InvalidRequest {
                        message: format!("recorded result for '{key}' does not fit {op}: {e}"),
                    }),
                None => Ok((synthesize(), true)),
            },
        };
        let params = Value::Object(
            params
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        );

        match outcome {
            Ok((result, mocked)) => {
                let result_json = serde_json::to_value(&result).unwrap_or(Value::Null);
                if mode == InterceptMode::Record {
                    self.recordings.insert(key.clone(), result_json.clone());
                }
                self.report(key, op, mode, params, result_json, mocked);
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(operation = %op, key = %key, code = err.code(), "intercepted call failed");
                let result_json = json!({ "error": ErrorBody::from(&err) });
                self.report(key, op, mode, params, result_json, mode == InterceptMode::Enabled);
                Err(err)
            }
        }
    }

    /// Hand one finished call to the recorder and, unless disabled, the log.
    fn report(
        &self,
        key: String,
        operation: Operation,
        mode: InterceptMode,
        params: Value,
        result: Value,
        mocked: bool,
    ) {
        let call = InterceptedCall {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            key,
            operation,
            mode,
            params,
            result,
            mocked,
            at: Utc::now(),
        };
        if let Some(recorder) = &self.recorder {
            recorder.record(&call);
        }
        if mode != InterceptMode::Disabled {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }
    }
}
