//! Execution engine: advance an instance from a requested node.
//!
//! One call runs start to finish on the caller's task:
//!
//! 1. seed a fresh instance with the process start events;
//! 2. resolve the requested node and let [`resolve_rollback`] decide whether
//!    the current node set is replaced;
//! 3. open an execution record;
//! 4. walk the graph from the requested node until every branch parks at a
//!    wait state, runs out of flows or reaches an end event;
//! 5. persist the execution and the instance.
//!
//! Every write and every node execution goes through the [`Interceptor`].
//! A failure after step 3 marks the execution failed and leaves the instance
//! untouched.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::definition::ProcessDefinition;
use crate::error::EngineError;
use crate::expr::eval_condition;
use crate::intercept::Interceptor;
use crate::rollback::{resolve_rollback, RollbackDecision};
use crate::types::*;

pub struct ExecutionEngine {
    interceptor: Arc<Interceptor>,
    config: EngineConfig,
}

/// What one walk over the graph produced.
#[derive(Debug, Default)]
struct Walk {
    parked: Vec<String>,
    reached_end: bool,
    entry_parked: bool,
    business_response: Option<BusinessResponse>,
}

impl Walk {
    fn park(&mut self, node_id: &str) {
        if !self.parked.iter().any(|p| p == node_id) {
            self.parked.push(node_id.to_string());
        }
    }
}

impl ExecutionEngine {
    pub fn new(interceptor: Arc<Interceptor>, config: EngineConfig) -> Self {
        Self {
            interceptor,
            config,
        }
    }

    pub async fn execute_from_node(
        &self,
        def: &ProcessDefinition,
        instance: WorkflowInstance,
        request: ExecuteRequest,
    ) -> Result<ExecutionOutcome, EngineError> {
        if instance.status == InstanceStatus::Completed {
            return Err(EngineError::InstanceNotActive {
                instance_id: instance.id,
                status: instance.status,
            });
        }

        let instance = self.seed_if_fresh(def, instance).await?;

        let explicit = !request.from_node_id.is_empty();
        let target_id = if explicit {
            request.from_node_id.as_str()
        } else {
            instance
                .current_node_ids
                .first()
                .map(String::as_str)
                .unwrap_or_default()
        };
        let target = def.node(target_id).ok_or_else(|| EngineError::NodeNotFound {
            node_id: target_id.to_string(),
        })?;

        let current = match resolve_rollback(def, target, &instance.current_node_ids)? {
            RollbackDecision::Stay => instance.current_node_ids.clone(),
            RollbackDecision::Rollback { current_node_ids } => {
                tracing::info!(
                    instance_id = %instance.id,
                    node_id = %target.id,
                    from = ?instance.current_node_ids,
                    to = ?current_node_ids,
                    "rolling back current nodes"
                );
                current_node_ids
            }
        };

        let mut variables = instance.variables.clone();
        variables.extend(request.business_params.clone());

        let execution = WorkflowExecution::pending(instance.id, variables.clone()).start();
        let mut execution = self.interceptor.create_execution(&execution).await?;
        tracing::info!(
            instance_id = %instance.id,
            execution_id = %execution.id,
            node_id = %target.id,
            "execution started"
        );

        let result = self
            .run(def, &instance, target, explicit, &current, &request, &variables, &mut execution)
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(
                    instance_id = %instance.id,
                    execution_id = %execution.id,
                    code = err.code(),
                    error = %err,
                    "execution failed"
                );
                execution.finish(ExecutionStatus::Failed, Some(err.to_string()));
                if let Err(update_err) = self.interceptor.update_execution(&execution).await {
                    tracing::error!(
                        execution_id = %execution.id,
                        error = %update_err,
                        "could not mark execution failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// First execution of a fresh instance: current nodes become the start
    /// events, persisted before anything else happens.
    async fn seed_if_fresh(
        &self,
        def: &ProcessDefinition,
        instance: WorkflowInstance,
    ) -> Result<WorkflowInstance, EngineError> {
        if !instance.current_node_ids.is_empty() {
            return Ok(instance);
        }
        if def.start_ids().is_empty() {
            return Err(EngineError::InvalidRequest {
                message: format!("process '{}' has no start event", def.process_id()),
            });
        }
        let update = InstanceUpdate {
            instance_id: instance.id,
            status: advance_status(instance.status),
            current_node_ids: def.start_ids().to_vec(),
            expected_version: Some(instance.version),
        };
        tracing::debug!(instance_id = %instance.id, start = ?update.current_node_ids, "seeding instance");
        self.interceptor.update_instance(&instance, update).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        def: &ProcessDefinition,
        instance: &WorkflowInstance,
        target: &Node,
        explicit: bool,
        current: &[String],
        request: &ExecuteRequest,
        variables: &Variables,
        execution: &mut WorkflowExecution,
    ) -> Result<ExecutionOutcome, EngineError> {
        let walk = self
            .walk(def, instance, target, explicit, &request.business_params, variables)
            .await?;

        let final_nodes = final_current_nodes(def, target, current, &walk.parked);
        let status = if walk.reached_end && final_nodes.is_empty() {
            InstanceStatus::Completed
        } else {
            advance_status(instance.status)
        };

        let execution_status = if walk.entry_parked {
            ExecutionStatus::Skipped
        } else {
            ExecutionStatus::Completed
        };
        execution.finish(execution_status, None);
        *execution = self.interceptor.update_execution(execution).await?;

        let update = InstanceUpdate {
            instance_id: instance.id,
            status,
            current_node_ids: final_nodes,
            expected_version: Some(instance.version),
        };
        let updated = self.interceptor.update_instance(instance, update).await?;

        tracing::info!(
            instance_id = %updated.id,
            execution_id = %execution.id,
            status = %updated.status,
            current = ?updated.current_node_ids,
            "execution finished"
        );

        Ok(ExecutionOutcome {
            business_response: walk.business_response,
            engine_response: EngineResponse {
                instance_id: updated.id,
                current_node_ids: updated.current_node_ids,
                next_node_ids: walk.parked,
                status: updated.status,
                execution_id: execution.id,
                variables: variables.clone(),
            },
            request_params: request.clone(),
            intercepted_calls: self.interceptor.execution_log(),
        })
    }

    async fn walk(
        &self,
        def: &ProcessDefinition,
        instance: &WorkflowInstance,
        entry: &Node,
        explicit: bool,
        business_params: &Variables,
        variables: &Variables,
    ) -> Result<Walk, EngineError> {
        let mut walk = Walk::default();
        let mut queue: VecDeque<&Node> = VecDeque::from([entry]);
        let mut steps = 0usize;

        while let Some(node) = queue.pop_front() {
            steps += 1;
            if steps > self.config.max_steps {
                return Err(EngineError::StepLimitExceeded {
                    limit: self.config.max_steps,
                });
            }
            let is_entry = steps == 1;

            let params = if is_entry && !business_params.is_empty() {
                business_params
            } else {
                variables
            };
            tracing::debug!(instance_id = %instance.id, node_id = %node.id, kind = %node.kind, "executing node");
            let response = self
                .interceptor
                .execute_node(instance.id, node, params)
                .await?;
            if response.is_some() {
                walk.business_response = response;
            }

            if node.kind == NodeKind::EndEvent {
                walk.reached_end = true;
                continue;
            }

            let triggered = is_entry && explicit;
            if !node.kind.auto_advances() && !triggered {
                tracing::debug!(node_id = %node.id, "parking at wait state");
                walk.park(&node.id);
                walk.entry_parked |= is_entry;
                continue;
            }

            let next = next_nodes(def, node, variables)?;
            if next.is_empty() {
                tracing::debug!(node_id = %node.id, "no outgoing flow, parking");
                walk.park(&node.id);
                walk.entry_parked |= is_entry;
                continue;
            }
            for successor in next {
                if successor.kind == NodeKind::EndEvent {
                    tracing::debug!(node_id = %successor.id, "reached end event");
                    walk.reached_end = true;
                } else {
                    queue.push_back(successor);
                }
            }
        }

        Ok(walk)
    }
}

/// Successors taken when `node` advances.
fn next_nodes<'d>(
    def: &'d ProcessDefinition,
    node: &Node,
    variables: &Variables,
) -> Result<Vec<&'d Node>, EngineError> {
    let flows = def.outgoing_flows(&node.id);
    let targets: Vec<&str> = match node.kind {
        NodeKind::ExclusiveGateway => {
            let mut chosen = None;
            for flow in &flows {
                let matches = match flow.condition.as_deref().map(str::trim) {
                    None | Some("") => true,
                    Some(expression) => eval_condition(expression, variables).map_err(|e| {
                        EngineError::ConditionEvaluationError {
                            flow_id: flow.id.clone(),
                            expression: expression.to_string(),
                            cause: e.to_string(),
                        }
                    })?,
                };
                if matches {
                    chosen = Some(flow.target.as_str());
                    break;
                }
            }
            let target = chosen.ok_or_else(|| EngineError::NoMatchingFlow {
                gateway_id: node.id.clone(),
            })?;
            vec![target]
        }
        // No join synchronization: every branch continues on its own.
        NodeKind::ParallelGateway => flows.iter().map(|f| f.target.as_str()).collect(),
        _ => flows.first().map(|f| f.target.as_str()).into_iter().collect(),
    };
    Ok(targets.into_iter().filter_map(|id| def.node(id)).collect())
}

/// (current − entry − released wait states) ∪ parked, keeping current order.
fn final_current_nodes(
    def: &ProcessDefinition,
    entry: &Node,
    current: &[String],
    parked: &[String],
) -> Vec<String> {
    let mut released: Vec<&str> = vec![entry.id.as_str()];
    match entry.kind {
        NodeKind::BoundaryEvent => released.extend(entry.attached_to.as_deref()),
        NodeKind::IntermediateCatchEvent => released.extend(
            def.predecessors(&entry.id)
                .into_iter()
                .filter(|p| def.node(p).is_some_and(|n| n.kind == NodeKind::EventBasedGateway)),
        ),
        _ => {}
    }

    let mut result: Vec<String> = current
        .iter()
        .filter(|id| !released.contains(&id.as_str()) || parked.contains(*id))
        .cloned()
        .collect();
    for id in parked {
        if !result.contains(id) {
            result.push(id.clone());
        }
    }
    result
}

fn advance_status(status: InstanceStatus) -> InstanceStatus {
    match status {
        InstanceStatus::Pending => InstanceStatus::Running,
        other => other,
    }
}
