use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-form variable bag carried by instances and executions.
pub type Variables = BTreeMap<String, serde_json::Value>;

// ─── Nodes ────────────────────────────────────────────────────

/// The closed set of BPMN element kinds the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Task,
    ServiceTask,
    UserTask,
    ExclusiveGateway,
    ParallelGateway,
    EventBasedGateway,
    StartEvent,
    EndEvent,
    IntermediateCatchEvent,
    BoundaryEvent,
}

impl NodeKind {
    /// Map a BPMN element local name (`serviceTask`, `endEvent`, ...) to a kind.
    pub fn from_element_name(local_name: &str) -> Option<Self> {
        let kind = match local_name {
            "task" => NodeKind::Task,
            "serviceTask" => NodeKind::ServiceTask,
            "userTask" => NodeKind::UserTask,
            "exclusiveGateway" => NodeKind::ExclusiveGateway,
            "parallelGateway" => NodeKind::ParallelGateway,
            "eventBasedGateway" => NodeKind::EventBasedGateway,
            "startEvent" => NodeKind::StartEvent,
            "endEvent" => NodeKind::EndEvent,
            "intermediateCatchEvent" => NodeKind::IntermediateCatchEvent,
            "boundaryEvent" => NodeKind::BoundaryEvent,
            _ => return None,
        };
        Some(kind)
    }

    /// The BPMN element local name for this kind.
    pub fn element_name(&self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::ServiceTask => "serviceTask",
            NodeKind::UserTask => "userTask",
            NodeKind::ExclusiveGateway => "exclusiveGateway",
            NodeKind::ParallelGateway => "parallelGateway",
            NodeKind::EventBasedGateway => "eventBasedGateway",
            NodeKind::StartEvent => "startEvent",
            NodeKind::EndEvent => "endEvent",
            NodeKind::IntermediateCatchEvent => "intermediateCatchEvent",
            NodeKind::BoundaryEvent => "boundaryEvent",
        }
    }

    /// Whether the engine keeps walking after executing a node of this kind.
    ///
    /// User tasks, catch events and event-based gateways are wait states: the
    /// instance parks there until a later request resumes it.
    pub fn auto_advances(&self) -> bool {
        !matches!(
            self,
            NodeKind::UserTask | NodeKind::IntermediateCatchEvent | NodeKind::EventBasedGateway
        )
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.element_name())
    }
}

/// One BPMN element of a parsed process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Incoming sequence-flow ids, declared order first.
    pub incoming: Vec<String>,
    /// Outgoing sequence-flow ids, declared order first.
    pub outgoing: Vec<String>,
    /// Business endpoint called by a service task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_url: Option<String>,
    /// Node a boundary event is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
    #[serde(default)]
    pub can_fallback: bool,
}

/// Directed edge between two node ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceFlow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub source: String,
    pub target: String,
    /// `None` = unconditional / default flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// ─── Stored workflow ──────────────────────────────────────────

/// A workflow as persisted: the BPMN text is the source of truth, the graph is
/// recomputed on every execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: String,
    pub name: String,
    pub bpmn_xml: String,
}

// ─── Instance ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Suspended,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Running => "running",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running (or finished) process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub workflow_id: String,
    #[serde(default)]
    pub status: InstanceStatus,
    /// Nodes the instance currently sits at. More than one after a parallel split.
    #[serde(default)]
    pub current_node_ids: Vec<String>,
    /// Incremented on every persisted update.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// A fresh pending instance with no current nodes yet.
    pub fn new(workflow_id: impl Into<String>, variables: Variables) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: InstanceStatus::Pending,
            current_node_ids: Vec::new(),
            version: 0,
            variables,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_current(&self, node_id: &str) -> bool {
        self.current_node_ids.iter().any(|id| id == node_id)
    }
}

/// A requested instance write. `expected_version` lets the store detect
/// concurrent writers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceUpdate {
    pub instance_id: Uuid,
    pub status: InstanceStatus,
    pub current_node_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

// ─── Execution ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

/// Record of one `execute_from_node` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub instance_id: Uuid,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WorkflowExecution {
    pub fn pending(instance_id: Uuid, variables: Variables) -> Self {
        Self {
            id: Uuid::now_v7(),
            instance_id,
            status: ExecutionStatus::Pending,
            variables,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn start(mut self) -> Self {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self
    }

    pub fn finish(&mut self, status: ExecutionStatus, error_message: Option<String>) {
        self.status = status;
        self.error_message = error_message;
        self.completed_at = Some(Utc::now());
    }
}

// ─── Request / response ───────────────────────────────────────

/// Parameters of one `execute_from_node` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// Empty = resume wherever the instance currently is.
    #[serde(default)]
    pub from_node_id: String,
    #[serde(default)]
    pub business_params: Variables,
}

impl ExecuteRequest {
    pub fn from_node(node_id: impl Into<String>) -> Self {
        Self {
            from_node_id: node_id.into(),
            business_params: Variables::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.business_params.insert(key.into(), value);
        self
    }
}

/// Raw answer of a service task's business endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessResponse {
    pub status: u16,
    pub body: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Engine-visible state after an execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub instance_id: Uuid,
    pub current_node_ids: Vec<String>,
    /// Nodes this call parked at.
    pub next_node_ids: Vec<String>,
    pub status: InstanceStatus,
    pub execution_id: Uuid,
    pub variables: Variables,
}

/// Everything an `execute_from_node` call hands back to its caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub business_response: Option<BusinessResponse>,
    pub engine_response: EngineResponse,
    pub request_params: ExecuteRequest,
    #[serde(default)]
    pub intercepted_calls: Vec<crate::intercept::InterceptedCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_names_round_trip() {
        let kinds = [
            NodeKind::Task,
            NodeKind::ServiceTask,
            NodeKind::UserTask,
            NodeKind::ExclusiveGateway,
            NodeKind::ParallelGateway,
            NodeKind::EventBasedGateway,
            NodeKind::StartEvent,
            NodeKind::EndEvent,
            NodeKind::IntermediateCatchEvent,
            NodeKind::BoundaryEvent,
        ];
        for kind in kinds {
            assert_eq!(NodeKind::from_element_name(kind.element_name()), Some(kind));
        }
        assert_eq!(NodeKind::from_element_name("subProcess"), None);
    }

    #[test]
    fn test_wait_states_do_not_auto_advance() {
        assert!(!NodeKind::UserTask.auto_advances());
        assert!(!NodeKind::IntermediateCatchEvent.auto_advances());
        assert!(!NodeKind::EventBasedGateway.auto_advances());
        assert!(NodeKind::ServiceTask.auto_advances());
        assert!(NodeKind::ExclusiveGateway.auto_advances());
        assert!(NodeKind::BoundaryEvent.auto_advances());
    }

    #[test]
    fn test_instance_wire_shape_is_camel_case() {
        let instance = WorkflowInstance::new("wf", Variables::new());
        let json = serde_json::to_value(&instance).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("currentNodeIds").is_some());
        assert!(json.get("workflowId").is_some());
    }
}
