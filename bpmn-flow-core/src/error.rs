//! Error taxonomy for parsing and execution.
//!
//! Every error carries a stable machine code (`code()`), a coarse category
//! (`category()`) used by the HTTP layer for status mapping, and structured
//! details (`details()`). Callers branch on the code, never on message text.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::types::InstanceStatus;

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// Parse and structural-validation failures. Always fatal to that parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("BPMN document is empty")]
    EmptyDocument,

    #[error("Malformed BPMN XML at byte {position}: {message}")]
    MalformedXml { position: u64, message: String },

    #[error("BPMN document contains no process element")]
    MissingProcessElement,

    #[error("BPMN element <{element}> has no id attribute")]
    MissingElementId { element: String },

    #[error("Boundary event '{node_id}' has no attachedToRef")]
    BoundaryEventMissingAttachment { node_id: String },

    #[error("Boundary event '{node_id}' is attached to unknown node '{attached_to}'")]
    DanglingAttachment {
        node_id: String,
        attached_to: String,
    },

    #[error(
        "User task '{node_id}' emits sequence flow '{flow_id}' directly; only an attached boundary event may"
    )]
    InvalidUserTaskFlow { node_id: String, flow_id: String },

    #[error(
        "User task '{node_id}' lists outgoing flow '{flow_id}' that no boundary event attached to it emits"
    )]
    MissingBoundaryEvent { node_id: String, flow_id: String },
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyDocument => "EMPTY_DOCUMENT",
            Self::MalformedXml { .. } => "MALFORMED_XML",
            Self::MissingProcessElement => "MISSING_PROCESS_ELEMENT",
            Self::MissingElementId { .. } => "MISSING_ELEMENT_ID",
            Self::BoundaryEventMissingAttachment { .. } => "BOUNDARY_EVENT_MISSING_ATTACHMENT",
            Self::DanglingAttachment { .. } => "DANGLING_ATTACHMENT",
            Self::InvalidUserTaskFlow { .. } => "INVALID_USER_TASK_FLOW",
            Self::MissingBoundaryEvent { .. } => "MISSING_BOUNDARY_EVENT",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::EmptyDocument | Self::MissingProcessElement => json!({}),
            Self::MalformedXml { position, message } => {
                json!({ "position": position, "message": message })
            }
            Self::MissingElementId { element } => json!({ "element": element }),
            Self::BoundaryEventMissingAttachment { node_id } => json!({ "nodeId": node_id }),
            Self::DanglingAttachment {
                node_id,
                attached_to,
            } => json!({ "nodeId": node_id, "attachedTo": attached_to }),
            Self::InvalidUserTaskFlow { node_id, flow_id }
            | Self::MissingBoundaryEvent { node_id, flow_id } => {
                json!({ "nodeId": node_id, "flowId": flow_id })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Coarse grouping used for retry decisions and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Parse,
    Lookup,
    Navigation,
    Execution,
    Conflict,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Workflow '{workflow_id}' not found")]
    WorkflowNotFound { workflow_id: String },

    #[error("Workflow instance {instance_id} not found")]
    InstanceNotFound { instance_id: Uuid },

    #[error("Node '{node_id}' not found in process definition")]
    NodeNotFound { node_id: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Workflow instance {instance_id} is {status} and cannot be executed")]
    InstanceNotActive {
        instance_id: Uuid,
        status: InstanceStatus,
    },

    #[error("Boundary event '{node_id}': {message}")]
    BoundaryEventError { node_id: String, message: String },

    #[error("Node '{node_id}' does not allow falling back to it")]
    FallbackNotAllowed { node_id: String },

    #[error("Node '{node_id}' lies ahead of current nodes [{}]; steps cannot be skipped", current_node_ids.join(", "))]
    SkippedStep {
        node_id: String,
        current_node_ids: Vec<String>,
    },

    #[error("No outgoing flow of gateway '{gateway_id}' matched")]
    NoMatchingFlow { gateway_id: String },

    #[error("Condition '{expression}' on flow '{flow_id}' failed to evaluate: {cause}")]
    ConditionEvaluationError {
        flow_id: String,
        expression: String,
        cause: String,
    },

    #[error("Service task '{node_id}' failed: {message}")]
    ServiceTaskError {
        node_id: String,
        url: Option<String>,
        message: String,
    },

    #[error("Execution exceeded {limit} node steps")]
    StepLimitExceeded { limit: usize },

    #[error("Workflow instance {instance_id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        instance_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Store operation failed: {message}")]
    Store { message: String },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(e) => e.code(),
            Self::WorkflowNotFound { .. } => "WORKFLOW_NOT_FOUND",
            Self::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::InstanceNotActive { .. } => "INSTANCE_NOT_ACTIVE",
            Self::BoundaryEventError { .. } => "BOUNDARY_EVENT_ERROR",
            Self::FallbackNotAllowed { .. } => "FALLBACK_NOT_ALLOWED",
            Self::SkippedStep { .. } => "SKIPPED_STEP",
            Self::NoMatchingFlow { .. } => "NO_MATCHING_FLOW",
            Self::ConditionEvaluationError { .. } => "CONDITION_EVALUATION_ERROR",
            Self::ServiceTaskError { .. } => "SERVICE_TASK_ERROR",
            Self::StepLimitExceeded { .. } => "STEP_LIMIT_EXCEEDED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Store { .. } => "STORE_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse(_) => ErrorCategory::Parse,
            Self::WorkflowNotFound { .. } | Self::InstanceNotFound { .. } => ErrorCategory::Lookup,
            Self::NodeNotFound { .. }
            | Self::InvalidRequest { .. }
            | Self::InstanceNotActive { .. }
            | Self::BoundaryEventError { .. }
            | Self::FallbackNotAllowed { .. }
            | Self::SkippedStep { .. } => ErrorCategory::Navigation,
            Self::NoMatchingFlow { .. }
            | Self::ConditionEvaluationError { .. }
            | Self::ServiceTaskError { .. }
            | Self::StepLimitExceeded { .. } => ErrorCategory::Execution,
            Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::Store { .. } => ErrorCategory::Internal,
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Parse(e) => e.details(),
            Self::WorkflowNotFound { workflow_id } => json!({ "workflowId": workflow_id }),
            Self::InstanceNotFound { instance_id } => json!({ "instanceId": instance_id }),
            Self::NodeNotFound { node_id }
            | Self::FallbackNotAllowed { node_id } => json!({ "nodeId": node_id }),
            Self::InvalidRequest { message } => json!({ "message": message }),
            Self::InstanceNotActive {
                instance_id,
                status,
            } => json!({ "instanceId": instance_id, "status": status }),
            Self::BoundaryEventError { node_id, message } => {
                json!({ "nodeId": node_id, "message": message })
            }
            Self::SkippedStep {
                node_id,
                current_node_ids,
            } => json!({ "nodeId": node_id, "currentNodeIds": current_node_ids }),
            Self::NoMatchingFlow { gateway_id } => json!({ "gatewayId": gateway_id }),
            Self::ConditionEvaluationError {
                flow_id,
                expression,
                cause,
            } => json!({ "flowId": flow_id, "expression": expression, "cause": cause }),
            Self::ServiceTaskError {
                node_id,
                url,
                message,
            } => json!({ "nodeId": node_id, "url": url, "message": message }),
            Self::StepLimitExceeded { limit } => json!({ "limit": limit }),
            Self::VersionConflict {
                instance_id,
                expected,
                actual,
            } => json!({ "instanceId": instance_id, "expected": expected, "actual": actual }),
            Self::Store { .. } => json!({}),
        }
    }

    /// Wrap an adapter failure, surfacing typed store errors where possible.
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<crate::store::StoreError>() {
            Ok(crate::store::StoreError::VersionConflict {
                instance_id,
                expected,
                actual,
            }) => Self::VersionConflict {
                instance_id,
                expected,
                actual,
            },
            Ok(crate::store::StoreError::InstanceNotFound { instance_id }) => {
                Self::InstanceNotFound { instance_id }
            }
            Ok(other) => Self::Store {
                message: other.to_string(),
            },
            Err(err) => Self::Store {
                message: format!("{err:#}"),
            },
        }
    }
}

/// The base error shape shared by every engine error on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}
