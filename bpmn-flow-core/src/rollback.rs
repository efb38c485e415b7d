//! Decide what a "resume from node X" request does to the current node set.
//!
//! Boundary events and event-based gateways model states that are still in
//! flight, so targeting them is not backward navigation. Everything else is
//! either already current (stay), ahead of the instance (rejected as a skip) or
//! behind it (rollback, if the node allows it).

use crate::definition::ProcessDefinition;
use crate::error::EngineError;
use crate::types::{Node, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackDecision {
    /// Keep the current node set as it is.
    Stay,
    /// Replace the current node set.
    Rollback { current_node_ids: Vec<String> },
}

pub fn resolve_rollback(
    def: &ProcessDefinition,
    target: &Node,
    current: &[String],
) -> Result<RollbackDecision, EngineError> {
    let is_current = |id: &str| current.iter().any(|c| c == id);

    match target.kind {
        NodeKind::BoundaryEvent => {
            let attached = target
                .attached_to
                .as_deref()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| EngineError::BoundaryEventError {
                    node_id: target.id.clone(),
                    message: "boundary event has no attached node".into(),
                })?;
            if is_current(attached) {
                return Ok(RollbackDecision::Stay);
            }
            if !target.can_fallback {
                return Err(EngineError::FallbackNotAllowed {
                    node_id: target.id.clone(),
                });
            }
            Ok(RollbackDecision::Rollback {
                current_node_ids: vec![attached.to_string()],
            })
        }
        NodeKind::IntermediateCatchEvent => {
            let gateway_in_flight = def.predecessors(&target.id).into_iter().any(|pred| {
                is_current(pred)
                    && def
                        .node(pred)
                        .is_some_and(|n| n.kind == NodeKind::EventBasedGateway)
            });
            if gateway_in_flight {
                return Ok(RollbackDecision::Stay);
            }
            resolve_default(def, target, current)
        }
        _ => resolve_default(def, target, current),
    }
}

fn resolve_default(
    def: &ProcessDefinition,
    target: &Node,
    current: &[String],
) -> Result<RollbackDecision, EngineError> {
    if current.iter().any(|c| c == &target.id) {
        return Ok(RollbackDecision::Stay);
    }
    if def.is_downstream_of(&target.id, current) {
        tracing::warn!(
            node_id = %target.id,
            current = ?current,
            "rejecting request that skips ahead of the current nodes"
        );
        return Err(EngineError::SkippedStep {
            node_id: target.id.clone(),
            current_node_ids: current.to_vec(),
        });
    }
    if !target.can_fallback {
        return Err(EngineError::FallbackNotAllowed {
            node_id: target.id.clone(),
        });
    }
    Ok(RollbackDecision::Rollback {
        current_node_ids: vec![target.id.clone()],
    })
}
