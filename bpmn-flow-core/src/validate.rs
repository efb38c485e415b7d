//! Structural rules checked after the graph is assembled.
//!
//! - every boundary event is attached to a node of the same process;
//! - a user task never emits a sequence flow itself;
//! - a flow a user task lists as outgoing leaves from a boundary event attached
//!   to that user task.

use crate::definition::ProcessDefinition;
use crate::error::ParseError;
use crate::types::NodeKind;

pub fn validate_definition(def: &ProcessDefinition) -> Result<(), ParseError> {
    for node in def.nodes() {
        if node.kind != NodeKind::BoundaryEvent {
            continue;
        }
        // Presence is enforced while parsing; here only resolution matters.
        let attached_to = node.attached_to.as_deref().unwrap_or_default();
        if !def.contains_node(attached_to) {
            return Err(ParseError::DanglingAttachment {
                node_id: node.id.clone(),
                attached_to: attached_to.to_string(),
            });
        }
    }

    for flow in def.flows() {
        if let Some(source) = def.node(&flow.source) {
            if source.kind == NodeKind::UserTask {
                return Err(ParseError::InvalidUserTaskFlow {
                    node_id: source.id.clone(),
                    flow_id: flow.id.clone(),
                });
            }
        }
    }

    for task in def.nodes().iter().filter(|n| n.kind == NodeKind::UserTask) {
        for flow_id in &task.outgoing {
            let from_attached_boundary = def
                .flow(flow_id)
                .and_then(|flow| def.node(&flow.source))
                .is_some_and(|source| {
                    source.kind == NodeKind::BoundaryEvent
                        && source.attached_to.as_deref() == Some(task.id.as_str())
                });
            if !from_attached_boundary {
                return Err(ParseError::MissingBoundaryEvent {
                    node_id: task.id.clone(),
                    flow_id: flow_id.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::ParseError;
    use crate::parser::parse_bpmn;

    fn process(body: &str) -> String {
        format!(r#"<definitions><process id="p">{body}</process></definitions>"#)
    }

    #[test]
    fn test_boundary_exit_from_user_task_is_valid() {
        let xml = process(
            r#"<startEvent id="s"/>
            <userTask id="review"/>
            <boundaryEvent id="timeout" attachedToRef="review"/>
            <endEvent id="e"/>
            <sequenceFlow id="f1" sourceRef="s" targetRef="review"/>
            <sequenceFlow id="f2" sourceRef="timeout" targetRef="e"/>"#,
        );
        let def = parse_bpmn(&xml).unwrap();
        for node in def.nodes() {
            if let Some(attached) = &node.attached_to {
                assert!(!attached.is_empty());
                assert!(def.contains_node(attached));
            }
        }
    }

    #[test]
    fn test_user_task_emitting_flow_is_rejected() {
        let xml = process(
            r#"<userTask id="review"/>
            <endEvent id="e"/>
            <sequenceFlow id="f_bad" sourceRef="review" targetRef="e"/>"#,
        );
        assert_eq!(
            parse_bpmn(&xml).unwrap_err(),
            ParseError::InvalidUserTaskFlow {
                node_id: "review".into(),
                flow_id: "f_bad".into(),
            }
        );
    }

    #[test]
    fn test_user_task_listing_foreign_flow_is_rejected() {
        let xml = process(
            r#"<task id="other"/>
            <userTask id="review"><outgoing>f_other</outgoing></userTask>
            <endEvent id="e"/>
            <sequenceFlow id="f_other" sourceRef="other" targetRef="e"/>"#,
        );
        assert_eq!(
            parse_bpmn(&xml).unwrap_err(),
            ParseError::MissingBoundaryEvent {
                node_id: "review".into(),
                flow_id: "f_other".into(),
            }
        );
    }

    #[test]
    fn test_user_task_may_list_its_boundary_flow() {
        let xml = process(
            r#"<userTask id="review"><outgoing>f_esc</outgoing></userTask>
            <boundaryEvent id="escalate" attachedToRef="review"/>
            <endEvent id="e"/>
            <sequenceFlow id="f_esc" sourceRef="escalate" targetRef="e"/>"#,
        );
        assert!(parse_bpmn(&xml).is_ok());
    }

    #[test]
    fn test_attachment_to_unknown_node_is_rejected() {
        let xml = process(r#"<boundaryEvent id="b" attachedToRef="ghost"/>"#);
        assert_eq!(parse_bpmn(&xml).unwrap_err().code(), "DANGLING_ATTACHMENT");
    }
}
