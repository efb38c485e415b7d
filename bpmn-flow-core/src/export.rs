//! Process definition → BPMN 2.0 XML.
//!
//! The output re-parses to the same nodes, flows and adjacency. Diagram
//! interchange (`bpmndi`) is not emitted.

use anyhow::{bail, Result};
use std::fmt::Write;

use crate::definition::ProcessDefinition;
use crate::types::{Node, NodeKind};

const BPMN_NS: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";
const FLOW_NS: &str = "http://bpmn-flow.dev/schema/1.0";

/// An XML NCName that does not clash with the `flow` or reserved `xml` prefixes.
pub fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return false;
    }
    prefix != "flow" && !prefix.to_ascii_lowercase().starts_with("xml")
}

/// Serialize a definition.
///
/// `prefix` selects the BPMN namespace prefix: `Some("bpmn")` writes
/// `<bpmn:task>`, `None` writes unprefixed elements under a default namespace.
pub fn definition_to_bpmn_xml(def: &ProcessDefinition, prefix: Option<&str>) -> Result<String> {
    if let Some(p) = prefix.filter(|p| !is_valid_prefix(p)) {
        bail!("'{p}' is not a usable XML namespace prefix");
    }
    let p = prefix.map(|p| format!("{p}:")).unwrap_or_default();
    let ns_decl = match prefix {
        Some(p) => format!(r#"xmlns:{p}="{BPMN_NS}""#),
        None => format!(r#"xmlns="{BPMN_NS}""#),
    };

    let mut xml = String::new();
    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        xml,
        r#"<{p}definitions {ns_decl} xmlns:flow="{FLOW_NS}" id="Definitions_{}">"#,
        xml_escape(def.process_id())
    )?;
    writeln!(
        xml,
        r#"  <{p}process id="{}" isExecutable="true">"#,
        xml_escape(def.process_id())
    )?;

    for node in def.nodes() {
        write_node(&mut xml, &p, node)?;
    }

    for flow in def.flows() {
        let name_attr = name_attr(&flow.name);
        match &flow.condition {
            Some(cond) => {
                writeln!(
                    xml,
                    r#"    <{p}sequenceFlow id="{}"{} sourceRef="{}" targetRef="{}">"#,
                    xml_escape(&flow.id),
                    name_attr,
                    xml_escape(&flow.source),
                    xml_escape(&flow.target)
                )?;
                writeln!(
                    xml,
                    r#"      <{p}conditionExpression>{}</{p}conditionExpression>"#,
                    xml_escape(cond)
                )?;
                writeln!(xml, r#"    </{p}sequenceFlow>"#)?;
            }
            None => {
                writeln!(
                    xml,
                    r#"    <{p}sequenceFlow id="{}"{} sourceRef="{}" targetRef="{}" />"#,
                    xml_escape(&flow.id),
                    name_attr,
                    xml_escape(&flow.source),
                    xml_escape(&flow.target)
                )?;
            }
        }
    }

    writeln!(xml, r#"  </{p}process>"#)?;
    writeln!(xml, r#"</{p}definitions>"#)?;
    Ok(xml)
}

fn write_node(xml: &mut String, p: &str, node: &Node) -> Result<()> {
    let tag = node.kind.element_name();
    let mut attrs = format!(r#" id="{}"{}"#, xml_escape(&node.id), name_attr(&node.name));
    if let Some(attached) = &node.attached_to {
        write!(attrs, r#" attachedToRef="{}""#, xml_escape(attached))?;
    }
    if node.can_fallback {
        attrs.push_str(r#" flow:canFallback="true""#);
    }

    let url = node
        .business_url
        .as_deref()
        .filter(|_| node.kind == NodeKind::ServiceTask);
    if node.incoming.is_empty() && node.outgoing.is_empty() && url.is_none() {
        writeln!(xml, r#"    <{p}{tag}{attrs} />"#)?;
        return Ok(());
    }

    writeln!(xml, r#"    <{p}{tag}{attrs}>"#)?;
    if let Some(url) = url {
        writeln!(xml, r#"      <{p}extensionElements>"#)?;
        writeln!(xml, r#"        <flow:businessUrl>{}</flow:businessUrl>"#, xml_escape(url))?;
        writeln!(xml, r#"      </{p}extensionElements>"#)?;
    }
    for id in &node.incoming {
        writeln!(xml, r#"      <{p}incoming>{}</{p}incoming>"#, xml_escape(id))?;
    }
    for id in &node.outgoing {
        writeln!(xml, r#"      <{p}outgoing>{}</{p}outgoing>"#, xml_escape(id))?;
    }
    writeln!(xml, r#"    </{p}{tag}>"#)?;
    Ok(())
}

fn name_attr(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!(r#" name="{}""#, xml_escape(name))
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
