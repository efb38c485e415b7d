//! BPMN 2.0 XML → [`ProcessDefinition`].
//!
//! Streams `quick-xml` events and matches elements on their local name, so
//! `bpmn:task`, `bpmn2:task` and a bare `task` are the same element. Only the
//! first `process` is read; unknown element kinds are skipped with their whole
//! subtree.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use crate::definition::ProcessDefinition;
use crate::error::ParseError;
use crate::types::{Node, NodeKind, SequenceFlow};
use crate::validate::validate_definition;

/// Extension element local names that may carry a service task's endpoint.
/// Compared case-insensitively.
const URL_TAGS: &[&str] = &["businessurl", "business_url", "url", "endpoint"];

/// Parse BPMN XML into a validated process definition.
pub fn parse_bpmn(xml: &str) -> Result<ProcessDefinition, ParseError> {
    if xml.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut collector = ProcessCollector::default();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(reader.buffer_position() as u64, e))?;
        match event {
            Event::Start(e) => collector.open(&e)?,
            Event::Empty(e) => {
                collector.open(&e)?;
                collector.close()?;
            }
            Event::End(_) => collector.close()?,
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(reader.buffer_position() as u64, e))?;
                collector.text(&text);
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                collector.text(&String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
        if collector.done {
            break;
        }
    }

    let (process_id, nodes, flows) = collector.finish()?;
    let definition = ProcessDefinition::build(process_id, nodes, flows);
    validate_definition(&definition)?;

    tracing::debug!(
        process_id = %definition.process_id(),
        nodes = definition.nodes().len(),
        flows = definition.flows().len(),
        "parsed BPMN process"
    );
    Ok(definition)
}

fn malformed(position: u64, err: impl std::fmt::Display) -> ParseError {
    ParseError::MalformedXml {
        position,
        message: err.to_string(),
    }
}

// ─── Collector ────────────────────────────────────────────────

/// What the text inside the currently open child element is captured into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Incoming,
    Outgoing,
    Condition,
    BusinessUrl,
}

/// A direct child of `process` being assembled.
#[derive(Debug, Default)]
struct ElementBuilder {
    element: String,
    /// `None` for a sequence flow.
    kind: Option<NodeKind>,
    id: String,
    name: String,
    attached_to: Option<String>,
    source: String,
    target: String,
    condition: Option<String>,
    ext_url: Option<String>,
    prop_url: Option<String>,
    attr_url: Option<String>,
    can_fallback: bool,
    incoming: Vec<String>,
    outgoing: Vec<String>,
}

#[derive(Debug, Default)]
struct ProcessCollector {
    depth: usize,
    process_depth: Option<usize>,
    process_id: String,
    done: bool,
    current: Option<ElementBuilder>,
    capture: Option<(Capture, usize)>,
    text: String,
    nodes: Vec<Node>,
    flows: Vec<SequenceFlow>,
}

impl ProcessCollector {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), ParseError> {
        self.depth += 1;
        let name = local_name(e.local_name().as_ref());

        let Some(process_depth) = self.process_depth else {
            if name == "process" {
                let attrs = attributes(e)?;
                self.process_id = attrs
                    .get("id")
                    .filter(|id| !id.is_empty())
                    .cloned()
                    .ok_or_else(|| ParseError::MissingElementId {
                        element: "process".into(),
                    })?;
                self.process_depth = Some(self.depth);
            }
            return Ok(());
        };

        if self.depth == process_depth + 1 {
            self.current = self.start_element(&name, e)?;
            return Ok(());
        }

        let depth = self.depth;
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };

        match name.as_str() {
            "incoming" if depth == process_depth + 2 => {
                self.capture = Some((Capture::Incoming, depth));
            }
            "outgoing" if depth == process_depth + 2 => {
                self.capture = Some((Capture::Outgoing, depth));
            }
            "conditionExpression" => {
                self.capture = Some((Capture::Condition, depth));
            }
            "property" => {
                let attrs = attributes(e)?;
                let prop = attrs.get("name").map(|n| n.to_ascii_lowercase());
                let value = attrs.get("value").cloned().unwrap_or_default();
                match prop.as_deref() {
                    Some(p) if URL_TAGS.contains(&p) && current.prop_url.is_none() => {
                        current.prop_url = non_empty(value);
                    }
                    Some("canfallback") => current.can_fallback = is_true(&value),
                    _ => {}
                }
            }
            tag if URL_TAGS.contains(&tag.to_ascii_lowercase().as_str())
                && current.kind == Some(NodeKind::ServiceTask)
                && current.ext_url.is_none() =>
            {
                let attrs = attributes(e)?;
                let inline = attrs.get("value").or_else(|| attrs.get("url")).cloned();
                match inline.and_then(non_empty) {
                    Some(url) => current.ext_url = Some(url),
                    None => self.capture = Some((Capture::BusinessUrl, depth)),
                }
            }
            _ => {}
        }
        if self.capture.is_some_and(|(_, d)| d == depth) {
            self.text.clear();
        }
        Ok(())
    }

    fn start_element(
        &self,
        name: &str,
        e: &BytesStart<'_>,
    ) -> Result<Option<ElementBuilder>, ParseError> {
        let kind = match NodeKind::from_element_name(name) {
            Some(kind) => Some(kind),
            None if name == "sequenceFlow" => None,
            None => return Ok(None),
        };

        let attrs = attributes(e)?;
        let id = attrs
            .get("id")
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| ParseError::MissingElementId {
                element: name.to_string(),
            })?;

        Ok(Some(ElementBuilder {
            element: name.to_string(),
            kind,
            id,
            name: attrs.get("name").cloned().unwrap_or_default(),
            attached_to: attrs.get("attachedToRef").cloned().and_then(non_empty),
            source: attrs.get("sourceRef").cloned().unwrap_or_default(),
            target: attrs.get("targetRef").cloned().unwrap_or_default(),
            condition: attrs.get("condition").cloned().and_then(non_empty),
            attr_url: attrs
                .get("businessUrl")
                .or_else(|| attrs.get("url"))
                .cloned()
                .and_then(non_empty),
            can_fallback: attrs.get("canFallback").is_some_and(|v| is_true(v)),
            ..Default::default()
        }))
    }

    fn text(&mut self, text: &str) {
        if self.capture.is_some() {
            self.text.push_str(text);
        }
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        if let Some((capture, capture_depth)) = self.capture {
            if capture_depth == depth {
                self.capture = None;
                let text = std::mem::take(&mut self.text).trim().to_string();
                if let Some(current) = self.current.as_mut() {
                    match capture {
                        Capture::Incoming => current.incoming.extend(non_empty(text)),
                        Capture::Outgoing => current.outgoing.extend(non_empty(text)),
                        Capture::Condition => current.condition = non_empty(text),
                        Capture::BusinessUrl => {
                            if current.ext_url.is_none() {
                                current.ext_url = non_empty(text);
                            }
                        }
                    }
                }
                return Ok(());
            }
        }

        let Some(process_depth) = self.process_depth else {
            return Ok(());
        };
        if depth == process_depth + 1 {
            if let Some(builder) = self.current.take() {
                self.push(builder)?;
            }
        } else if depth == process_depth {
            self.done = true;
        }
        Ok(())
    }

    fn push(&mut self, b: ElementBuilder) -> Result<(), ParseError> {
        match b.kind {
            None => self.flows.push(SequenceFlow {
                id: b.id,
                name: b.name,
                source: b.source,
                target: b.target,
                condition: b.condition,
            }),
            Some(kind) => {
                if kind == NodeKind::BoundaryEvent && b.attached_to.is_none() {
                    return Err(ParseError::BoundaryEventMissingAttachment { node_id: b.id });
                }
                tracing::trace!(element = %b.element, id = %b.id, "collected node");
                self.nodes.push(Node {
                    id: b.id,
                    name: b.name,
                    kind,
                    incoming: b.incoming,
                    outgoing: b.outgoing,
                    business_url: if kind == NodeKind::ServiceTask {
                        b.ext_url.or(b.prop_url).or(b.attr_url)
                    } else {
                        None
                    },
                    attached_to: if kind == NodeKind::BoundaryEvent {
                        b.attached_to
                    } else {
                        None
                    },
                    can_fallback: b.can_fallback,
                });
            }
        }
        Ok(())
    }

    /// Close out the collected process, completing each node's flow lists
    /// with flows it did not declare itself.
    fn finish(mut self) -> Result<(String, Vec<Node>, Vec<SequenceFlow>), ParseError> {
        if self.process_depth.is_none() {
            return Err(ParseError::MissingProcessElement);
        }

        let index: HashMap<String, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(ix, n)| (n.id.clone(), ix))
            .collect();
        for flow in &self.flows {
            if let Some(&ix) = index.get(&flow.source) {
                let outgoing = &mut self.nodes[ix].outgoing;
                if !outgoing.contains(&flow.id) {
                    outgoing.push(flow.id.clone());
                }
            }
            if let Some(&ix) = index.get(&flow.target) {
                let incoming = &mut self.nodes[ix].incoming;
                if !incoming.contains(&flow.id) {
                    incoming.push(flow.id.clone());
                }
            }
        }

        Ok((self.process_id, self.nodes, self.flows))
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Attributes keyed by local name, values unescaped.
fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, ParseError> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(0, err))?;
        let key = local_name(attr.key.local_name().as_ref());
        let value = attr.unescape_value().map_err(|err| malformed(0, err))?;
        out.insert(key, value.into_owned());
    }
    Ok(out)
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
