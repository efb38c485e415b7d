//! In-memory process graph.
//!
//! Nodes and flows live in arenas indexed by their BPMN id. Forward and
//! reverse adjacency lists hold arena indices in flow declaration order; a
//! `petgraph` digraph mirrors the same indices for reachability queries.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, VisitMap};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use crate::types::{Node, NodeKind, SequenceFlow};

#[derive(Debug, Clone)]
pub struct ProcessDefinition {
    process_id: String,
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    flows: Vec<SequenceFlow>,
    flow_index: HashMap<String, usize>,
    start_ids: Vec<String>,
    forward: Vec<Vec<usize>>,
    reverse: Vec<Vec<usize>>,
    graph: DiGraph<(), ()>,
}

impl ProcessDefinition {
    /// Assemble the arenas and adjacency lists.
    ///
    /// Flows whose source or target is not a known node stay in the flow map
    /// but are left out of the graph. Structural validation is not run here;
    /// see [`crate::validate::validate_definition`].
    pub fn build(
        process_id: impl Into<String>,
        nodes: Vec<Node>,
        flows: Vec<SequenceFlow>,
    ) -> Self {
        let node_index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(ix, n)| (n.id.clone(), ix))
            .collect();
        let flow_index: HashMap<String, usize> = flows
            .iter()
            .enumerate()
            .map(|(ix, f)| (f.id.clone(), ix))
            .collect();

        let mut graph = DiGraph::with_capacity(nodes.len(), flows.len());
        for _ in &nodes {
            graph.add_node(());
        }

        let mut forward = vec![Vec::new(); nodes.len()];
        let mut reverse = vec![Vec::new(); nodes.len()];
        for flow in &flows {
            match (node_index.get(&flow.source), node_index.get(&flow.target)) {
                (Some(&src), Some(&dst)) => {
                    forward[src].push(dst);
                    reverse[dst].push(src);
                    graph.add_edge(NodeIndex::new(src), NodeIndex::new(dst), ());
                }
                _ => {
                    tracing::warn!(
                        flow_id = %flow.id,
                        source = %flow.source,
                        target = %flow.target,
                        "dropping sequence flow with unresolved endpoint"
                    );
                }
            }
        }

        let start_ids = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::StartEvent)
            .map(|n| n.id.clone())
            .collect();

        Self {
            process_id: process_id.into(),
            nodes,
            node_index,
            flows,
            flow_index,
            start_ids,
            forward,
            reverse,
            graph,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn flows(&self) -> &[SequenceFlow] {
        &self.flows
    }

    pub fn start_ids(&self) -> &[String] {
        &self.start_ids
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&ix| &self.nodes[ix])
    }

    pub fn flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.flow_index.get(id).map(|&ix| &self.flows[ix])
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Direct successors of a node, flow declaration order.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.forward)
    }

    /// Direct predecessors of a node, flow declaration order.
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.reverse)
    }

    fn neighbours<'a>(&'a self, id: &str, lists: &'a [Vec<usize>]) -> Vec<&'a str> {
        self.node_index
            .get(id)
            .map(|&ix| lists[ix].iter().map(|&n| self.nodes[n].id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Outgoing flows that leave `id` and land on a known node, in the order
    /// the node declares them.
    pub fn outgoing_flows(&self, id: &str) -> Vec<&SequenceFlow> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        node.outgoing
            .iter()
            .filter_map(|flow_id| self.flow(flow_id))
            .filter(|f| f.source == id && self.contains_node(&f.target))
            .collect()
    }

    /// True when `target` can be reached by following at least one flow from
    /// any of `from`. The search is seeded with the successors of `from`, so a
    /// node in `from` only counts when a cycle leads back to it.
    pub fn is_downstream_of(&self, target: &str, from: &[String]) -> bool {
        let Some(&target_ix) = self.node_index.get(target) else {
            return false;
        };
        let seeds: Vec<NodeIndex> = from
            .iter()
            .filter_map(|id| self.node_index.get(id))
            .flat_map(|&ix| self.forward[ix].iter().map(|&n| NodeIndex::new(n)))
            .collect();
        let Some((&first, rest)) = seeds.split_first() else {
            return false;
        };

        let mut bfs = Bfs::new(&self.graph, first);
        for &ix in rest {
            if bfs.discovered.visit(ix) {
                bfs.stack.push_back(ix);
            }
        }
        while let Some(ix) = bfs.next(&self.graph) {
            if ix.index() == target_ix {
                return true;
            }
        }
        false
    }

    /// Forward adjacency keyed by node id.
    pub fn adjacency(&self) -> BTreeMap<String, Vec<String>> {
        self.id_lists(&self.forward)
    }

    /// Reverse adjacency keyed by node id.
    pub fn reverse_adjacency(&self) -> BTreeMap<String, Vec<String>> {
        self.id_lists(&self.reverse)
    }

    fn id_lists(&self, lists: &[Vec<usize>]) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .zip(lists)
            .filter(|(_, targets)| !targets.is_empty())
            .map(|(node, targets)| {
                (
                    node.id.clone(),
                    targets.iter().map(|&t| self.nodes[t].id.clone()).collect(),
                )
            })
            .collect()
    }

    /// SHA-256 over the canonical structure: nodes, flows and adjacency, each
    /// sorted by id. Equal fingerprints mean structurally identical graphs,
    /// whatever the node order or namespace spelling of the source XML.
    pub fn fingerprint(&self) -> String {
        let mut nodes: Vec<&Node> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut flows: Vec<&SequenceFlow> = self.flows.iter().collect();
        flows.sort_by(|a, b| a.id.cmp(&b.id));

        let canonical = serde_json::json!({
            "processId": self.process_id,
            "nodes": nodes,
            "flows": flows,
            "adjacency": self.adjacency(),
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        hex::encode(digest)
    }
}
