//! In-process graph store: adjacency-list home for the Case/Rule/Entity/KnowledgeItem
//! nodes and `TRIGGERED_BY`/`OBSERVED_IN`/`RELATES_TO` relationships backing the
//! knowledge-graph visualization endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Case,
    Rule,
    Entity,
    KnowledgeItem,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Case => "case",
            NodeKind::Rule => "rule",
            NodeKind::Entity => "entity",
            NodeKind::KnowledgeItem => "knowledge_item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    TriggeredBy,
    ObservedIn,
    RelatesTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::TriggeredBy => "TRIGGERED_BY",
            EdgeKind::ObservedIn => "OBSERVED_IN",
            EdgeKind::RelatesTo => "RELATES_TO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    kind: NodeKind,
    id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from_kind: NodeKind,
    pub from_id: String,
    pub to_kind: NodeKind,
    pub to_id: String,
    pub kind: EdgeKind,
    /// Present only on `RELATES_TO` edges (the similarity score between two cases).
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub summary: GraphSummary,
}

/// Merge-semantics graph of Case/Rule/Entity/KnowledgeItem nodes and their relationships.
#[async_trait]
pub trait GraphStore: Send + Sync + std::fmt::Debug {
    async fn merge_node(&self, kind: NodeKind, id: &str, properties: HashMap<String, String>);

    async fn merge_edge(
        &self,
        from_kind: NodeKind,
        from_id: &str,
        to_kind: NodeKind,
        to_id: &str,
        kind: EdgeKind,
        score: Option<f64>,
    );

    /// Nodes and edges reachable within `depth` hops of `(kind, id)`, for the
    /// visualization read. `depth = 0` returns just the node itself (if present).
    async fn neighborhood(&self, kind: NodeKind, id: &str, depth: usize) -> GraphSnapshot;

    /// The full graph, for the summary-only visualization read.
    async fn snapshot(&self) -> GraphSnapshot;
}

/// Small adjacency-list implementation; adequate for the per-tenant graph sizes
/// this platform expects (no external graph database is required).
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    nodes: RwLock<HashMap<NodeKey, HashMap<String, String>>>,
    edges: RwLock<Vec<GraphEdge>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_snapshot(nodes: Vec<(NodeKey, HashMap<String, String>)>, edges: Vec<GraphEdge>) -> GraphSnapshot {
        let mut node_types: Vec<String> =
            nodes.iter().map(|(k, _)| k.kind.as_str().to_string()).collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        node_types.sort();

        let summary = GraphSummary { total_nodes: nodes.len(), total_edges: edges.len(), node_types };
        let nodes = nodes
            .into_iter()
            .map(|(key, properties)| GraphNode { id: key.id, kind: key.kind, properties })
            .collect();

        GraphSnapshot { nodes, edges, summary }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn merge_node(&self, kind: NodeKind, id: &str, properties: HashMap<String, String>) {
        let key = NodeKey { kind, id: id.to_string() };
        let mut nodes = self.nodes.write().unwrap();
        nodes.entry(key).or_default().extend(properties);
    }

    async fn merge_edge(
        &self,
        from_kind: NodeKind,
        from_id: &str,
        to_kind: NodeKind,
        to_id: &str,
        kind: EdgeKind,
        score: Option<f64>,
    ) {
        let mut edges = self.edges.write().unwrap();
        let existing = edges.iter_mut().find(|e| {
            e.from_kind == from_kind && e.from_id == from_id && e.to_kind == to_kind && e.to_id == to_id && e.kind == kind
        });
        match existing {
            Some(e) => e.score = score,
            None => edges.push(GraphEdge {
                from_kind,
                from_id: from_id.to_string(),
                to_kind,
                to_id: to_id.to_string(),
                kind,
                score,
            }),
        }
    }

    async fn neighborhood(&self, kind: NodeKind, id: &str, depth: usize) -> GraphSnapshot {
        let nodes = self.nodes.read().unwrap();
        let edges = self.edges.read().unwrap();

        let mut frontier: std::collections::BTreeSet<NodeKey> = std::collections::BTreeSet::new();
        let root = NodeKey { kind, id: id.to_string() };
        if nodes.contains_key(&root) {
            frontier.insert(root);
        }
        let mut visited = frontier.clone();

        for _ in 0..depth {
            let mut next = std::collections::BTreeSet::new();
            for key in &frontier {
                for edge in edges.iter() {
                    if edge.from_kind == key.kind && edge.from_id == key.id {
                        next.insert(NodeKey { kind: edge.to_kind, id: edge.to_id.clone() });
                    }
                    if edge.to_kind == key.kind && edge.to_id == key.id {
                        next.insert(NodeKey { kind: edge.from_kind, id: edge.from_id.clone() });
                    }
                }
            }
            frontier = next.difference(&visited).cloned().collect();
            visited.extend(frontier.clone());
            if frontier.is_empty() {
                break;
            }
        }

        let matched_nodes: Vec<_> =
            visited.iter().filter_map(|k| nodes.get(k).map(|props| (k.clone(), props.clone()))).collect();
        let matched_edges: Vec<_> = edges
            .iter()
            .filter(|e| {
                visited.contains(&NodeKey { kind: e.from_kind, id: e.from_id.clone() })
                    && visited.contains(&NodeKey { kind: e.to_kind, id: e.to_id.clone() })
            })
            .cloned()
            .collect();

        Self::build_snapshot(matched_nodes, matched_edges)
    }

    async fn snapshot(&self) -> GraphSnapshot {
        let nodes = self.nodes.read().unwrap();
        let edges = self.edges.read().unwrap();
        let nodes: Vec<_> = nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Self::build_snapshot(nodes, edges.clone())
    }
}

impl Ord for NodeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.kind.as_str(), &self.id).cmp(&(other.kind.as_str(), &other.id))
    }
}

impl PartialOrd for NodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merge_node_is_idempotent_and_merges_properties() {
        let store = MemoryGraphStore::new();
        let mut props1 = HashMap::new();
        props1.insert("status".to_string(), "open".to_string());
        store.merge_node(NodeKind::Case, "case-1", props1).await;

        let mut props2 = HashMap::new();
        props2.insert("title".to_string(), "suspicious logon".to_string());
        store.merge_node(NodeKind::Case, "case-1", props2).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.summary.total_nodes, 1);
        let node = &snapshot.nodes[0];
        assert_eq!(node.properties.get("status"), Some(&"open".to_string()));
        assert_eq!(node.properties.get("title"), Some(&"suspicious logon".to_string()));
    }

    #[tokio::test]
    async fn merge_edge_updates_score_instead_of_duplicating() {
        let store = MemoryGraphStore::new();
        store.merge_node(NodeKind::Case, "case-1", HashMap::new()).await;
        store.merge_node(NodeKind::Case, "case-2", HashMap::new()).await;

        store
            .merge_edge(NodeKind::Case, "case-1", NodeKind::Case, "case-2", EdgeKind::RelatesTo, Some(0.4))
            .await;
        store
            .merge_edge(NodeKind::Case, "case-1", NodeKind::Case, "case-2", EdgeKind::RelatesTo, Some(0.8))
            .await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.summary.total_edges, 1);
        assert_eq!(snapshot.edges[0].score, Some(0.8));
    }

    #[tokio::test]
    async fn neighborhood_respects_depth() {
        let store = MemoryGraphStore::new();
        store.merge_node(NodeKind::Case, "case-1", HashMap::new()).await;
        store.merge_node(NodeKind::Rule, "rule-1", HashMap::new()).await;
        store.merge_node(NodeKind::Entity, "alice", HashMap::new()).await;
        store.merge_edge(NodeKind::Case, "case-1", NodeKind::Rule, "rule-1", EdgeKind::TriggeredBy, None).await;
        store.merge_edge(NodeKind::Case, "case-1", NodeKind::Entity, "alice", EdgeKind::ObservedIn, None).await;

        let zero_hop = store.neighborhood(NodeKind::Case, "case-1", 0).await;
        assert_eq!(zero_hop.summary.total_nodes, 1);

        let one_hop = store.neighborhood(NodeKind::Case, "case-1", 1).await;
        assert_eq!(one_hop.summary.total_nodes, 3);
    }
}
