//! Property graph storage.
//!
//! Node identity is a single string namespace: users are keyed by lowercased
//! screen name, tweets by id, and lists/communities/spaces by a
//! `list_`/`community_`/`space_` prefixed id.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity categories in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    User,
    Tweet,
    List,
    Community,
    Space,
}

/// Relationship categories. At most one edge exists per
/// (source, target, kind) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Posted,
    Follows,
    IsReplyTo,
    IsQuoteOf,
    IsRetweetOf,
    Mentions,
    MemberOf,
    FollowsList,
    ContainsTweet,
    CreatedSpace,
    AdminOf,
    SpeakerIn,
}

/// A graph node with its accumulated properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub properties: Map<String, Value>,
}

/// A directed edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Serializable export of the whole graph, nodes and edges in stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Directed property graph of users, tweets, lists, communities, and spaces.
#[derive(Debug, Default)]
pub struct EntityGraph {
    nodes: BTreeMap<String, Node>,
    edges: BTreeSet<Edge>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node or merge properties into an existing one. Null-valued
    /// properties are dropped so sparse records never erase known values.
    /// The kind always reflects the latest upsert.
    pub fn upsert_node(
        &mut self,
        id: impl Into<String>,
        kind: NodeKind,
        properties: Map<String, Value>,
    ) -> bool {
        let id = id.into();
        if id.is_empty() {
            tracing::warn!(?kind, "attempted to add node with empty id");
            return false;
        }

        let node = self.nodes.entry(id.clone()).or_insert_with(|| Node {
            id,
            kind,
            properties: Map::new(),
        });
        node.kind = kind;
        for (key, value) in properties {
            if !value.is_null() {
                node.properties.insert(key, value);
            }
        }
        true
    }

    /// Add a directed edge. Duplicate (source, target, kind) triples and
    /// edges with a missing endpoint are ignored.
    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) {
        let source = source.into();
        let target = target.into();
        if source.is_empty() || target.is_empty() {
            tracing::warn!(?kind, "attempted to add edge with missing endpoint");
            return;
        }
        self.edges.insert(Edge {
            source,
            target,
            kind,
        });
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn has_edge(&self, source: &str, target: &str, kind: EdgeKind) -> bool {
        self.edges.contains(&Edge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Export the graph in deterministic order.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_upsert_merges_non_null_properties() {
        let mut graph = EntityGraph::new();
        graph.upsert_node(
            "jack",
            NodeKind::User,
            props(&[("screen_name", json!("jack")), ("followers_count", json!(500))]),
        );
        graph.upsert_node(
            "jack",
            NodeKind::User,
            props(&[("name", json!("Jack")), ("location", Value::Null)]),
        );

        let node = graph.node("jack").unwrap();
        assert_eq!(node.properties["followers_count"], json!(500));
        assert_eq!(node.properties["name"], json!("Jack"));
        assert!(!node.properties.contains_key("location"));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_upsert_rejects_empty_id() {
        let mut graph = EntityGraph::new();
        assert!(!graph.upsert_node("", NodeKind::User, Map::new()));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = EntityGraph::new();
        graph.add_edge("jack", "100", EdgeKind::Posted);
        graph.add_edge("jack", "100", EdgeKind::Posted);
        graph.add_edge("jack", "100", EdgeKind::Mentions);

        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge("jack", "100", EdgeKind::Posted));
        assert!(graph.has_edge("jack", "100", EdgeKind::Mentions));
    }

    #[test]
    fn test_edge_with_missing_endpoint_skipped() {
        let mut graph = EntityGraph::new();
        graph.add_edge("", "100", EdgeKind::Posted);
        graph.add_edge("jack", "", EdgeKind::Posted);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_snapshot_is_ordered_and_round_trips() {
        let mut graph = EntityGraph::new();
        graph.upsert_node("zed", NodeKind::User, Map::new());
        graph.upsert_node("abe", NodeKind::User, Map::new());
        graph.add_edge("zed", "abe", EdgeKind::Follows);

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes[0].id, "abe");
        assert_eq!(snapshot.nodes[1].id, "zed");

        let text = serde_json::to_string(&snapshot).unwrap();
        let back: GraphSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back.nodes.len(), 2);
        assert_eq!(back.edges.len(), 1);
        assert_eq!(back.edges[0].kind, EdgeKind::Follows);
    }
}
