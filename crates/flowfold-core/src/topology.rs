//! Input topology records consumed by [`FlowGraph::load`](crate::FlowGraph::load).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable node identifier.
///
/// Topology files may declare ids as JSON strings or integers; both normalise
/// to the same textual id, so `12` and `"12"` name the same node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(from = "RawNodeId", into = "String")]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNodeId {
    Int(i64),
    Text(String),
}

impl From<RawNodeId> for NodeId {
    fn from(raw: RawNodeId) -> Self {
        match raw {
            RawNodeId::Int(n) => Self(n.to_string()),
            RawNodeId::Text(s) => Self(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    #[serde(default)]
    pub id: Option<NodeId>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "parentId", alias = "parent", default)]
    pub parent_id: Option<NodeId>,
}

impl NodeRecord {
    pub fn new(id: &str, kind: &str, name: &str) -> Self {
        Self {
            id: Some(NodeId::from(id)),
            kind: kind.to_string(),
            name: name.to_string(),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_id = Some(NodeId::from(parent));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    #[serde(rename = "sourceId", alias = "source")]
    pub source_id: NodeId,
    #[serde(rename = "targetId", alias = "target")]
    pub target_id: NodeId,
    pub value: f64,
}

impl LinkRecord {
    pub fn new(source: &str, target: &str, value: f64) -> Self {
        Self {
            source_id: NodeId::from(source),
            target_id: NodeId::from(target),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

impl Topology {
    pub fn new(nodes: Vec<NodeRecord>, links: Vec<LinkRecord>) -> Self {
        Self { nodes, links }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_ids_and_short_key_names() {
        let text = r#"{
            "nodes": [
                {"type": "Chapters", "id": 1, "parent": 3, "name": "Chapter 3"},
                {"type": "Book", "id": "3", "parent": null, "name": "Book"}
            ],
            "links": [{"source": 1, "target": "3", "value": 2260}]
        }"#;
        let topo = Topology::from_json(text).expect("parse topology");

        assert_eq!(topo.nodes[0].id, Some(NodeId::from("1")));
        assert_eq!(topo.nodes[0].parent_id, Some(NodeId::from("3")));
        assert_eq!(topo.nodes[1].parent_id, None);
        assert_eq!(topo.links[0].source_id, NodeId::from("1"));
        assert_eq!(topo.links[0].target_id, NodeId::from("3"));
    }

    #[test]
    fn accepts_spec_key_names_and_missing_ids() {
        let text = r#"{
            "nodes": [{"type": "Revenue", "name": "anonymous", "parentId": null}],
            "links": [{"sourceId": "a", "targetId": "b", "value": 1.5}]
        }"#;
        let topo = Topology::from_json(text).expect("parse topology");

        assert_eq!(topo.nodes[0].id, None);
        assert_eq!(topo.nodes[0].kind, "Revenue");
        assert_eq!(topo.links[0].value, 1.5);
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let encoded = serde_json::to_string(&NodeId::from("42")).expect("encode");
        assert_eq!(encoded, "\"42\"");
    }
}
