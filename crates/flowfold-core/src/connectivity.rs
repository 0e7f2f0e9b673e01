//! One-hop highlight/fade classification around a focal node.

use crate::format::link_label;
use crate::projector::{Direction, LinkId, Projection};
use crate::topology::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAffinity {
    Focus,
    Connected,
    /// Candidate for fading.
    Unconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRole {
    Outgoing,
    Incoming,
    Unconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeClass {
    pub id: NodeId,
    pub affinity: NodeAffinity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkClass {
    pub id: LinkId,
    pub role: LinkRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    pub focus: NodeId,
    pub nodes: Vec<NodeClass>,
    pub links: Vec<LinkClass>,
}

impl Connectivity {
    /// Classify every visible node and link relative to `focus`. Returns
    /// `None` when `focus` is not part of the projection.
    pub fn resolve(projection: &Projection, focus: &NodeId) -> Option<Self> {
        if !projection.is_visible(focus) {
            return None;
        }

        let links = projection
            .links
            .iter()
            .map(|l| LinkClass {
                id: l.id.clone(),
                role: if &l.source == focus {
                    LinkRole::Outgoing
                } else if &l.target == focus {
                    LinkRole::Incoming
                } else {
                    LinkRole::Unconnected
                },
            })
            .collect();

        let neighbours: HashSet<&NodeId> = projection
            .links
            .iter()
            .filter(|l| l.touches(focus))
            .flat_map(|l| [&l.source, &l.target])
            .collect();

        let nodes = projection
            .nodes
            .iter()
            .map(|n| NodeClass {
                id: n.id.clone(),
                affinity: if &n.id == focus {
                    NodeAffinity::Focus
                } else if neighbours.contains(&n.id) {
                    NodeAffinity::Connected
                } else {
                    NodeAffinity::Unconnected
                },
            })
            .collect();

        Some(Self {
            focus: focus.clone(),
            nodes,
            links,
        })
    }

    pub fn affinity(&self, id: &NodeId) -> Option<NodeAffinity> {
        self.nodes.iter().find(|c| &c.id == id).map(|c| c.affinity)
    }

    /// The focus itself counts as connected.
    pub fn is_connected(&self, id: &NodeId) -> bool {
        matches!(
            self.affinity(id),
            Some(NodeAffinity::Focus | NodeAffinity::Connected)
        )
    }

    pub fn role(&self, id: &LinkId) -> Option<LinkRole> {
        self.links.iter().find(|c| &c.id == id).map(|c| c.role)
    }

    pub fn faded_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes
            .iter()
            .filter(|c| c.affinity == NodeAffinity::Unconnected)
            .map(|c| &c.id)
    }

    pub fn faded_links(&self) -> impl Iterator<Item = &LinkId> {
        self.links
            .iter()
            .filter(|c| c.role == LinkRole::Unconnected)
            .map(|c| &c.id)
    }
}

/// Tooltip payload for a hovered link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDetail {
    pub id: LinkId,
    pub source_name: String,
    pub target_name: String,
    pub value: f64,
    pub direction: Direction,
    pub label: String,
}

impl LinkDetail {
    pub fn describe(projection: &Projection, id: &LinkId) -> Option<Self> {
        let link = projection.link(id)?;
        let name_of = |node: &NodeId| {
            projection
                .node(node)
                .map(|n| n.name.clone())
                .unwrap_or_else(|| node.to_string())
        };
        let source_name = name_of(&link.source);
        let target_name = name_of(&link.target);
        let label = link_label(&source_name, &target_name, link.value, link.direction);
        Some(Self {
            id: link.id.clone(),
            source_name,
            target_name,
            value: link.value,
            direction: link.direction,
            label,
        })
    }
}
