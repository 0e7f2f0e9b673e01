//! Derives the visible node set and the aggregated visible links from the
//! current hierarchy state.
//!
//! Projection is recomputed from scratch every time: node aggregates are
//! reset to their load-time values before collapsed subtrees are re-summed,
//! so the result never depends on the order of earlier transitions.

use crate::store::{FlowGraph, NodeIdx, NodeState};
use crate::topology::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a visible link, independent of flow direction.
///
/// Encoded as `<len>:<lo>|<hi>` where `len` is the byte length of the
/// smaller endpoint id, so ids containing `|` cannot collide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct LinkId(pub String);

impl LinkId {
    pub fn between(a: &NodeId, b: &NodeId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}:{lo}|{hi}", lo.as_str().len()))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which way the net flow of a visible link runs. Serialized as `1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Direction {
    /// Source to target dominates.
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

impl From<Direction> for i8 {
    fn from(d: Direction) -> Self {
        d.sign()
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Backward),
            other => Err(format!("invalid link direction {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: NodeState,
    pub value: f64,
    pub net_flow: f64,
    /// Stands in for hidden descendants.
    pub aggregate: bool,
    pub has_children: bool,
    pub ancestors: Vec<NodeId>,
    /// Node whose expansion revealed this one; renderers animate entry from it.
    pub enter_from: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleLink {
    pub id: LinkId,
    pub source: NodeId,
    pub target: NodeId,
    pub value: f64,
    pub direction: Direction,
}

impl VisibleLink {
    /// Endpoint the net flow leaves from.
    pub fn flow_source(&self) -> &NodeId {
        match self.direction {
            Direction::Forward => &self.source,
            Direction::Backward => &self.target,
        }
    }

    /// Endpoint the net flow arrives at.
    pub fn flow_target(&self) -> &NodeId {
        match self.direction {
            Direction::Forward => &self.target,
            Direction::Backward => &self.source,
        }
    }

    pub fn touches(&self, id: &NodeId) -> bool {
        &self.source == id || &self.target == id
    }
}

/// The visible graph handed to layout and rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub nodes: Vec<VisibleNode>,
    pub links: Vec<VisibleLink>,
}

impl Projection {
    pub fn node(&self, id: &NodeId) -> Option<&VisibleNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn link(&self, id: &LinkId) -> Option<&VisibleLink> {
        self.links.iter().find(|l| &l.id == id)
    }

    pub fn is_visible(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Collapsed nodes, drawn as boxes.
    pub fn boxes(&self) -> impl Iterator<Item = &VisibleNode> {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Collapsed)
    }

    /// Expanded nodes, drawn as collapser markers only.
    pub fn collapsers(&self) -> impl Iterator<Item = &VisibleNode> {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Expanded)
    }

    /// Direct neighbours over the visible links, in either direction.
    pub fn connected(&self, a: &NodeId, b: &NodeId) -> bool {
        (a == b && self.is_visible(a))
            || self
                .links
                .iter()
                .any(|l| l.touches(a) && l.touches(b))
    }
}

/// Directional totals for one unordered pair of resolved endpoints.
#[derive(Debug, Clone, Copy)]
struct PairFlow {
    source: NodeIdx,
    target: NodeIdx,
    forward: f64,
    backward: f64,
}

impl PairFlow {
    fn value(&self) -> f64 {
        (self.forward - self.backward).abs()
    }

    fn direction(&self) -> Direction {
        if self.forward >= self.backward {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    fn flow_endpoints(&self) -> (NodeIdx, NodeIdx) {
        match self.direction() {
            Direction::Forward => (self.source, self.target),
            Direction::Backward => (self.target, self.source),
        }
    }
}

impl FlowGraph {
    /// Recompute aggregates and return the visible nodes and links.
    pub fn project(&mut self) -> Projection {
        let pairs = self.resolve_pairs();
        self.apply_aggregates(&pairs);
        let projection = self.build_projection(&pairs);
        tracing::debug!(
            nodes = projection.nodes.len(),
            links = projection.links.len(),
            "projection recomputed"
        );
        projection
    }

    fn resolve_pairs(&self) -> Vec<PairFlow> {
        let mut pairs: BTreeMap<(NodeIdx, NodeIdx), (f64, f64)> = BTreeMap::new();
        for link in self.links() {
            let s = self.representative(link.source);
            let t = self.representative(link.target);
            if s == t {
                continue;
            }
            if s < t {
                pairs.entry((s, t)).or_insert((0.0, 0.0)).0 += link.value;
            } else {
                pairs.entry((t, s)).or_insert((0.0, 0.0)).1 += link.value;
            }
        }
        pairs
            .into_iter()
            .map(|((source, target), (forward, backward))| PairFlow {
                source,
                target,
                forward,
                backward,
            })
            .collect()
    }

    fn apply_aggregates(&mut self, pairs: &[PairFlow]) {
        for node in self.nodes_mut() {
            node.reset_values();
        }

        let aggregates: Vec<NodeIdx> = self
            .nodes()
            .filter(|(_, n)| n.state() == NodeState::Collapsed && n.has_children())
            .map(|(idx, _)| idx)
            .collect();
        for idx in aggregates {
            let mut value = 0.0;
            let mut net_flow = 0.0;
            for pair in pairs {
                let (from, to) = pair.flow_endpoints();
                if from == idx {
                    value += pair.value();
                    net_flow -= pair.value();
                } else if to == idx {
                    value += pair.value();
                    net_flow += pair.value();
                }
            }
            let node = self.node_mut(idx);
            node.value = value;
            node.net_flow = net_flow;
        }
    }

    fn build_projection(&self, pairs: &[PairFlow]) -> Projection {
        let nodes = self
            .nodes()
            .filter(|(_, n)| n.state() != NodeState::Contained)
            .map(|(_, n)| VisibleNode {
                id: n.id().clone(),
                name: n.name().to_string(),
                kind: n.kind().to_string(),
                state: n.state(),
                value: n.value(),
                net_flow: n.net_flow(),
                aggregate: n.state() == NodeState::Collapsed && n.has_children(),
                has_children: n.has_children(),
                ancestors: n
                    .ancestors()
                    .iter()
                    .map(|a| self.node(*a).id().clone())
                    .collect(),
                enter_from: n.reveal_origin().map(|o| self.node(o).id().clone()),
            })
            .collect();

        let links = pairs
            .iter()
            .map(|pair| {
                let source = self.node(pair.source).id();
                let target = self.node(pair.target).id();
                VisibleLink {
                    id: LinkId::between(source, target),
                    source: source.clone(),
                    target: target.clone(),
                    value: pair.value(),
                    direction: pair.direction(),
                }
            })
            .collect();

        Projection { nodes, links }
    }
}
