//! Flow graph store: an index-addressed arena of nodes plus the input links.
//!
//! Topology (ids, grouping parents, children, ancestors, links) is fixed at
//! load. Only the per-node visibility state and aggregate values change
//! afterwards, through the hierarchy and projector modules.

use crate::error::{FlowError, HierarchyProblem};
use crate::topology::{NodeId, Topology};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Dense index into the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(usize);

impl NodeIdx {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Shown as one aggregate box; children hidden.
    Collapsed,
    /// Children shown in its place; only the collapser affordance remains.
    Expanded,
    /// Hidden, represented by `active_parent`.
    Contained,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeState::Collapsed => "collapsed",
            NodeState::Expanded => "expanded",
            NodeState::Contained => "contained",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: String,
    name: String,
    parent: Option<NodeIdx>,
    children: SmallVec<[NodeIdx; 4]>,
    ancestors: Vec<NodeIdx>,

    pub(crate) state: NodeState,
    pub(crate) active_parent: Option<NodeIdx>,
    pub(crate) reveal_origin: Option<NodeIdx>,

    pub(crate) value: f64,
    pub(crate) net_flow: f64,
    base_value: f64,
    base_net_flow: f64,
}

impl Node {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Category tag (`type` in topology files).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permanent grouping parent.
    pub fn parent(&self) -> Option<NodeIdx> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIdx] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Grouping ancestors, root first, excluding the node itself.
    pub fn ancestors(&self) -> &[NodeIdx] {
        &self.ancestors
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Visible node currently standing in for this one, set only while contained.
    pub fn active_parent(&self) -> Option<NodeIdx> {
        self.active_parent
    }

    /// Node whose expansion last revealed this one.
    pub fn reveal_origin(&self) -> Option<NodeIdx> {
        self.reveal_origin
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Inflow minus outflow.
    pub fn net_flow(&self) -> f64 {
        self.net_flow
    }

    pub(crate) fn reset_values(&mut self) {
        self.value = self.base_value;
        self.net_flow = self.base_net_flow;
    }
}

/// Input directed link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub source: NodeIdx,
    pub target: NodeIdx,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<Node>,
    links: Vec<Link>,
    by_id: HashMap<NodeId, NodeIdx>,
}

impl FlowGraph {
    /// Validate a topology and build the arena, leaving every node in its
    /// initial state.
    pub fn load(topology: Topology) -> Result<Self, FlowError> {
        let Topology {
            nodes: records,
            links: link_records,
        } = topology;

        let ids = assign_ids(&records)?;
        let by_id: HashMap<NodeId, NodeIdx> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), NodeIdx(i)))
            .collect();

        let mut parents: Vec<Option<NodeIdx>> = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let parent = match &record.parent_id {
                Some(pid) => match by_id.get(pid) {
                    Some(idx) => Some(*idx),
                    None => {
                        return Err(FlowError::MalformedHierarchy {
                            node: ids[i].clone(),
                            problem: HierarchyProblem::DanglingParent(pid.clone()),
                        })
                    }
                },
                None => None,
            };
            parents.push(parent);
        }

        let mut ancestors: Vec<Vec<NodeIdx>> = Vec::with_capacity(records.len());
        for i in 0..records.len() {
            let mut chain = Vec::new();
            let mut cur = parents[i];
            while let Some(p) = cur {
                if chain.len() >= records.len() {
                    return Err(FlowError::MalformedHierarchy {
                        node: ids[i].clone(),
                        problem: HierarchyProblem::Cycle,
                    });
                }
                chain.push(p);
                cur = parents[p.0];
            }
            chain.reverse();
            ancestors.push(chain);
        }

        let mut children: Vec<SmallVec<[NodeIdx; 4]>> = vec![SmallVec::new(); records.len()];
        for (i, parent) in parents.iter().enumerate() {
            if let Some(p) = parent {
                children[p.0].push(NodeIdx(i));
            }
        }

        let mut links = Vec::with_capacity(link_records.len());
        for record in link_records {
            let endpoint = |id: &NodeId| {
                by_id
                    .get(id)
                    .copied()
                    .ok_or_else(|| FlowError::DanglingLinkReference {
                        from: record.source_id.clone(),
                        to: record.target_id.clone(),
                        missing: id.clone(),
                    })
            };
            let source = endpoint(&record.source_id)?;
            let target = endpoint(&record.target_id)?;
            if !record.value.is_finite() || record.value <= 0.0 {
                return Err(FlowError::InvalidLinkValue {
                    from: record.source_id,
                    to: record.target_id,
                    value: record.value,
                });
            }
            links.push(Link {
                source,
                target,
                value: record.value,
            });
        }

        let mut base_value = vec![0.0; records.len()];
        let mut base_net = vec![0.0; records.len()];
        for link in &links {
            base_value[link.source.0] += link.value;
            base_value[link.target.0] += link.value;
            base_net[link.source.0] -= link.value;
            base_net[link.target.0] += link.value;
        }

        let nodes = records
            .into_iter()
            .zip(ids)
            .zip(parents)
            .zip(children.into_iter().zip(ancestors))
            .enumerate()
            .map(|(i, (((record, id), parent), (children, ancestors)))| Node {
                id,
                kind: record.kind,
                name: record.name,
                parent,
                children,
                ancestors,
                state: NodeState::Collapsed,
                active_parent: None,
                reveal_origin: None,
                value: base_value[i],
                net_flow: base_net[i],
                base_value: base_value[i],
                base_net_flow: base_net[i],
            })
            .collect();

        let mut graph = Self {
            nodes,
            links,
            by_id,
        };
        graph.initialize();

        tracing::info!(
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            roots = graph.roots().count(),
            "topology loaded"
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeIdx(i), n))
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.nodes()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(idx, _)| idx)
    }

    /// Panics if `idx` did not come from this graph.
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.by_id.get(id).map(|idx| self.node(*idx))
    }

    pub fn lookup(&self, id: &NodeId) -> Result<NodeIdx, FlowError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| FlowError::NodeNotFound(id.clone()))
    }

    /// Every node below `idx`, parents before children.
    pub fn descendants(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeIdx> = self.node(idx).children.iter().rev().copied().collect();
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.node(cur).children.iter().rev().copied());
        }
        out
    }

    /// Is `ancestor` a strict grouping ancestor of `idx`?
    pub fn is_ancestor(&self, ancestor: NodeIdx, idx: NodeIdx) -> bool {
        self.node(idx).ancestors.contains(&ancestor)
    }
}

fn assign_ids(records: &[crate::topology::NodeRecord]) -> Result<Vec<NodeId>, FlowError> {
    let mut taken: HashSet<NodeId> = HashSet::new();
    for record in records {
        if let Some(id) = &record.id {
            if !taken.insert(id.clone()) {
                return Err(FlowError::MalformedHierarchy {
                    node: id.clone(),
                    problem: HierarchyProblem::DuplicateId,
                });
            }
        }
    }

    let mut ids = Vec::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        match &record.id {
            Some(id) => ids.push(id.clone()),
            None => {
                let mut candidate = NodeId(format!("#{position}"));
                let mut bump = 0usize;
                while taken.contains(&candidate) {
                    bump += 1;
                    candidate = NodeId(format!("#{position}.{bump}"));
                }
                taken.insert(candidate.clone());
                ids.push(candidate);
            }
        }
    }
    Ok(ids)
}
