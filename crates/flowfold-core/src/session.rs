//! Interaction gate around a loaded graph.
//!
//! Renderers animate every accepted mutation. While an animation is running
//! the session is `Settling`: further toggles are deferred and hovers ignored
//! until the renderer reports the epoch as settled.

use crate::connectivity::{Connectivity, LinkDetail};
use crate::error::FlowError;
use crate::format::{collapser_hint, node_hint};
use crate::projector::{LinkId, Projection};
use crate::store::{FlowGraph, NodeIdx, NodeState};
use crate::topology::{NodeId, Topology};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gate {
    #[default]
    Ready,
    Settling {
        epoch: u64,
    },
}

/// An accepted toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub epoch: u64,
    pub node: NodeId,
    pub state: NodeState,
    pub frame: Projection,
    /// Nodes this transition hid, each with the box it folds into.
    pub exits: Vec<Exit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    pub node: NodeId,
    pub into: NodeId,
}

/// What the renderer shows while the pointer rests on a visible node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHover {
    pub focus: NodeId,
    pub hint: String,
    /// One-hop classification around a box; `None` on a collapser.
    pub connectivity: Option<Connectivity>,
    /// Boxes grouped under a hovered collapser; empty on a box.
    pub members: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Accepted(Transition),
    /// A previous transition has not settled; nothing changed.
    Deferred { pending: u64 },
}

#[derive(Debug, Default)]
pub struct Session {
    graph: Option<FlowGraph>,
    frame: Projection,
    epoch: u64,
    gate: Gate,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current graph. On failure the session is left empty.
    pub fn load(&mut self, topology: Topology) -> Result<u64, FlowError> {
        match FlowGraph::load(topology) {
            Ok(mut graph) => {
                self.frame = graph.project();
                self.graph = Some(graph);
                Ok(self.begin_settling())
            }
            Err(err) => {
                tracing::warn!(error = %err, "topology rejected");
                self.graph = None;
                self.frame = Projection::default();
                self.gate = Gate::Ready;
                Err(err)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.graph.is_some()
    }

    pub fn graph(&self) -> Result<&FlowGraph, FlowError> {
        self.graph.as_ref().ok_or(FlowError::NotLoaded)
    }

    /// Latest projection; empty before a successful load.
    pub fn frame(&self) -> &Projection {
        &self.frame
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    pub fn is_ready(&self) -> bool {
        self.gate == Gate::Ready
    }

    pub fn toggle(&mut self, id: &NodeId) -> Result<Admission, FlowError> {
        let graph = self.graph.as_mut().ok_or(FlowError::NotLoaded)?;
        graph.lookup(id)?;
        if let Gate::Settling { epoch } = self.gate {
            tracing::debug!(node = %id, pending = epoch, "toggle deferred");
            return Ok(Admission::Deferred { pending: epoch });
        }

        let shown: Vec<NodeIdx> = graph
            .nodes()
            .filter(|(_, n)| n.state() != NodeState::Contained)
            .map(|(idx, _)| idx)
            .collect();
        let state = graph.toggle(id)?;
        let exits = shown
            .into_iter()
            .filter(|idx| graph.node(*idx).state() == NodeState::Contained)
            .filter_map(|idx| {
                let into = graph.collapsed_ancestor(idx)?;
                Some(Exit {
                    node: graph.node(idx).id().clone(),
                    into: graph.node(into).id().clone(),
                })
            })
            .collect();
        self.frame = graph.project();
        let epoch = self.begin_settling();
        tracing::info!(node = %id, %state, epoch, "transition accepted");
        Ok(Admission::Accepted(Transition {
            epoch,
            node: id.clone(),
            state,
            frame: self.frame.clone(),
            exits,
        }))
    }

    /// Mark `epoch` as settled. Stale or unknown epochs are ignored.
    pub fn settle(&mut self, epoch: u64) -> bool {
        match self.gate {
            Gate::Settling { epoch: pending } if pending == epoch => {
                self.gate = Gate::Ready;
                tracing::debug!(epoch, "settled");
                true
            }
            _ => false,
        }
    }

    /// Hint and highlight for a hovered node; `None` while settling or when
    /// the pointer left every node. A collapser highlights the boxes it
    /// groups, a box its one-hop neighbourhood.
    pub fn hover_node(&self, id: Option<&NodeId>) -> Result<Option<NodeHover>, FlowError> {
        let graph = self.graph()?;
        let Some(id) = id else {
            return Ok(None);
        };
        graph.lookup(id)?;
        if !self.is_ready() {
            return Ok(None);
        }
        let node = self
            .frame
            .node(id)
            .ok_or_else(|| FlowError::NodeNotVisible(id.clone()))?;

        let hover = if node.state == NodeState::Expanded {
            let members = graph
                .visible_descendants(id)?
                .into_iter()
                .map(|idx| graph.node(idx).id().clone())
                .collect();
            NodeHover {
                focus: id.clone(),
                hint: collapser_hint(&node.name),
                connectivity: None,
                members,
            }
        } else {
            NodeHover {
                focus: id.clone(),
                hint: node_hint(&node.name, node.net_flow, node.has_children),
                connectivity: Connectivity::resolve(&self.frame, id),
                members: Vec::new(),
            }
        };
        Ok(Some(hover))
    }

    pub fn hover_link(&self, id: Option<&LinkId>) -> Result<Option<LinkDetail>, FlowError> {
        self.graph()?;
        let Some(id) = id else {
            return Ok(None);
        };
        if !self.is_ready() {
            return Ok(None);
        }
        LinkDetail::describe(&self.frame, id)
            .map(Some)
            .ok_or_else(|| FlowError::LinkNotFound(id.clone()))
    }

    fn begin_settling(&mut self) -> u64 {
        self.epoch += 1;
        self.gate = Gate::Settling { epoch: self.epoch };
        self.epoch
    }
}
