//! Collapse/expand state machine over the grouping tree.
//!
//! Transitions are computed as a list of assignments from a shared borrow and
//! only then committed, so a rejected transition leaves every node untouched.

use crate::error::FlowError;
use crate::store::{FlowGraph, NodeIdx, NodeState};
use crate::topology::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Expand,
    Collapse,
    Toggle,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Expand => "expand",
            Op::Collapse => "collapse",
            Op::Toggle => "toggle",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Assignment {
    idx: NodeIdx,
    state: NodeState,
    active_parent: Option<NodeIdx>,
    reveal_origin: Option<NodeIdx>,
}

impl FlowGraph {
    /// Roots start collapsed; everything else is contained by its root.
    pub fn initialize(&mut self) {
        let plan: Vec<Assignment> = self
            .nodes()
            .map(|(idx, node)| match node.ancestors().first() {
                Some(root) => Assignment {
                    idx,
                    state: NodeState::Contained,
                    active_parent: Some(*root),
                    reveal_origin: None,
                },
                None => Assignment {
                    idx,
                    state: NodeState::Collapsed,
                    active_parent: None,
                    reveal_origin: None,
                },
            })
            .collect();
        self.commit(plan);
    }

    pub fn expand(&mut self, id: &NodeId) -> Result<NodeState, FlowError> {
        let idx = self.lookup(id)?;
        let plan = self.plan_expand(idx)?;
        self.commit(plan);
        tracing::debug!(node = %id, "expanded");
        Ok(NodeState::Expanded)
    }

    pub fn collapse(&mut self, id: &NodeId) -> Result<NodeState, FlowError> {
        let idx = self.lookup(id)?;
        let plan = self.plan_collapse(idx)?;
        self.commit(plan);
        tracing::debug!(node = %id, "collapsed");
        Ok(NodeState::Collapsed)
    }

    /// Collapse an expanded node or expand a collapsed one. Contained nodes
    /// are rejected; callers target the visible representative instead.
    pub fn toggle(&mut self, id: &NodeId) -> Result<NodeState, FlowError> {
        let idx = self.lookup(id)?;
        match self.node(idx).state() {
            NodeState::Collapsed => self.expand(id),
            NodeState::Expanded => self.collapse(id),
            NodeState::Contained => Err(FlowError::InvalidTransition {
                node: id.clone(),
                state: NodeState::Contained,
                op: Op::Toggle,
            }),
        }
    }

    pub fn state_of(&self, id: &NodeId) -> Result<NodeState, FlowError> {
        Ok(self.node(self.lookup(id)?).state())
    }

    fn plan_expand(&self, idx: NodeIdx) -> Result<Vec<Assignment>, FlowError> {
        self.require(idx, NodeState::Collapsed, Op::Expand)?;
        let node = self.node(idx);

        let mut plan = vec![Assignment {
            idx,
            state: NodeState::Expanded,
            active_parent: None,
            reveal_origin: node.reveal_origin(),
        }];
        for &child in node.children() {
            plan.push(Assignment {
                idx: child,
                state: NodeState::Collapsed,
                active_parent: None,
                reveal_origin: Some(idx),
            });
            plan.extend(self.contain_under(child));
        }
        Ok(plan)
    }

    fn plan_collapse(&self, idx: NodeIdx) -> Result<Vec<Assignment>, FlowError> {
        self.require(idx, NodeState::Expanded, Op::Collapse)?;

        let mut plan = vec![Assignment {
            idx,
            state: NodeState::Collapsed,
            active_parent: None,
            reveal_origin: self.node(idx).reveal_origin(),
        }];
        plan.extend(self.contain_under(idx));
        Ok(plan)
    }

    /// Every descendant of `delegate` becomes contained, represented by it.
    fn contain_under(&self, delegate: NodeIdx) -> impl Iterator<Item = Assignment> + '_ {
        self.descendants(delegate)
            .into_iter()
            .map(move |idx| Assignment {
                idx,
                state: NodeState::Contained,
                active_parent: Some(delegate),
                reveal_origin: self.node(idx).reveal_origin(),
            })
    }

    fn require(&self, idx: NodeIdx, expected: NodeState, op: Op) -> Result<(), FlowError> {
        let node = self.node(idx);
        if node.state() == expected {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                node: node.id().clone(),
                state: node.state(),
                op,
            })
        }
    }

    fn commit(&mut self, plan: Vec<Assignment>) {
        for a in plan {
            let node = self.node_mut(a.idx);
            node.state = a.state;
            node.active_parent = a.active_parent;
            node.reveal_origin = a.reveal_origin;
        }
    }

    /// Nearest visible ancestor-or-self: the resolved endpoint used when
    /// aggregating links.
    pub fn representative(&self, idx: NodeIdx) -> NodeIdx {
        let mut cur = idx;
        for _ in 0..self.len() {
            let node = self.node(cur);
            match (node.state(), node.active_parent()) {
                (NodeState::Contained, Some(delegate)) => cur = delegate,
                _ => break,
            }
        }
        cur
    }

    /// First collapsed ancestor, root first. A node that just became hidden
    /// animates towards this one.
    pub fn collapsed_ancestor(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.node(idx)
            .ancestors()
            .iter()
            .copied()
            .find(|a| self.node(*a).state() == NodeState::Collapsed)
    }

    /// Collapsed boxes grouped under `id`, highlighted while the pointer is
    /// on an expanded node's collapser.
    pub fn visible_descendants(&self, id: &NodeId) -> Result<Vec<NodeIdx>, FlowError> {
        let idx = self.lookup(id)?;
        Ok(self
            .descendants(idx)
            .into_iter()
            .filter(|d| self.node(*d).state() == NodeState::Collapsed)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{NodeRecord, Topology};

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    // r ─┬─ a ─┬─ a1
    //    │     └─ a2 ── a2x
    //    └─ b
    // s
    fn sample() -> FlowGraph {
        let nodes = vec![
            NodeRecord::new("r", "Group", "r"),
            NodeRecord::new("a", "Group", "a").with_parent("r"),
            NodeRecord::new("a1", "Leaf", "a1").with_parent("a"),
            NodeRecord::new("a2", "Group", "a2").with_parent("a"),
            NodeRecord::new("a2x", "Leaf", "a2x").with_parent("a2"),
            NodeRecord::new("b", "Leaf", "b").with_parent("r"),
            NodeRecord::new("s", "Leaf", "s"),
        ];
        FlowGraph::load(Topology::new(nodes, vec![])).expect("valid topology")
    }

    fn snapshot(g: &FlowGraph) -> Vec<(NodeState, Option<NodeIdx>)> {
        g.nodes()
            .map(|(_, n)| (n.state(), n.active_parent()))
            .collect()
    }

    #[test]
    fn initialize_collapses_roots_and_contains_the_rest() {
        let g = sample();
        let r = g.lookup(&id("r")).unwrap();
        for (_, node) in g.nodes() {
            if node.parent().is_none() {
                assert_eq!(node.state(), NodeState::Collapsed);
                assert_eq!(node.active_parent(), None);
            } else {
                assert_eq!(node.state(), NodeState::Contained);
                assert_eq!(node.active_parent(), Some(r));
            }
        }
    }

    #[test]
    fn expand_reveals_children_and_rehomes_grandchildren() {
        let mut g = sample();
        g.expand(&id("r")).unwrap();
        let r = g.lookup(&id("r")).unwrap();
        let a = g.lookup(&id("a")).unwrap();

        assert_eq!(g.state_of(&id("r")).unwrap(), NodeState::Expanded);
        assert_eq!(g.state_of(&id("a")).unwrap(), NodeState::Collapsed);
        assert_eq!(g.state_of(&id("b")).unwrap(), NodeState::Collapsed);
        assert_eq!(g.node(a).reveal_origin(), Some(r));
        for leaf in ["a1", "a2", "a2x"] {
            let n = g.get(&id(leaf)).unwrap();
            assert_eq!(n.state(), NodeState::Contained);
            assert_eq!(n.active_parent(), Some(a));
        }
    }

    #[test]
    fn expand_then_collapse_restores_descendants() {
        let mut g = sample();
        g.expand(&id("r")).unwrap();
        let before = snapshot(&g);

        g.expand(&id("a")).unwrap();
        g.expand(&id("a2")).unwrap();
        g.collapse(&id("a2")).unwrap();
        g.collapse(&id("a")).unwrap();

        assert_eq!(snapshot(&g), before);
    }

    #[test]
    fn collapse_contains_every_depth_under_the_collapsed_node() {
        let mut g = sample();
        g.expand(&id("r")).unwrap();
        g.expand(&id("a")).unwrap();
        g.expand(&id("a2")).unwrap();
        g.collapse(&id("r")).unwrap();

        let r = g.lookup(&id("r")).unwrap();
        for d in g.descendants(r) {
            assert_eq!(g.node(d).state(), NodeState::Contained);
            assert_eq!(g.node(d).active_parent(), Some(r));
        }
    }

    #[test]
    fn invalid_transitions_leave_state_untouched() {
        let mut g = sample();
        let before = snapshot(&g);

        let err = g.expand(&id("a")).unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidTransition {
                node: id("a"),
                state: NodeState::Contained,
                op: Op::Expand,
            }
        );
        assert!(g.collapse(&id("r")).is_err());
        assert!(g.toggle(&id("a2x")).is_err());
        assert_eq!(g.expand(&id("ghost")), Err(FlowError::NodeNotFound(id("ghost"))));

        assert_eq!(snapshot(&g), before);
    }

    #[test]
    fn expanding_twice_is_rejected() {
        let mut g = sample();
        g.expand(&id("r")).unwrap();
        assert!(matches!(
            g.expand(&id("r")),
            Err(FlowError::InvalidTransition {
                state: NodeState::Expanded,
                ..
            })
        ));
    }

    #[test]
    fn toggle_alternates() {
        let mut g = sample();
        assert_eq!(g.toggle(&id("r")).unwrap(), NodeState::Expanded);
        assert_eq!(g.toggle(&id("r")).unwrap(), NodeState::Collapsed);
    }

    #[test]
    fn childless_node_may_expand_and_stays_its_own_representative() {
        let mut g = sample();
        g.expand(&id("s")).unwrap();
        let s = g.lookup(&id("s")).unwrap();
        assert_eq!(g.node(s).state(), NodeState::Expanded);
        assert_eq!(g.representative(s), s);
    }

    #[test]
    fn representative_and_collapsed_ancestor_agree() {
        let mut g = sample();
        g.expand(&id("r")).unwrap();
        let a = g.lookup(&id("a")).unwrap();
        let a2x = g.lookup(&id("a2x")).unwrap();

        assert_eq!(g.representative(a2x), a);
        assert_eq!(g.collapsed_ancestor(a2x), Some(a));
        assert_eq!(g.representative(a), a);
    }

    #[test]
    fn visible_descendants_are_the_grouped_boxes() {
        let mut g = sample();
        g.expand(&id("r")).unwrap();
        g.expand(&id("a")).unwrap();

        let members: Vec<&str> = g
            .visible_descendants(&id("r"))
            .unwrap()
            .into_iter()
            .map(|idx| g.node(idx).id().as_str())
            .collect();
        assert_eq!(members, vec!["a1", "a2", "b"]);
    }
}
