//! Error taxonomy for loading topologies and driving the hierarchy.
//!
//! Every variant is a load-time or caller-usage error. None of them is
//! transient, and an operation that returns one has not mutated any state.

use crate::hierarchy::Op;
use crate::projector::LinkId;
use crate::store::NodeState;
use crate::topology::NodeId;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    /// Cyclic, dangling or duplicated grouping relation.
    #[error("malformed hierarchy at node {node}: {problem}")]
    MalformedHierarchy {
        node: NodeId,
        problem: HierarchyProblem,
    },

    /// A link endpoint names a node that was never declared.
    #[error("link {from} -> {to} references unknown node {missing}")]
    DanglingLinkReference {
        from: NodeId,
        to: NodeId,
        missing: NodeId,
    },

    /// Link values must be finite and strictly positive.
    #[error("link {from} -> {to} has invalid value {value}")]
    InvalidLinkValue { from: NodeId, to: NodeId, value: f64 },

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {0} is not currently visible")]
    NodeNotVisible(NodeId),

    #[error("link {0} not found")]
    LinkNotFound(LinkId),

    /// Transition precondition violated.
    #[error("cannot {op} node {node} while it is {state}")]
    InvalidTransition {
        node: NodeId,
        state: NodeState,
        op: Op,
    },

    #[error("no topology loaded")]
    NotLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyProblem {
    DanglingParent(NodeId),
    Cycle,
    DuplicateId,
}

impl fmt::Display for HierarchyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyProblem::DanglingParent(parent) => write!(f, "unknown parent {parent}"),
            HierarchyProblem::Cycle => f.write_str("parent chain does not reach a root"),
            HierarchyProblem::DuplicateId => f.write_str("id declared more than once"),
        }
    }
}
