pub mod connectivity;
pub mod error;
pub mod format;
pub mod hierarchy;
pub mod projector;
pub mod session;
pub mod store;
pub mod topology;

pub use connectivity::{Connectivity, LinkDetail, LinkRole, NodeAffinity};
pub use error::{FlowError, HierarchyProblem};
pub use hierarchy::Op;
pub use projector::{Direction, LinkId, Projection, VisibleLink, VisibleNode};
pub use session::{Admission, Exit, Gate, NodeHover, Session, Transition};
pub use store::{FlowGraph, Link, Node, NodeIdx, NodeState};
pub use topology::{LinkRecord, NodeId, NodeRecord, Topology};

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Messages exchanged between the agent and renderers, one JSON document per
/// length-delimited frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Msg {
    Hello { version: String },
    RequestSnapshot,
    Snapshot { epoch: u64, gate: Gate, frame: Projection },

    // renderer gestures
    Toggle { node: NodeId },
    Settled { epoch: u64 },
    HoverNode { node: Option<NodeId> },
    HoverLink { link: Option<LinkId> },

    Transition(Transition),
    Deferred { node: NodeId, pending: u64 },
    Status { gate: Gate },
    Highlight { hover: Option<NodeHover> },
    LinkInfo { detail: Option<LinkDetail> },
    Rejected { error: String },

    Ping,
    Pong,
}
