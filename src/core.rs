use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use petgraph::graph::NodeIndex;

/// A type-erased, thread-safe container.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

/// Atomic reference-counted string type used for identifiers.
pub(crate) type ArcStr = Arc<str>;

/// A lightweight, copyable reference to a node in the graph.
///
/// Returned by the [`Blueprint`](crate::Blueprint) when a project or a
/// producer is registered, and used afterwards to wire edges and to address
/// the node in a [`Workspace`](crate::Workspace). A `NodeId` is only
/// meaningful for the blueprint that created it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Returns the underlying `NodeIndex` of the node in the graph.
    pub fn index(&self) -> NodeIndex {
        self.0
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0.index())
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}
