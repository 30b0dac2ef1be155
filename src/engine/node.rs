use std::any::TypeId;

use serde_json::{Map, Value};

use crate::core::{ArcStr, NodeId};
use crate::producer::Producer;

/// Weight stored for every node of the graph.
pub(crate) enum Node {
    Project(ProjectNode),
    Producer(ProducerNode),
}

/// A composite node. It produces nothing by itself and answers queries by
/// routing them over its outgoing edges.
pub(crate) struct ProjectNode {
    pub name: ArcStr,
    pub parent: Option<NodeId>,
    pub properties: Map<String, Value>,
}

/// A leaf node wrapping a user supplied [`Producer`].
pub(crate) struct ProducerNode {
    pub name: ArcStr,
    /// Project the producer was registered in; settings are looked up from
    /// here upwards.
    pub owner: NodeId,
    pub type_id: TypeId,
    pub inner: Box<dyn Producer>,
}

impl Node {
    pub(crate) fn name(&self) -> &str {
        match self {
            Node::Project(project) => &project.name,
            Node::Producer(producer) => &producer.name,
        }
    }

    pub(crate) fn is_project(&self) -> bool {
        matches!(self, Node::Project(_))
    }

    /// The project whose settings apply to this node.
    pub(crate) fn settings_owner(&self, this: NodeId) -> NodeId {
        match self {
            Node::Project(_) => this,
            Node::Producer(producer) => producer.owner,
        }
    }
}
