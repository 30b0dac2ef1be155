use std::any::TypeId;
use std::borrow::Cow;
use std::sync::Arc;

use petgraph::Graph;
use serde_json::{Map, Value};

use crate::Workspace;
use crate::core::{ArcStr, NodeId};
use crate::engine::{Node, ProducerNode, ProjectNode, Shared};
use crate::error::BlueprintError;
use crate::options::Options;
use crate::policy::Policy;
use crate::producer::Producer;

/// The blueprint of a resolution graph.
///
/// `Blueprint` is used to declare projects, the producers living in them and
/// the attributed edges between them. Edges can only be added here: once the
/// blueprint is turned into a [`Workspace`], the graph is frozen and every
/// node's routing is fully determined by its edges.
///
/// # Example
///
/// ```rust
/// use tsumiki::{Blueprint, Kind, Policy, Resource, producer};
///
/// let mut config = Blueprint::new();
///
/// let app = config.project("app").register()?;
/// let sources = config.producer(
///     app,
///     producer::from_fn("sources", [Kind::any()], |_, query| {
///         Ok(vec![Resource::named(query.kind(), "main.rs")])
///     }),
/// )?;
/// config.edge(app, sources, Policy::Supply)?;
///
/// let workspace = config.finish()?;
/// let query = workspace.node(app).of(Kind::any()).using(Policy::Supply);
/// let found = workspace.resources(app, &query).collect()?;
///
/// assert_eq!(found.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Blueprint {
    pub(crate) graph: Graph<Node, Policy>,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    /// Starts declaring a project.
    pub fn project(&mut self, name: impl Into<Cow<'static, str>>) -> ProjectDef<'_> {
        ProjectDef {
            blueprint: self,
            name: name.into(),
            parent: None,
            properties: Map::new(),
        }
    }

    /// Registers `producer` as a node living in the project `owner`.
    pub fn producer<P>(&mut self, owner: NodeId, producer: P) -> Result<NodeId, BlueprintError>
    where
        P: Producer,
    {
        self.expect_project(owner)?;

        let name: ArcStr = producer.name().as_ref().into();
        let index = self.graph.add_node(Node::Producer(ProducerNode {
            name,
            owner,
            type_id: TypeId::of::<P>(),
            inner: Box::new(producer),
        }));

        Ok(NodeId(index))
    }

    /// Adds an edge from the project `from` to `to`. Edges to the project
    /// itself or to any of its dependents are allowed.
    pub fn edge(&mut self, from: NodeId, to: NodeId, policy: Policy) -> Result<(), BlueprintError> {
        self.expect_project(from)?;
        if self.graph.node_weight(to.0).is_none() {
            return Err(BlueprintError::UnknownNode(to));
        }

        self.graph.add_edge(from.0, to.0, policy);
        Ok(())
    }

    /// Merges the properties of a JSON object into a project, overwriting
    /// keys that are already set.
    pub fn properties_from_json(&mut self, project: NodeId, json: &str) -> Result<(), BlueprintError> {
        let value: Value = serde_json::from_str(json)?;

        match self.graph.node_weight_mut(project.0) {
            Some(Node::Project(node)) => match value {
                Value::Object(entries) => {
                    node.properties.extend(entries);
                    Ok(())
                }
                _ => Err(BlueprintError::PropertiesShape(node.name.to_string())),
            },
            Some(Node::Producer(node)) => Err(BlueprintError::NotAProject(node.name.to_string())),
            None => Err(BlueprintError::UnknownNode(project)),
        }
    }

    /// Freezes the graph into a workspace with default [`Options`].
    pub fn finish(self) -> Result<Workspace, BlueprintError> {
        self.finish_with(Options::default())
    }

    /// Freezes the graph into a workspace, building its worker pool from
    /// `options`.
    pub fn finish_with(self, options: Options) -> Result<Workspace, BlueprintError> {
        let pool = options.build_pool()?;

        tracing::debug!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            threads = pool.current_num_threads(),
            "workspace ready"
        );

        Ok(Workspace {
            shared: Arc::new(Shared::new(self.graph, pool)),
        })
    }

    fn expect_project(&self, id: NodeId) -> Result<(), BlueprintError> {
        match self.graph.node_weight(id.0) {
            Some(node) if node.is_project() => Ok(()),
            Some(node) => Err(BlueprintError::NotAProject(node.name().to_string())),
            None => Err(BlueprintError::UnknownNode(id)),
        }
    }
}

impl Default for Blueprint {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let name = node.name().replace('"', "\\\""); // Simple escape

            if node.is_project() {
                writeln!(f, "    {}[[\"{}\"]]", index.index(), name)?;
            } else {
                writeln!(f, "    {}[\"{}\"]", index.index(), name)?;
            }
        }

        for edge in self.graph.edge_indices() {
            let (source, target) = self.graph.edge_endpoints(edge).unwrap();
            writeln!(
                f,
                "    {} -- \"{}\" --> {}",
                source.index(),
                self.graph[edge],
                target.index()
            )?;
        }

        Ok(())
    }
}

/// Declaration of a project, finished with [`ProjectDef::register`].
pub struct ProjectDef<'a> {
    blueprint: &'a mut Blueprint,
    name: Cow<'static, str>,
    parent: Option<NodeId>,
    properties: Map<String, Value>,
}

impl<'a> ProjectDef<'a> {
    /// Sets the project settings are inherited from.
    pub fn parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets a property on the project.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn register(self) -> Result<NodeId, BlueprintError> {
        if let Some(parent) = self.parent {
            self.blueprint.expect_project(parent)?;
        }

        let index = self.blueprint.graph.add_node(Node::Project(ProjectNode {
            name: self.name.as_ref().into(),
            parent: self.parent,
            properties: self.properties,
        }));

        Ok(NodeId(index))
    }
}
