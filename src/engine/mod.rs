//! The resolution engine.
//!
//! A [`Workspace`] owns the frozen graph together with the cache of every
//! computation started so far. The cache is keyed by `(node, query)`: the
//! first request for a key schedules the computation on the workspace's
//! pool and stores its [`Handle`], every later request for the same key gets
//! the same handle back. Nothing blocks until a caller reads a
//! [`Resources`] value.
//!
//! Projects never run user code. Their computation is a routing pass over
//! their edges (see [`Selection`]), which requests every selected edge
//! before reading any of them.

mod handle;
mod node;
mod resources;

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use indicatif::ProgressStyle;
use petgraph::Direction;
use petgraph::Graph;
use petgraph::visit::EdgeRef as _;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::NodeId;
use crate::diagnostics::{Diagnostics, Execution};
use crate::error::{Origin, ResolveError};
use crate::kind::Kind;
use crate::policy::{Policies, Policy};
use crate::properties::Setting;
use crate::query::Query;
use crate::report::{Outcome, Report};
use crate::resource::Resource;
use crate::selection::Selection;

pub(crate) use handle::Handle;
pub(crate) use node::{Node, ProducerNode, ProjectNode};
pub use resources::Resources;

/// State shared by the workspace and every computation running on its pool.
pub(crate) struct Shared {
    pub(crate) graph: Graph<Node, Policy>,
    cache: Mutex<HashMap<(NodeId, Query), Handle>>,
    diagnostics: Mutex<Diagnostics>,
    pool: rayon::ThreadPool,
}

impl Shared {
    pub(crate) fn new(graph: Graph<Node, Policy>, pool: rayon::ThreadPool) -> Self {
        Self {
            graph,
            cache: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(Diagnostics::default()),
            pool,
        }
    }

    /// The node behind an id taken from this graph's own edges or already
    /// checked with [`Shared::get`].
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.graph[id.0]
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// Outgoing edges of a node in the order they were added.
    pub(crate) fn edges(&self, id: NodeId) -> Vec<(NodeId, Policy)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id.0, Direction::Outgoing)
            .map(|edge| (edge.id(), NodeId(edge.target()), *edge.weight()))
            .collect();

        edges.sort_by_key(|(index, _, _)| *index);
        edges
            .into_iter()
            .map(|(_, target, policy)| (target, policy))
            .collect()
    }

    /// Returns the sequence of `node` for `query`, scheduling the computation
    /// if this is the first request for the pair.
    pub(crate) fn resolve(self: &Arc<Self>, node: NodeId, query: &Query) -> Resources {
        let Some(target) = self.get(node) else {
            return Resources::failed(unknown_node(node));
        };
        let is_project = target.is_project();

        // Checked before the cache so that a cycle never reaches a handle.
        if is_project && query.is_visited(node) {
            tracing::trace!(node = %target.name(), "cycle short-circuited");
            return Resources::empty();
        }

        let key = (node, query.clone());
        let mut cache = self.cache.lock().unwrap();

        if let Some(handle) = cache.get(&key) {
            tracing::debug!(node = %target.name(), kind = %query.kind(), "cache hit");
            self.diagnostics.lock().unwrap().hits += 1;
            return Resources::pending(handle.clone());
        }

        tracing::debug!(node = %target.name(), kind = %query.kind(), "cache miss");

        let query = if is_project {
            query.visiting(node)
        } else {
            query.clone()
        };

        let shared = Arc::clone(self);
        let handle = Handle::new(Box::new(move || shared.compute(node, &query)));
        cache.insert(key, handle.clone());
        drop(cache);

        let job = handle.clone();
        self.pool.spawn(move || job.run());

        Resources::pending(handle)
    }

    /// Entry point for requests coming from outside the graph.
    pub(crate) fn request(self: &Arc<Self>, node: NodeId, query: &Query) -> Resources {
        if query.is_cleanliness() {
            // Coarse: everything computed before is forgotten. Handles that
            // callers already hold keep replaying their old results.
            let mut cache = self.cache.lock().unwrap();
            tracing::warn!(entries = cache.len(), "cleanliness requested, clearing cache");
            cache.clear();
        }

        self.resolve(node, query)
    }

    fn compute(self: &Arc<Self>, node: NodeId, query: &Query) -> Result<Resources, ResolveError> {
        let start = Instant::now();

        let result = match self.node(node) {
            Node::Project(_) => Ok(Selection::new(self, node).resources(query)),
            Node::Producer(producer) => self.compute_producer(node, producer, query),
        };

        self.diagnostics.lock().unwrap().executions.push(Execution {
            node,
            kind: query.kind(),
            start,
            duration: start.elapsed(),
        });

        result
    }

    fn compute_producer(
        self: &Arc<Self>,
        node: NodeId,
        producer: &ProducerNode,
        query: &Query,
    ) -> Result<Resources, ResolveError> {
        let span = tracing::span!(
            Level::INFO,
            "compute",
            node = %producer.name,
            kind = %query.kind()
        );
        span.pb_set_message(&format!("{} ({})", producer.name, query.kind()));
        let _enter = span.enter();

        let scope = Scope {
            shared: self,
            node,
        };

        // The job must always finish, otherwise every waiter on its handle
        // would block forever, so panics are turned into errors here.
        let result = match catch_unwind(AssertUnwindSafe(|| producer.inner.provide(&scope, query))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("producer panicked: {s}")
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("producer panicked: {s}")
                } else {
                    String::from("producer panicked with unknown payload")
                };

                tracing::error!(node = %producer.name, "{msg}");
                Err(ResolveError::computation(anyhow::anyhow!(msg)))
            }
        };

        result.map_err(|err| err.or_origin(&producer.name))
    }

    /// Nearest value for `key`, walking from the project owning `node` up
    /// through its parents.
    pub(crate) fn property(&self, node: NodeId, key: &str) -> Option<&Value> {
        let mut current = Some(self.node(node).settings_owner(node));

        while let Some(id) = current {
            let Node::Project(project) = self.node(id) else {
                break;
            };

            if let Some(value) = project.properties.get(key) {
                return Some(value);
            }

            current = project.parent;
        }

        None
    }

    pub(crate) fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }
}

fn unknown_node(id: NodeId) -> ResolveError {
    ResolveError::configuration(format!("node {id} does not belong to this workspace"))
}

/// A resolved graph, ready to answer queries.
///
/// The workspace is the root owner of the resolution context: the cache,
/// the worker pool and the diagnostics all live as long as it does, and every
/// node reached through it shares them.
pub struct Workspace {
    pub(crate) shared: Arc<Shared>,
}

impl Workspace {
    /// Caller-side view of a node, used to build queries and issue them.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef {
            shared: &self.shared,
            id,
            external: true,
        }
    }

    /// Issues `query` on `node`. The computation starts right away; the
    /// returned sequence blocks only when read.
    ///
    /// A query for [`Kind::cleanliness`] first drops the whole cache.
    pub fn resources(&self, node: NodeId, query: &Query) -> Resources {
        self.shared.request(node, query)
    }

    /// Asks everything reachable from `node` to delete what it generated and
    /// waits for it to finish.
    pub fn clean(&self, node: NodeId) -> Result<Vec<Resource>, ResolveError> {
        let query = self.node(node).of(Kind::cleanliness()).using(Policies::all());
        self.resources(node, &query).collect()
    }

    /// Filterable view over the edges of a project.
    pub fn providers(&self, project: NodeId) -> Result<Selection<'_>, ResolveError> {
        match self.shared.get(project) {
            Some(Node::Project(_)) => Ok(Selection::new(&self.shared, project)),
            Some(Node::Producer(producer)) => Err(ResolveError::Configuration {
                origin: Origin::node(&producer.name),
                message: "only projects have providers".into(),
            }),
            None => Err(unknown_node(project)),
        }
    }

    /// Kinds a node declares it can provide to its dependents. For a project
    /// this is the union over its supply, expose and forward edges.
    pub fn coverage(&self, node: NodeId) -> Vec<Kind> {
        let mut kinds = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![node];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }

            match self.shared.get(id) {
                None => {}
                Some(Node::Producer(producer)) => {
                    // No declared kinds means the producer answers anything.
                    let mut declared = producer.inner.kinds();
                    if declared.is_empty() {
                        declared.push(Kind::any());
                    }

                    for kind in declared {
                        if !kinds.contains(&kind) {
                            kinds.push(kind);
                        }
                    }
                }
                Some(Node::Project(_)) => {
                    // Reverse, so that the stack visits edges in insertion order.
                    for (target, policy) in self.shared.edges(id).into_iter().rev() {
                        if policy.is_re_exposed() {
                            stack.push(target);
                        }
                    }
                }
            }
        }

        kinds
    }

    /// Issues every request first, then reads each one into its own outcome.
    /// A failing request does not prevent the others from being reported.
    pub fn resolve_all<I>(&self, requests: I) -> Report
    where
        I: IntoIterator<Item = (NodeId, Query)>,
    {
        let pending: Vec<_> = requests
            .into_iter()
            .map(|(node, query)| {
                let name = self.shared.get(node).map_or("<unknown>", Node::name);
                let label = format!("{name} [{}]", query.kind());
                (label, self.resources(node, &query))
            })
            .collect();

        let span = tracing::span!(Level::INFO, "resolving");
        span.pb_set_length(pending.len() as u64);
        span.pb_set_style(
            &ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        let _enter = span.enter();

        let entries = pending
            .into_iter()
            .map(|(label, resources)| {
                span.pb_set_message(&label);
                let outcome = Outcome::from(resources.collect());
                span.pb_inc(1);
                (label, outcome)
            })
            .collect();

        Report::new(entries)
    }

    /// A snapshot of what has been computed so far.
    pub fn diagnostics(&self) -> Diagnostics {
        self.shared.diagnostics.lock().unwrap().clone()
    }

    /// Forgets every cached computation.
    pub fn clear(&self) {
        self.shared.clear();
    }
}

/// Caller-side handle on a node: the sanctioned way to create queries and
/// to ask the node for resources.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    shared: &'a Arc<Shared>,
    id: NodeId,
    /// Requests from outside the graph may clear the cache.
    external: bool,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// `None` when the id does not belong to this workspace.
    pub fn name(&self) -> Option<&'a str> {
        self.shared.get(self.id).map(Node::name)
    }

    pub fn is_project(&self) -> bool {
        self.shared.get(self.id).is_some_and(Node::is_project)
    }

    /// Creates a query for `kind`, without name filter and without usage
    /// policies.
    pub fn of(&self, kind: Kind) -> Query {
        Query::new(kind)
    }

    pub fn resources(&self, query: &Query) -> Resources {
        if self.external {
            self.shared.request(self.id, query)
        } else {
            self.shared.resolve(self.id, query)
        }
    }
}

/// Context handed to a producer while the engine runs it.
///
/// A `Scope` cannot be constructed outside the engine, so a producer's
/// [`provide`](crate::Producer::provide) can only ever be driven by the
/// resolution context, which keeps the "one computation per query" promise
/// intact.
pub struct Scope<'a> {
    shared: &'a Arc<Shared>,
    node: NodeId,
}

impl<'a> Scope<'a> {
    /// The node being computed.
    pub fn current(&self) -> NodeId {
        self.node
    }

    pub fn name(&self) -> &'a str {
        self.shared.node(self.node).name()
    }

    /// The project this producer was registered in.
    pub fn owner(&self) -> NodeId {
        self.shared.node(self.node).settings_owner(self.node)
    }

    /// Resolves the current node again through the shared cache, typically
    /// to answer a narrow query from the result of a broader one.
    pub fn resources(&self, query: &Query) -> Resources {
        self.shared.resolve(self.node, query)
    }

    /// View of another node, resolved through the same cache.
    pub fn node(&self, id: NodeId) -> NodeRef<'a> {
        NodeRef {
            shared: self.shared,
            id,
            external: false,
        }
    }

    /// Filterable view over the edges of the owning project.
    pub fn providers(&self) -> Selection<'a> {
        Selection::new(self.shared, self.owner())
    }

    /// Reads a setting, falling back to its default.
    pub fn setting<T>(&self, setting: &Setting<T>) -> Result<T, ResolveError>
    where
        T: DeserializeOwned,
    {
        Ok(self
            .property(setting.key())?
            .unwrap_or_else(|| setting.default_value()))
    }

    /// Reads a raw property, `None` if no project up the hierarchy sets it.
    pub fn property<T>(&self, key: &str) -> Result<Option<T>, ResolveError>
    where
        T: DeserializeOwned,
    {
        let Some(value) = self.shared.property(self.node, key) else {
            return Ok(None);
        };

        T::deserialize(value)
            .map(Some)
            .map_err(|err| ResolveError::Configuration {
                origin: Origin::node(self.name()),
                message: format!("property '{key}': {err}"),
            })
    }

    /// Like [`Scope::setting`], but a missing value is a configuration error.
    pub fn require<T>(&self, key: &str) -> Result<T, ResolveError>
    where
        T: DeserializeOwned,
    {
        self.property(key)?.ok_or_else(|| ResolveError::Configuration {
            origin: Origin::node(self.name()),
            message: format!("required property '{key}' is not set"),
        })
    }
}
