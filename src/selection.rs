use std::any::TypeId;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::core::NodeId;
use crate::engine::{Node, Resources, Shared};
use crate::policy::{Policies, Policy};
use crate::producer::Producer;
use crate::query::Query;

type Predicate<'a> = Box<dyn Fn(&Edge<'_>) -> bool + 'a>;
type Hook<'a> = Box<dyn Fn(&Edge<'_>, &Query) + 'a>;

/// One outgoing edge of a project, as seen by a [`Selection`].
#[derive(Clone, Copy)]
pub struct Edge<'a> {
    shared: &'a Shared,
    target: NodeId,
    policy: Policy,
}

impl<'a> Edge<'a> {
    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn name(&self) -> &'a str {
        self.shared.node(self.target).name()
    }

    pub fn is_project(&self) -> bool {
        self.shared.node(self.target).is_project()
    }

    /// Whether the target is a producer of concrete type `P`.
    pub fn is<P: Producer>(&self) -> bool {
        match self.shared.node(self.target) {
            Node::Producer(producer) => producer.type_id == TypeId::of::<P>(),
            Node::Project(_) => false,
        }
    }

    /// Rewrites `query` for this edge.
    ///
    /// A sub-project is asked for what it offers its own dependents, see
    /// [`Policies::crossing_project`]. A plain producer does not interpret
    /// policies and gets none.
    pub fn forward(&self, query: &Query) -> Query {
        if self.is_project() {
            query.forwarded(query.policies().crossing_project())
        } else {
            query.forwarded(Policies::empty())
        }
    }
}

impl Debug for Edge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("target", &self.target)
            .field("name", &self.name())
            .field("policy", &self.policy)
            .finish()
    }
}

/// A filterable, chainable view over the edges of one project.
///
/// Projects route queries through an unfiltered selection. Producers can
/// build their own, differently filtered view of the same edges through
/// [`Scope::providers`](crate::Scope::providers), e.g. every supplier except
/// themselves:
///
/// ```rust,ignore
/// let others = scope
///     .providers()
///     .without(scope.current())
///     .resources(&query.using(Policy::Supply));
/// ```
pub struct Selection<'a> {
    shared: &'a Arc<Shared>,
    project: NodeId,
    filters: Vec<Predicate<'a>>,
    hooks: Vec<Hook<'a>>,
}

impl<'a> Selection<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>, project: NodeId) -> Self {
        Self {
            shared,
            project,
            filters: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// The project whose edges are viewed.
    pub fn project(&self) -> NodeId {
        self.project
    }

    /// Keeps only the edges matching `predicate`.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Edge<'_>) -> bool + 'a,
    {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Drops every edge leading to `node`.
    #[must_use]
    pub fn without(self, node: NodeId) -> Self {
        self.filter(move |edge| edge.target() != node)
    }

    /// Drops every edge leading to a producer of concrete type `P`.
    #[must_use]
    pub fn without_type<P: Producer>(self) -> Self {
        self.filter(|edge| !edge.is::<P>())
    }

    /// Registers a callback invoked for every edge right before it is
    /// queried, with the query as rewritten for that edge.
    #[must_use]
    pub fn on_before_use<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Edge<'_>, &Query) + 'a,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Edges whose policy is in `policies` and which pass every filter, in
    /// the order they were added to the project.
    pub fn select(&self, policies: impl Into<Policies>) -> Vec<Edge<'a>> {
        let policies = policies.into();

        self.shared
            .edges(self.project)
            .into_iter()
            .map(|(target, policy)| Edge {
                shared: self.shared.as_ref(),
                target,
                policy,
            })
            .filter(|edge| policies.contains(edge.policy))
            .filter(|edge| self.filters.iter().all(|f| f(edge)))
            .collect()
    }

    /// Queries every selected edge and concatenates the results.
    ///
    /// All edges are requested before anything is read, so independent
    /// branches run concurrently; edges that are not selected are never
    /// requested at all.
    pub fn resources(&self, query: &Query) -> Resources {
        let pending: Vec<_> = self
            .select(query.policies())
            .into_iter()
            .map(|edge| {
                let forwarded = edge.forward(query);

                for hook in &self.hooks {
                    hook(&edge, &forwarded);
                }

                self.shared.resolve(edge.target, &forwarded)
            })
            .collect();

        Resources::concat(pending)
    }
}

impl Debug for Selection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("project", &self.project)
            .field("filters", &self.filters.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
