use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::core::{ArcStr, NodeId};
use crate::kind::Kind;
use crate::policy::{Policies, Policy};

/// A request for resources: what kind, optionally which name, and under
/// which usage policies.
///
/// Queries are immutable. Every narrowing method returns a new value, so a
/// query can be shared freely between concurrent resolution paths.
///
/// Besides the request itself a query carries the list of projects already
/// visited while resolving it. That list is bookkeeping only: it is not part
/// of equality or hashing, which is why two queries for the same thing hit
/// the same cache entry no matter how they were reached.
///
/// Queries are created through [`NodeRef::of`](crate::NodeRef::of).
#[derive(Clone)]
pub struct Query {
    kind: Kind,
    name: Option<ArcStr>,
    policies: Policies,
    visited: Visited,
}

impl Query {
    pub(crate) fn new(kind: Kind) -> Self {
        Self {
            kind,
            name: None,
            policies: Policies::empty(),
            visited: Visited::default(),
        }
    }

    /// Restricts the query to resources with this name.
    #[must_use]
    pub fn with_name(&self, name: impl AsRef<str>) -> Self {
        Self {
            name: Some(name.as_ref().into()),
            ..self.clone()
        }
    }

    /// Replaces the usage policies.
    #[must_use]
    pub fn using(&self, policies: impl Into<Policies>) -> Self {
        Self {
            policies: policies.into(),
            ..self.clone()
        }
    }

    /// Asks for everything a project offers its dependents.
    #[must_use]
    pub fn exposed(&self) -> Self {
        self.using(Policies::re_exposed())
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn policies(&self) -> Policies {
        self.policies
    }

    pub fn uses(&self, policy: Policy) -> bool {
        self.policies.contains(policy)
    }

    /// A producer offering `kind` can answer this query.
    pub fn accepts(&self, kind: &Kind) -> bool {
        self.kind.accepts(kind)
    }

    /// A producer offering `kind` covers everything this query asks for,
    /// i.e. the declared kind is at least as broad as the requested one.
    pub fn requires(&self, kind: &Kind) -> bool {
        kind.accepts(&self.kind)
    }

    /// Whether any of the declared kinds is related to the requested kind in
    /// either direction.
    pub fn matches_any<'a>(&self, kinds: impl IntoIterator<Item = &'a Kind>) -> bool {
        kinds
            .into_iter()
            .any(|kind| self.accepts(kind) || self.requires(kind))
    }

    /// Whether a resource name passes the name filter.
    pub fn matches_name(&self, name: Option<&str>) -> bool {
        match &self.name {
            Some(wanted) => name == Some(wanted.as_ref()),
            None => true,
        }
    }

    pub fn is_cleanliness(&self) -> bool {
        self.kind.is_cleanliness()
    }

    /// Whether `node` has already been entered while resolving this query.
    pub fn is_visited(&self, node: NodeId) -> bool {
        self.visited.contains(node)
    }

    /// Returns a copy of the query with `node` appended to the visited list.
    /// The receiver is left untouched, so sibling branches never observe
    /// each other's visits.
    #[must_use]
    pub(crate) fn visiting(&self, node: NodeId) -> Self {
        Self {
            visited: self.visited.push(node),
            ..self.clone()
        }
    }

    /// Same request with a different policy set, keeping the visited list.
    /// Used when forwarding within a single resolution chain.
    #[must_use]
    pub(crate) fn forwarded(&self, policies: Policies) -> Self {
        Self {
            policies,
            ..self.clone()
        }
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name && self.policies == other.policies
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.name.hash(state);
        self.policies.hash(state);
    }
}

impl Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Query");
        debug.field("kind", &self.kind);

        if let Some(name) = &self.name {
            debug.field("name", name);
        }

        debug
            .field("policies", &self.policies)
            .field("visited", &self.visited.len())
            .finish()
    }
}

/// Persistent, append-only list of visited nodes. Appending shares the tail,
/// so copies are cheap and never alias a mutable state.
#[derive(Clone, Default)]
struct Visited(Option<Arc<Link>>);

struct Link {
    node: NodeId,
    next: Option<Arc<Link>>,
}

impl Visited {
    fn push(&self, node: NodeId) -> Self {
        Self(Some(Arc::new(Link {
            node,
            next: self.0.clone(),
        })))
    }

    fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.0.as_deref(), |link| link.next.as_deref()).map(|link| link.node)
    }

    fn contains(&self, node: NodeId) -> bool {
        self.iter().any(|visited| visited == node)
    }

    fn len(&self) -> usize {
        self.iter().count()
    }
}
