use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use thiserror::Error;

use crate::core::{ArcStr, NodeId};

/// The node an error originated from, if known.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Origin(Option<ArcStr>);

impl Origin {
    pub fn unknown() -> Self {
        Self(None)
    }

    pub fn node(name: impl AsRef<str>) -> Self {
        Self(Some(name.as_ref().into()))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => f.write_str(name),
            None => f.write_str("<unknown>"),
        }
    }
}

impl Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Origin({self})")
    }
}

/// Shared underlying cause of a failed computation. Cloning is cheap, which
/// lets a single failure be replayed to every caller waiting on it.
#[derive(Clone)]
pub struct Cause(pub(crate) Arc<anyhow::Error>);

impl Cause {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&*self.0, f)
    }
}

impl Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// The single error type of the engine.
///
/// Every variant carries the node it came from, so a failure reported at the
/// top of a deep resolution still names the producer responsible. The value
/// is passed through composite nodes as-is, never wrapped again.
#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    /// The requested resource cannot be produced.
    #[error("'{origin}' cannot provide {what}")]
    Unavailable { origin: Origin, what: String },

    /// The graph or its settings are malformed.
    #[error("'{origin}' is misconfigured: {message}")]
    Configuration { origin: Origin, message: String },

    /// A producer failed while computing.
    #[error("'{origin}' failed: {cause}")]
    Computation {
        origin: Origin,
        #[source]
        cause: Cause,
    },
}

impl ResolveError {
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable {
            origin: Origin::unknown(),
            what: what.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            origin: Origin::unknown(),
            message: message.into(),
        }
    }

    pub fn computation(cause: impl Into<anyhow::Error>) -> Self {
        Self::Computation {
            origin: Origin::unknown(),
            cause: Cause::new(cause),
        }
    }

    pub fn origin(&self) -> &Origin {
        match self {
            Self::Unavailable { origin, .. }
            | Self::Configuration { origin, .. }
            | Self::Computation { origin, .. } => origin,
        }
    }

    /// Short label of the error class, used in reports.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Configuration { .. } => "configuration",
            Self::Computation { .. } => "computation",
        }
    }

    /// Stamps the origin unless one is already known.
    #[must_use]
    pub(crate) fn or_origin(mut self, name: &str) -> Self {
        let origin = match &mut self {
            Self::Unavailable { origin, .. }
            | Self::Configuration { origin, .. }
            | Self::Computation { origin, .. } => origin,
        };

        if !origin.is_known() {
            *origin = Origin::node(name);
        }

        self
    }
}

impl From<anyhow::Error> for ResolveError {
    fn from(err: anyhow::Error) -> Self {
        // A resolve error that travelled through `anyhow` keeps its identity.
        match err.downcast::<ResolveError>() {
            Ok(err) => err,
            Err(err) => Self::computation(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("node {0} is not a project and cannot own edges")]
    NotAProject(String),

    #[error("node {0} does not belong to this blueprint")]
    UnknownNode(NodeId),

    #[error("properties for '{0}' must be a JSON object")]
    PropertiesShape(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("couldn't build the worker pool:\n{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl From<BlueprintError> for ResolveError {
    fn from(err: BlueprintError) -> Self {
        Self::configuration(err.to_string())
    }
}
