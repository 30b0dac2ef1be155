use std::any::Any;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};

use crate::core::{ArcStr, Dynamic};
use crate::kind::Kind;

/// A typed value produced by a node.
///
/// Resources are built by value and frozen once handed to the engine; the
/// builder methods consume `self`, so a fault flag can only be set by the
/// producer that created the resource, before anyone else can observe it.
///
/// Two resources are equal when their kind, name and path are equal. The
/// payload, timestamp and fault flag are not part of the identity.
#[derive(Clone)]
pub struct Resource {
    kind: Kind,
    name: Option<ArcStr>,
    path: Option<Utf8PathBuf>,
    modified: SystemTime,
    data: Option<Dynamic>,
    fault: Option<ArcStr>,
}

impl Resource {
    /// An anonymous resource of `kind`, without a meaningful timestamp.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            name: None,
            path: None,
            modified: SystemTime::UNIX_EPOCH,
            data: None,
            fault: None,
        }
    }

    pub fn named(kind: Kind, name: impl AsRef<str>) -> Self {
        Self::new(kind).with_name(name)
    }

    /// A resource identified by a path. The file name becomes the resource
    /// name and, if the file exists, its modification time is recorded.
    pub fn file(kind: Kind, path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let modified = std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut resource = Self::new(kind).modified_at(modified);
        if let Some(name) = path.file_name() {
            resource.name = Some(name.into());
        }
        resource.path = Some(path);
        resource
    }

    #[must_use]
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(name.as_ref().into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn modified_at(mut self, modified: SystemTime) -> Self {
        self.modified = modified;
        self
    }

    /// Attaches an arbitrary payload, retrievable with [`Resource::data`].
    #[must_use]
    pub fn with_data<T>(mut self, data: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.data = Some(Arc::new(data));
        self
    }

    /// Marks the resource as representing a failure, e.g. a failed test run.
    /// This is data, not an engine error: the request that produced it still
    /// succeeds.
    #[must_use]
    pub fn faulty(mut self, reason: impl AsRef<str>) -> Self {
        self.fault = Some(reason.as_ref().into());
        self
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Last modification time, `UNIX_EPOCH` when not applicable.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Downcasts the payload to `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn is_faulty(&self) -> bool {
        self.fault.is_some()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name && self.path == other.path
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.name.hash(state);
        self.path.hash(state);
    }
}

impl Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Resource");
        debug.field("kind", &self.kind);

        if let Some(name) = &self.name {
            debug.field("name", name);
        }
        if let Some(path) = &self.path {
            debug.field("path", path);
        }
        if let Some(fault) = &self.fault {
            debug.field("fault", fault);
        }

        debug.finish_non_exhaustive()
    }
}
