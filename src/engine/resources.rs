use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::engine::Handle;
use crate::error::ResolveError;
use crate::resource::Resource;

/// A lazy, finite sequence of resources.
///
/// A `Resources` value is a concatenation of parts that are either already
/// known or still being computed. Building one never blocks; reading it
/// ([`collect`](Self::collect), [`first`](Self::first), ...) blocks until the
/// computations it depends on have finished. Reads are repeatable and cheap
/// after the first one.
///
/// Ordering between parts contributed by different edges is not meaningful.
#[derive(Clone, Default)]
pub struct Resources {
    parts: Vec<Part>,
}

#[derive(Clone)]
enum Part {
    Ready(Arc<[Resource]>),
    Pending(Handle),
    Failed(ResolveError),
}

impl Resources {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A sequence of already computed resources.
    pub fn ready(items: impl IntoIterator<Item = Resource>) -> Self {
        let items: Arc<[Resource]> = items.into_iter().collect();

        if items.is_empty() {
            return Self::empty();
        }

        Self {
            parts: vec![Part::Ready(items)],
        }
    }

    pub(crate) fn pending(handle: Handle) -> Self {
        Self {
            parts: vec![Part::Pending(handle)],
        }
    }

    /// A sequence whose every read fails with `err`.
    pub(crate) fn failed(err: ResolveError) -> Self {
        Self {
            parts: vec![Part::Failed(err)],
        }
    }

    /// Appends `other` without evaluating either side.
    #[must_use]
    pub fn chain(mut self, other: Resources) -> Self {
        self.parts.extend(other.parts);
        self
    }

    /// Concatenates several sequences without evaluating any of them.
    pub fn concat(all: impl IntoIterator<Item = Resources>) -> Self {
        all.into_iter().fold(Self::empty(), Self::chain)
    }

    /// Materializes the whole sequence. The first failure stops the read and
    /// is returned as is.
    pub fn collect(&self) -> Result<Vec<Resource>, ResolveError> {
        let mut acc = Vec::new();

        for part in &self.parts {
            match part {
                Part::Ready(items) => acc.extend(items.iter().cloned()),
                Part::Pending(handle) => acc.extend(handle.materialize()?.iter().cloned()),
                Part::Failed(err) => return Err(err.clone()),
            }
        }

        Ok(acc)
    }

    /// The first resource of the sequence, evaluating as few parts as
    /// possible.
    pub fn first(&self) -> Result<Option<Resource>, ResolveError> {
        for part in &self.parts {
            let found = match part {
                Part::Ready(items) => items.first().cloned(),
                Part::Pending(handle) => handle.materialize()?.first().cloned(),
                Part::Failed(err) => return Err(err.clone()),
            };

            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }

    pub fn is_empty(&self) -> Result<bool, ResolveError> {
        self.first().map(|first| first.is_none())
    }

    /// Materializes the sequence and keeps only the resources matching the
    /// predicate.
    pub fn collect_where<F>(&self, predicate: F) -> Result<Vec<Resource>, ResolveError>
    where
        F: Fn(&Resource) -> bool,
    {
        let mut items = self.collect()?;
        items.retain(predicate);
        Ok(items)
    }

    /// Whether every computation this sequence depends on has completed.
    /// Never blocks.
    pub fn is_settled(&self) -> bool {
        self.parts.iter().all(|part| match part {
            Part::Ready(_) | Part::Failed(_) => true,
            Part::Pending(handle) => handle.is_finished(),
        })
    }
}

impl From<Vec<Resource>> for Resources {
    fn from(items: Vec<Resource>) -> Self {
        Self::ready(items)
    }
}

impl FromIterator<Resource> for Resources {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        Self::ready(iter)
    }
}

impl Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();

        for part in &self.parts {
            match part {
                Part::Ready(items) => list.entries(items.iter()),
                Part::Pending(handle) => list.entry(handle),
                Part::Failed(err) => list.entry(err),
            };
        }

        list.finish()
    }
}
