//! The producer contract and a couple of ready-made producers.

use std::borrow::Cow;
#[cfg(feature = "tokio")]
use std::future::Future;

use crate::engine::{Resources, Scope};
use crate::error::ResolveError;
use crate::kind::Kind;
use crate::query::Query;
use crate::resource::Resource;

/// A leaf node of the graph, answering queries with resources.
///
/// [`provide`](Self::provide) is only ever called by the engine, at most once
/// per distinct query, and possibly from several threads for different
/// queries at the same time. It should be pure with respect to the query,
/// except for side effects the producer exists for (writing an artifact,
/// deleting it on a cleanliness request); those must tolerate being run once
/// for every distinct query that overlaps them. A producer that computes a
/// superset once can map narrower queries onto the broader one with
/// [`Scope::resources`].
///
/// Errors of any kind can be raised with `?`: anything convertible into
/// [`anyhow::Error`] becomes a computation error, stamped with this
/// producer's name.
pub trait Producer: Send + Sync + 'static {
    /// Name used in diagnostics, errors and logs.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// Kinds this producer declares it can provide.
    fn kinds(&self) -> Vec<Kind> {
        Vec::new()
    }

    fn provide(&self, scope: &Scope<'_>, query: &Query) -> Result<Resources, ResolveError>;
}

type ProduceFn = dyn Fn(&Scope<'_>, &Query) -> anyhow::Result<Vec<Resource>> + Send + Sync;

/// A producer backed by a closure. Created with [`from_fn`].
pub struct FnProducer {
    name: Cow<'static, str>,
    kinds: Vec<Kind>,
    callback: Box<ProduceFn>,
}

/// Wraps a closure as a producer of `kinds`.
///
/// The closure is only called for queries related to one of the declared
/// kinds (any query if none are declared) and for cleanliness requests. Its
/// output is narrowed to what the query accepts, name filter included.
pub fn from_fn<F>(
    name: impl Into<Cow<'static, str>>,
    kinds: impl IntoIterator<Item = Kind>,
    callback: F,
) -> FnProducer
where
    F: Fn(&Scope<'_>, &Query) -> anyhow::Result<Vec<Resource>> + Send + Sync + 'static,
{
    FnProducer {
        name: name.into(),
        kinds: kinds.into_iter().collect(),
        callback: Box::new(callback),
    }
}

/// Whether a producer declaring `kinds` has anything to do for `query`.
fn is_relevant(kinds: &[Kind], query: &Query) -> bool {
    kinds.is_empty() || query.is_cleanliness() || query.matches_any(kinds)
}

fn narrow(query: &Query, items: Vec<Resource>) -> Resources {
    items
        .into_iter()
        .filter(|item| query.accepts(&item.kind()) && query.matches_name(item.name()))
        .collect()
}

impl Producer for FnProducer {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn kinds(&self) -> Vec<Kind> {
        self.kinds.clone()
    }

    fn provide(&self, scope: &Scope<'_>, query: &Query) -> Result<Resources, ResolveError> {
        if !is_relevant(&self.kinds, query) {
            return Ok(Resources::empty());
        }

        let items = (self.callback)(scope, query)?;
        Ok(narrow(query, items))
    }
}

#[cfg(feature = "tokio")]
type AsyncFn = dyn Fn(Query) -> std::pin::Pin<Box<dyn Future<Output = anyhow::Result<Vec<Resource>>> + Send>>
    + Send
    + Sync;

/// A producer driving an async closure. Created with [`from_async`].
#[cfg(feature = "tokio")]
pub struct AsyncProducer {
    name: Cow<'static, str>,
    kinds: Vec<Kind>,
    executor: tokio::runtime::Runtime,
    callback: Box<AsyncFn>,
}

/// Wraps an async closure as a producer of `kinds`.
///
/// Useful for producers talking to the network or other async-only APIs.
/// The producer owns a single-threaded Tokio runtime and blocks on the
/// returned future; filtering follows the same rules as [`from_fn`].
///
/// # Example
///
/// ```rust,ignore
/// let index = tsumiki::producer::from_async("index", [Kind::of(&INDEX)], |query| async move {
///     let body = reqwest::get("https://example.com/index.json").await?.text().await?;
///     Ok(vec![Resource::named(query.kind(), "index").with_data(body)])
/// })?;
/// ```
#[cfg(feature = "tokio")]
pub fn from_async<F, Fut>(
    name: impl Into<Cow<'static, str>>,
    kinds: impl IntoIterator<Item = Kind>,
    callback: F,
) -> std::io::Result<AsyncProducer>
where
    F: Fn(Query) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<Resource>>> + Send + 'static,
{
    let executor = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    Ok(AsyncProducer {
        name: name.into(),
        kinds: kinds.into_iter().collect(),
        executor,
        callback: Box::new(move |query| Box::pin(callback(query))),
    })
}

#[cfg(feature = "tokio")]
impl Producer for AsyncProducer {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn kinds(&self) -> Vec<Kind> {
        self.kinds.clone()
    }

    fn provide(&self, _: &Scope<'_>, query: &Query) -> Result<Resources, ResolveError> {
        if !is_relevant(&self.kinds, query) {
            return Ok(Resources::empty());
        }

        let items = self.executor.block_on((self.callback)(query.clone()))?;
        Ok(narrow(query, items))
    }
}
