#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
mod core;
pub mod diagnostics;
mod engine;
mod error;
pub mod kind;
mod options;
mod policy;
pub mod producer;
mod properties;
mod query;
mod registry;
mod report;
mod resource;
mod selection;
mod utils;

pub use crate::blueprint::{Blueprint, ProjectDef};
pub use crate::core::NodeId;
pub use crate::diagnostics::{Diagnostics, Execution};
pub use crate::engine::{NodeRef, Resources, Scope, Workspace};
pub use crate::error::{BlueprintError, Cause, Origin, ResolveError};
pub use crate::kind::{Kind, Type};
pub use crate::options::Options;
pub use crate::policy::{Policies, Policy};
pub use crate::producer::Producer;
pub use crate::properties::Setting;
pub use crate::query::Query;
pub use crate::registry::{Constructor, Registry, RegistryError};
pub use crate::report::{Outcome, Report};
pub use crate::resource::Resource;
pub use crate::selection::{Edge, Selection};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
