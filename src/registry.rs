//! The table of known kinds.
//!
//! Types are plain `static` tokens, so nothing discovers them at runtime.
//! Tools that need to turn a kind name into a [`Kind`] (e.g. from a command
//! line) or to create a resource for a kind they only know by name assemble a
//! [`Registry`] at start-up.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::ResolveError;
use crate::kind::{self, Kind, Type};
use crate::resource::Resource;

/// Creates a resource of a given kind from its name.
pub type Constructor = fn(Kind, &str) -> Resource;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("type '{0}' is already registered with a different parent")]
    Conflict(&'static str),

    #[error("unknown type '{0}'")]
    Unknown(String),

    #[error("malformed kind '{0}', expected 'base' or 'base<contained>'")]
    Malformed(String),
}

/// Kind names to type tokens, and kinds to resource constructors.
#[derive(Default)]
pub struct Registry {
    types: HashMap<&'static str, &'static Type>,
    constructors: HashMap<Kind, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing the built-in types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        for ty in [
            &kind::RESOURCE,
            &kind::FILE,
            &kind::CONTAINER,
            &kind::OUTCOME,
            &kind::CLEANLINESS,
        ] {
            // Built-ins have unique names.
            let _ = registry.register_type(ty);
        }

        registry
    }

    /// Adds a type, together with all of its ancestors.
    pub fn register_type(&mut self, ty: &'static Type) -> Result<(), RegistryError> {
        let mut current = Some(ty);

        while let Some(ty) = current {
            match self.types.get(ty.name()) {
                Some(known) if known.parent() != ty.parent() => {
                    return Err(RegistryError::Conflict(ty.name()));
                }
                Some(_) => {}
                None => {
                    self.types.insert(ty.name(), ty);
                }
            }

            current = ty.parent();
        }

        Ok(())
    }

    /// Registers how resources of `kind` are created by name.
    pub fn register_constructor(
        &mut self,
        kind: Kind,
        constructor: Constructor,
    ) -> Result<(), RegistryError> {
        self.register_type(kind.base())?;
        if let Some(contained) = kind.contained() {
            self.register_type(contained)?;
        }

        self.constructors.insert(kind, constructor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&'static Type> {
        self.types.get(name).copied()
    }

    /// Parses `"base"` or `"base<contained>"` into a kind.
    pub fn parse_kind(&self, text: &str) -> Result<Kind, RegistryError> {
        let text = text.trim();
        let malformed = || RegistryError::Malformed(text.to_string());

        let (base, contained) = match text.split_once('<') {
            Some((base, rest)) => {
                let contained = rest.strip_suffix('>').ok_or_else(malformed)?;
                (base.trim(), Some(contained.trim()))
            }
            None => (text, None),
        };

        if base.is_empty() || contained.is_some_and(str::is_empty) {
            return Err(malformed());
        }

        let resolve = |name: &str| {
            self.lookup(name)
                .ok_or_else(|| RegistryError::Unknown(name.to_string()))
        };

        Ok(match contained {
            Some(contained) => Kind::container(resolve(base)?, resolve(contained)?),
            None => Kind::of(resolve(base)?),
        })
    }

    /// Creates a resource with the constructor registered for `kind`, or for
    /// the closest registered kind accepting it.
    pub fn create(&self, kind: Kind, name: &str) -> Result<Resource, ResolveError> {
        let constructor = self.constructors.get(&kind).or_else(|| {
            self.constructors
                .iter()
                .filter(|(known, _)| known.accepts(&kind))
                .max_by(|(a, _), (b, _)| {
                    specificity(a)
                        .cmp(&specificity(b))
                        .then_with(|| a.to_string().cmp(&b.to_string()))
                })
                .map(|(_, constructor)| constructor)
        });

        match constructor {
            Some(constructor) => Ok(constructor(kind, name)),
            None => Err(ResolveError::unavailable(format!(
                "a constructor for kind '{kind}'"
            ))),
        }
    }
}

/// How far down the type tree a kind sits; among kinds accepting the same
/// request, the deeper one is the closer match.
fn specificity(kind: &Kind) -> (usize, Option<usize>) {
    let depth = |ty: &Type| std::iter::successors(ty.parent(), |ty| ty.parent()).count();
    (depth(kind.base()), kind.contained().map(depth))
}
