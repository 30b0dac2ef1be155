//! Type tokens and the covariant kind descriptors built from them.
//!
//! A [`Type`] is a token declared once as a `static` item. Types form a
//! single-inheritance tree rooted at [`RESOURCE`], which is what gives the
//! "is assignable to" relation its meaning. A [`Kind`] pairs a base type with
//! an optional contained type, for container-shaped resources.
//!
//! ```rust
//! use tsumiki::kind::{Kind, Type, CONTAINER, RESOURCE};
//!
//! static SOURCE: Type = Type::new("source", &RESOURCE);
//! static RUST_SOURCE: Type = Type::new("rust-source", &SOURCE);
//!
//! let wanted = Kind::container(&CONTAINER, &SOURCE);
//! let offered = Kind::container(&CONTAINER, &RUST_SOURCE);
//!
//! assert!(wanted.accepts(&offered));
//! assert!(!offered.accepts(&wanted));
//! ```

use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

/// Root of the type tree. Every other type is assignable to it.
pub static RESOURCE: Type = Type::root("resource");

/// A resource identified by a location on disk.
pub static FILE: Type = Type::new("file", &RESOURCE);

/// A resource wrapping other resources, used with a contained type.
pub static CONTAINER: Type = Type::new("container", &RESOURCE);

/// The result of some check, such as a test run. Usually carries a fault
/// flag when the check did not pass.
pub static OUTCOME: Type = Type::new("outcome", &RESOURCE);

/// Reserved type. Requesting it asks producers to delete whatever they have
/// generated instead of returning data.
pub static CLEANLINESS: Type = Type::new("cleanliness", &RESOURCE);

/// A statically declared resource type.
///
/// Identity is the type name; a [`Registry`](crate::Registry) refuses two
/// different tokens sharing a name.
pub struct Type {
    name: &'static str,
    parent: Option<&'static Type>,
}

impl Type {
    /// Declares a type deriving from `parent`.
    pub const fn new(name: &'static str, parent: &'static Type) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static Type> {
        self.parent
    }

    /// Returns `true` if a value of this type can stand in for `target`,
    /// i.e. `target` is this type or one of its ancestors.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }

        let mut current = self.parent;
        while let Some(ty) = current {
            if ty == target {
                return true;
            }
            current = ty.parent;
        }

        false
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.name)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Describes what a query asks for or what a producer offers.
///
/// A descriptor `A` accepts `B` when `B`'s base type is assignable to `A`'s,
/// and, if `A` constrains the contained type, `B`'s contained type is
/// assignable to it as well.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Kind {
    base: &'static Type,
    contained: Option<&'static Type>,
}

impl Kind {
    /// A plain kind without a contained type.
    pub const fn of(base: &'static Type) -> Self {
        Self {
            base,
            contained: None,
        }
    }

    /// A container-shaped kind holding values of `contained`.
    pub const fn container(base: &'static Type, contained: &'static Type) -> Self {
        Self {
            base,
            contained: Some(contained),
        }
    }

    /// The most permissive kind, accepting every other kind.
    pub fn any() -> Self {
        Self::of(&RESOURCE)
    }

    /// The reserved cleanup kind.
    pub fn cleanliness() -> Self {
        Self::of(&CLEANLINESS)
    }

    pub fn base(&self) -> &'static Type {
        self.base
    }

    pub fn contained(&self) -> Option<&'static Type> {
        self.contained
    }

    /// Covariant check: can a resource described by `other` satisfy a
    /// request for `self`?
    pub fn accepts(&self, other: &Kind) -> bool {
        if !other.base.is_assignable_to(self.base) {
            return false;
        }

        match (self.contained, other.contained) {
            (None, _) => true,
            (Some(wanted), Some(offered)) => offered.is_assignable_to(wanted),
            (Some(_), None) => false,
        }
    }

    pub fn is_cleanliness(&self) -> bool {
        self.base == &CLEANLINESS
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.contained {
            Some(contained) => write!(f, "{}<{}>", self.base, contained),
            None => write!(f, "{}", self.base),
        }
    }
}

impl Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({self})")
    }
}
