use std::fmt::{self, Debug, Display};

/// How a project uses one of its edges.
///
/// | Policy    | Used by the project itself | Re-exposed to dependents |
/// |-----------|----------------------------|--------------------------|
/// | `Supply`  | no, it is the own output   | yes                      |
/// | `Consume` | yes                        | no                       |
/// | `Expose`  | yes                        | yes                      |
/// | `Forward` | no                         | yes                      |
/// | `Runtime` | only at execution time     | no                       |
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Policy {
    Supply,
    Consume,
    Expose,
    Forward,
    Runtime,
}

impl Policy {
    pub const ALL: [Policy; 5] = [
        Policy::Supply,
        Policy::Consume,
        Policy::Expose,
        Policy::Forward,
        Policy::Runtime,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Whether the owning project reads this edge for its own work.
    pub fn is_used_internally(self) -> bool {
        matches!(self, Policy::Consume | Policy::Expose | Policy::Runtime)
    }

    /// Whether the edge contributes to what the project offers its dependents.
    pub fn is_re_exposed(self) -> bool {
        matches!(self, Policy::Supply | Policy::Expose | Policy::Forward)
    }

    fn name(self) -> &'static str {
        match self {
            Policy::Supply => "supply",
            Policy::Consume => "consume",
            Policy::Expose => "expose",
            Policy::Forward => "forward",
            Policy::Runtime => "runtime",
        }
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A small, copyable set of [`Policy`] values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Policies(u8);

impl Policies {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self::from_iter(Policy::ALL)
    }

    /// Everything a project offers to its dependents.
    pub fn re_exposed() -> Self {
        Self::from_iter([Policy::Supply, Policy::Expose, Policy::Forward])
    }

    pub const fn contains(self, policy: Policy) -> bool {
        self.0 & policy.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn with(self, policy: Policy) -> Self {
        Self(self.0 | policy.bit())
    }

    #[must_use]
    pub const fn without(self, policy: Policy) -> Self {
        Self(self.0 & !policy.bit())
    }

    pub fn iter(self) -> impl Iterator<Item = Policy> {
        Policy::ALL.into_iter().filter(move |p| self.contains(*p))
    }

    /// Rewrites a policy set for a query crossing into a sub-project.
    ///
    /// Whatever a sub-project is asked for by a project that uses it, it
    /// answers with what it would offer its own dependents: `Consume` is
    /// dropped and `Supply` with `Expose` are added. Sets without `Consume`
    /// or `Expose` pass unchanged.
    #[must_use]
    pub fn crossing_project(self) -> Self {
        if self.contains(Policy::Consume) || self.contains(Policy::Expose) {
            self.without(Policy::Consume)
                .with(Policy::Supply)
                .with(Policy::Expose)
        } else {
            self
        }
    }
}

impl FromIterator<Policy> for Policies {
    fn from_iter<I: IntoIterator<Item = Policy>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl From<Policy> for Policies {
    fn from(policy: Policy) -> Self {
        Self::empty().with(policy)
    }
}

impl<const N: usize> From<[Policy; N]> for Policies {
    fn from(policies: [Policy; N]) -> Self {
        Self::from_iter(policies)
    }
}

impl Debug for Policies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
