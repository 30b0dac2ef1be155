use std::fmt::{self, Display};

use console::style;

use crate::error::ResolveError;
use crate::resource::Resource;

/// What became of one top-level request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Resolved, and nothing in the result is marked faulty.
    Passed(Vec<Resource>),
    /// Resolved, but at least one resource carries a fault flag.
    Faulty(Vec<Resource>),
    /// The engine could not compute the request.
    Failed(ResolveError),
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed(_))
    }

    pub fn resources(&self) -> &[Resource] {
        match self {
            Outcome::Passed(items) | Outcome::Faulty(items) => items,
            Outcome::Failed(_) => &[],
        }
    }
}

impl From<Result<Vec<Resource>, ResolveError>> for Outcome {
    fn from(result: Result<Vec<Resource>, ResolveError>) -> Self {
        match result {
            Ok(items) if items.iter().any(Resource::is_faulty) => Outcome::Faulty(items),
            Ok(items) => Outcome::Passed(items),
            Err(err) => Outcome::Failed(err),
        }
    }
}

/// Outcomes of a batch of requests, in the order they were issued.
#[derive(Debug, Clone)]
pub struct Report {
    entries: Vec<(String, Outcome)>,
}

impl Report {
    pub(crate) fn new(entries: Vec<(String, Outcome)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, Outcome)] {
        &self.entries
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|(_, outcome)| outcome.is_passed())
    }

    /// `0` when every request passed, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ResolveError)> {
        self.entries.iter().filter_map(|(label, outcome)| match outcome {
            Outcome::Failed(err) => Some((label.as_str(), err)),
            _ => None,
        })
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, outcome) in &self.entries {
            match outcome {
                Outcome::Passed(items) => {
                    writeln!(f, "{} {label} ({} resources)", style("ok").green(), items.len())?;
                }
                Outcome::Faulty(items) => {
                    writeln!(f, "{} {label}", style("faulty").yellow())?;
                    for item in items.iter().filter(|item| item.is_faulty()) {
                        let name = item.name().unwrap_or("<unnamed>");
                        writeln!(f, "    {name}: {}", item.fault().unwrap_or_default())?;
                    }
                }
                Outcome::Failed(err) => {
                    writeln!(f, "{} {label}", style("failed").red().bold())?;
                    writeln!(
                        f,
                        "    {} error in {}: {err}",
                        err.class(),
                        style(err.origin()).cyan()
                    )?;
                }
            }
        }

        Ok(())
    }
}
