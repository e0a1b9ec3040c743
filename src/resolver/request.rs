// src/resolver/request.rs

//! Solver request assembled for one attempt

use crate::error::Result;
use crate::packages::{PackageRecord, SolverRecord};
use crate::spec::MatchSpec;
use std::fmt;

/// What the classifier decided for one package name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// No directive for this name
    Skipped,
    /// Request the spec and prefer the installed record
    Kept { spec: MatchSpec, record: PackageRecord },
    /// Prefer the installed record if the name ends up in the solution
    Locked(PackageRecord),
    /// The installed record is mandatory if the name is chosen at all
    Pinned(PackageRecord),
    /// Install a package matching this spec
    Spec(MatchSpec),
    /// Restrict the name if it is chosen, without requesting it
    Constraint(MatchSpec),
}

/// The four lists handed to the solver backend
///
/// A name appears in at most one of `locked` and `pinned`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolveRequest {
    pub specs: Vec<MatchSpec>,
    pub constraints: Vec<MatchSpec>,
    pub locked: Vec<SolverRecord>,
    pub pinned: Vec<SolverRecord>,
}

impl SolveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the directives of one disposition
    pub fn apply(&mut self, disposition: Disposition) -> Result<()> {
        match disposition {
            Disposition::Skipped => {}
            Disposition::Kept { spec, record } => {
                self.specs.push(spec);
                self.lock(&record)?;
            }
            Disposition::Locked(record) => self.lock(&record)?,
            Disposition::Pinned(record) => {
                self.locked.retain(|r| r.name != record.name);
                if !self.is_pinned(&record.name) {
                    self.pinned.push(SolverRecord::try_from(&record)?);
                }
            }
            Disposition::Spec(spec) => self.specs.push(spec),
            Disposition::Constraint(spec) => self.constraints.push(spec),
        }
        Ok(())
    }

    fn lock(&mut self, record: &PackageRecord) -> Result<()> {
        if !self.is_pinned(&record.name) && !self.is_locked(&record.name) {
            self.locked.push(SolverRecord::try_from(record)?);
        }
        Ok(())
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.locked.iter().any(|r| r.name == name)
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pinned.iter().any(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
            && self.constraints.is_empty()
            && self.locked.is_empty()
            && self.pinned.is_empty()
    }
}

impl fmt::Display for SolveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "specs:")?;
        for spec in &self.specs {
            writeln!(f, "  {}", spec)?;
        }
        writeln!(f, "constraints:")?;
        for spec in &self.constraints {
            writeln!(f, "  {}", spec)?;
        }
        writeln!(f, "locked:")?;
        for record in &self.locked {
            writeln!(f, "  {}-{}-{}", record.name, record.version, record.build)?;
        }
        writeln!(f, "pinned:")?;
        for record in &self.pinned {
            writeln!(f, "  {}-{}-{}", record.name, record.version, record.build)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_replaces_lock() {
        let record = PackageRecord::new("zlib", "1.3.1", "h0_0");
        let mut request = SolveRequest::new();
        request.apply(Disposition::Locked(record.clone())).unwrap();
        request.apply(Disposition::Pinned(record.clone())).unwrap();
        request.apply(Disposition::Locked(record)).unwrap();

        assert!(request.is_pinned("zlib"));
        assert!(!request.is_locked("zlib"));
        assert_eq!(request.pinned.len(), 1);
    }

    #[test]
    fn test_kept_adds_spec_and_lock() {
        let record = PackageRecord::new("numpy", "1.26.4", "py312_0");
        let spec = MatchSpec::parse("numpy 1.26.*").unwrap();
        let mut request = SolveRequest::new();
        request
            .apply(Disposition::Kept {
                spec: spec.clone(),
                record,
            })
            .unwrap();
        request.apply(Disposition::Skipped).unwrap();

        assert_eq!(request.specs, vec![spec]);
        assert!(request.is_locked("numpy"));
        assert!(request.constraints.is_empty());
    }

    #[test]
    fn test_display_lists_sections() {
        let mut request = SolveRequest::new();
        request
            .apply(Disposition::Constraint(MatchSpec::parse("python 3.9.*").unwrap()))
            .unwrap();
        let text = request.to_string();
        assert!(text.contains("constraints:\n  python 3.9.*\n"));
        assert!(text.starts_with("specs:\n"));
    }
}
