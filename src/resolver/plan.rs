// src/resolver/plan.rs

//! Resolution result data structures

use crate::packages::PackageRecord;
use crate::spec::MatchSpec;
use indexmap::IndexMap;
use serde::Serialize;

/// Result of a successful solve
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Final environment, one record per name
    pub records: Vec<PackageRecord>,
    /// History specs relaxed on the way (name → spec actually used)
    pub neutered: IndexMap<String, MatchSpec>,
    /// Pins that applied to this solve
    pub pins: IndexMap<String, MatchSpec>,
    /// Specs to record in the environment history
    pub for_history: IndexMap<String, MatchSpec>,
    /// Number of solver invocations (0 when no solve was needed)
    pub attempts: usize,
}

impl Resolution {
    /// Look up the record chosen for `name`
    pub fn record(&self, name: &str) -> Option<&PackageRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}
