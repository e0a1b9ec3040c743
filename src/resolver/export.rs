// src/resolver/export.rs

//! Storing an accepted solution

use crate::packages::{PackageRecord, SolverRecord};
use crate::state::OutputState;
use tracing::warn;

/// Replace `out.records` with the solver's records, one per name
pub fn export_solution(records: Vec<SolverRecord>, out: &mut OutputState) {
    out.records.clear();
    for record in records {
        let record = PackageRecord::from(record);
        if let Some(previous) = out.records.insert(record.name.clone(), record) {
            warn!(
                "Solver returned {} more than once; replacing {}",
                previous.name, previous
            );
        }
    }
}
