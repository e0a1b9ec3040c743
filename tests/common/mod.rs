// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use envsolve::resolver::{ReplayBackend, ReplayStep, Resolver};
use envsolve::{
    InputState, MatchSpec, PackageRecord, RepoIndex, Resolution, ResolverConfig, Result,
    SolverRecord,
};
use std::sync::Arc;

pub const CHANNEL: &str = "conda-forge";

pub fn spec(s: &str) -> MatchSpec {
    MatchSpec::parse(s).unwrap()
}

/// Installed-looking record from the test channel
pub fn record(name: &str, version: &str, build: &str) -> PackageRecord {
    let mut record = PackageRecord::new(name, version, build);
    record.channel = CHANNEL.to_string();
    record.subdir = "linux-64".to_string();
    record.file_name = format!("{}-{}-{}.conda", name, version, build);
    record
}

/// Solver response returning these records
pub fn solution(records: &[PackageRecord]) -> ReplayStep {
    ReplayStep::Solution(
        records
            .iter()
            .map(|r| SolverRecord::try_from(r).unwrap())
            .collect(),
    )
}

pub fn conflict(diagnostic: &str) -> ReplayStep {
    ReplayStep::Conflict(diagnostic.to_string())
}

/// Index over the given records in the test channel
pub fn index(records: Vec<PackageRecord>) -> RepoIndex {
    RepoIndex::from_records(CHANNEL, records)
}

/// Run a full solve against a scripted backend
///
/// Returns the result and the backend so tests can inspect the requests.
pub fn solve(
    steps: Vec<ReplayStep>,
    input: &InputState,
    available: Vec<PackageRecord>,
) -> (Result<Resolution>, Arc<ReplayBackend>) {
    let backend = Arc::new(ReplayBackend::new(steps));
    let index = index(available);
    let config = ResolverConfig::default();
    let result = Resolver::new(backend.clone(), &index, &config).solve(input);
    (result, backend)
}

pub fn strings(specs: &[MatchSpec]) -> Vec<String> {
    specs.iter().map(ToString::to_string).collect()
}

pub fn names(records: &[SolverRecord]) -> Vec<String> {
    records.iter().map(|r| r.name.clone()).collect()
}
