// src/resolver/mod.rs

//! Environment resolution
//!
//! This module drives an external constraint solver through repeated
//! attempts: classify the solve state into a request, call the backend,
//! interpret conflict diagnostics, relax conflicting history specs and try
//! again until a solution is found or the conflicts prove unsatisfiable.

mod backend;
mod classifier;
mod conflict;
mod engine;
mod export;
mod neuter;
mod plan;
mod request;

pub use backend::{
    ChannelPriority, ReplayBackend, ReplayStep, SolveFailure, SolveStrategy, SolveTask,
    SolverBackend, TimeoutBackend,
};
pub use classifier::Classifier;
pub use conflict::{
    interpret, parse_diagnostic, EscalationPolicy, Interpretation, ParsedDiagnostic,
};
pub use engine::Resolver;
pub use export::export_solution;
pub use neuter::neuter;
pub use plan::Resolution;
pub use request::{Disposition, SolveRequest};

/// Which rule set turns solve state into a request
///
/// Build-tool mode is chosen explicitly by the caller, never inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveMode {
    #[default]
    Standard,
    /// Requests only, no locks or pins from the environment
    BuildTool,
}
