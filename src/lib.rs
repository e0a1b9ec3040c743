// src/lib.rs

//! Envsolve environment resolver
//!
//! Iterative dependency resolution for conda-style package environments.
//! An external constraint solver is retried until it finds a consistent set
//! of packages, with conflict diagnostics guiding which constraints to relax.
//!
//! # Architecture
//!
//! - Inputs: installed records, history, pins and requested specs form an
//!   immutable [`InputState`]
//! - Attempts: each attempt classifies names into a [`SolveRequest`] and
//!   calls a [`SolverBackend`] once
//! - Conflicts: failure diagnostics grow a conflict set that loosens the
//!   next request, until success or a proven dead end
//! - Index: repodata is loaded once into a shared [`RepoIndex`] snapshot

pub mod config;
mod error;
pub mod index;
pub mod packages;
pub mod resolver;
pub mod session;
pub mod spec;
pub mod state;
pub mod version;

pub use config::ResolverConfig;
pub use error::{Error, Result};
pub use index::{IndexService, PackageFormat, PackageIndex, RepoDataSource, RepoIndex};
pub use packages::{NoArchType, PackageRecord, SolverRecord};
pub use resolver::{
    neuter, ReplayBackend, Resolution, ResolveMode, Resolver, SolveRequest, SolverBackend,
};
pub use session::Session;
pub use spec::{MatchSpec, SpecKind};
pub use state::{ConflictSet, DepsModifier, InputState, OutputState, UpdateModifier};
pub use version::{CondaVersion, VersionSpec};

/// User agent string for anything that identifies this library
pub fn user_agent() -> String {
    format!("envsolve/{}", env!("CARGO_PKG_VERSION"))
}
