// src/error.rs

//! Error types for envsolve
//!
//! Recoverable solver conflicts never surface here; they stay inside the
//! attempt loop. Only input validation failures and the terminal solve
//! outcomes reach the caller.

use crate::spec::MatchSpec;
use thiserror::Error;

/// Main error type for resolution operations
#[derive(Debug, Error)]
pub enum Error {
    /// A spec, version or record field could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Solver input rejected before any attempt was made
    #[error("Invalid solver input: {0}")]
    InvalidInput(String),

    /// Resolver configuration is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Conversion between host and solver record schemas failed
    #[error("Cannot convert record '{name}': {reason}")]
    RecordConversion { name: String, reason: String },

    /// Requested or implied specs have no candidates in any channel
    #[error("Packages not found in channels [{}]: {}", .channels.join(", "), join_specs(.specs))]
    PackagesNotFound {
        specs: Vec<MatchSpec>,
        channels: Vec<String>,
    },

    /// No solution exists (or the loop stopped converging)
    #[error("Could not solve for environment specs\n{diagnostic}")]
    Unsatisfiable {
        diagnostic: String,
        conflicts: Vec<String>,
    },

    /// A pin excludes every candidate of an explicitly requested spec
    #[error("Requested spec '{requested}' conflicts with pinned spec '{pin}'")]
    PinConflict { requested: MatchSpec, pin: MatchSpec },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn join_specs(specs: &[MatchSpec]) -> String {
    specs
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Whether a caller may retry the whole solve (e.g. with other flags)
    ///
    /// Terminal solve outcomes must not be retried.
    pub fn allow_retry(&self) -> bool {
        !matches!(
            self,
            Error::PackagesNotFound { .. } | Error::Unsatisfiable { .. } | Error::PinConflict { .. }
        )
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Error::Unsatisfiable { .. })
    }
}

/// Result type alias for envsolve operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_disallow_retry() {
        let not_found = Error::PackagesNotFound {
            specs: vec![MatchSpec::parse("foo 1.0.*").unwrap()],
            channels: vec!["conda-forge".to_string()],
        };
        assert!(!not_found.allow_retry());

        let unsat = Error::Unsatisfiable {
            diagnostic: "nope".to_string(),
            conflicts: vec!["bar".to_string()],
        };
        assert!(!unsat.allow_retry());
        assert!(unsat.is_unsatisfiable());

        assert!(Error::ParseError("bad".to_string()).allow_retry());
    }

    #[test]
    fn test_packages_not_found_display() {
        let err = Error::PackagesNotFound {
            specs: vec![
                MatchSpec::parse("foo 1.0.*").unwrap(),
                MatchSpec::parse("bar").unwrap(),
            ],
            channels: vec!["conda-forge".to_string(), "defaults".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Packages not found in channels [conda-forge, defaults]: foo 1.0.*, bar"
        );
    }
}
