// src/resolver/conflict.rs

//! Solver diagnostic interpretation
//!
//! The solver reports failures as a drawn tree of plain English lines. This
//! module pulls the offending `(name, spec)` pairs out of that text, tells
//! missing packages apart from real conflicts, and decides whether another
//! attempt can still make progress.

use crate::error::Error;
use crate::spec::MatchSpec;
use crate::state::ConflictSet;
use indexmap::IndexSet;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

const TREE_CHARS: &[char] = &[' ', '─', '│', '└', '├'];
const REQUEST_PREFIX: &str = "Cannot solve the request because of:";

// Name and version lead each line; any build or channel tokens after them
// are skipped.
static LOCKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(\S+)(?:\s+\S+)*?\s+is locked, but another version is required as reported above")
        .expect("locked pattern is valid")
});

static WHICH_NO_VIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+([^\s,]+),?(?:\s+[^\s,]+,?)*?\s+which cannot be installed because there are no viable options")
        .expect("dependency without options pattern is valid")
});

static NO_VIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(\S+)(?:\s+\S+)*?\s+cannot be installed because there are no viable options")
        .expect("no viable options pattern is valid")
});

static CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"the constraint\s+(.+?)\s+cannot be fulfilled")
        .expect("constraint pattern is valid")
});

static OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s+can be installed with any of the following options")
        .expect("options pattern is valid")
});

static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No candidates were found for\s+(.+)$")
        .expect("not found pattern is valid")
});

/// Conflicts extracted from one diagnostic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDiagnostic {
    pub unsatisfiable: ConflictSet,
    pub not_found: ConflictSet,
}

/// Parse a solver diagnostic into unsatisfiable and missing specs
pub fn parse_diagnostic(diagnostic: &str) -> ParsedDiagnostic {
    let mut parsed = ParsedDiagnostic::default();

    for raw in diagnostic.lines() {
        let mut line = raw.trim_matches(TREE_CHARS);
        if let Some(rest) = line.strip_prefix(REQUEST_PREFIX) {
            line = rest.trim_matches(TREE_CHARS);
        }
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = LOCKED.captures(line) {
            insert(&mut parsed.unsatisfiable, &format!("{} {}", &caps[1], &caps[2]));
        } else if let Some(caps) = WHICH_NO_VIABLE.captures(line) {
            insert(&mut parsed.unsatisfiable, &format!("{} {}", &caps[1], &caps[2]));
        } else if let Some(caps) = NO_VIABLE.captures(line) {
            insert(&mut parsed.unsatisfiable, &format!("{} {}", &caps[1], &caps[2]));
        } else if let Some(caps) = CONSTRAINT.captures(line) {
            insert(&mut parsed.unsatisfiable, &caps[1]);
        } else if let Some(caps) = OPTIONS.captures(line).filter(|_| !line.contains("which")) {
            insert(&mut parsed.unsatisfiable, &caps[1]);
        } else if let Some(caps) = NOT_FOUND.captures(line) {
            let spec = caps[1].trim();
            insert(&mut parsed.not_found, spec.strip_suffix('.').unwrap_or(spec));
        }
    }

    parsed
}

/// Parse spec text, falling back to its first word as a name-only spec
fn insert(set: &mut ConflictSet, text: &str) {
    let spec = MatchSpec::parse(text).unwrap_or_else(|_| {
        let name = text.split_whitespace().next().unwrap_or(text);
        MatchSpec::name_only(name.to_ascii_lowercase())
    });
    set.insert(spec.name.clone(), spec);
}

/// Knobs for deciding when retrying stops making sense
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    /// Reported last, so other names get relaxed first
    pub anchor: String,
    /// This many new conflicts in one round means the search is diverging
    pub explosion_threshold: usize,
}

/// What the loop should do after a failed attempt
#[derive(Debug)]
pub enum Interpretation {
    /// Try again with this (merged) conflict set
    Retry(ConflictSet),
    /// Stop: not found, or conflicts stopped converging
    Terminal(Error),
}

/// Fold a diagnostic into the running conflict set
pub fn interpret(
    diagnostic: &str,
    previous: &ConflictSet,
    channels: &[String],
    policy: &EscalationPolicy,
) -> Interpretation {
    let ParsedDiagnostic {
        mut unsatisfiable,
        not_found,
    } = parse_diagnostic(diagnostic);

    if unsatisfiable.is_empty() && !not_found.is_empty() {
        debug!(
            "Inferred missing packages {:?} from diagnostic",
            not_found.keys().collect::<Vec<_>>()
        );
        return Interpretation::Terminal(Error::PackagesNotFound {
            specs: not_found.into_values().collect(),
            channels: channels.to_vec(),
        });
    }

    let previous_set: HashSet<&MatchSpec> = previous.values().collect();
    let current_set: HashSet<&MatchSpec> = unsatisfiable.values().collect();
    let new_values = current_set.difference(&previous_set).count();
    let stalled = !previous.is_empty() && previous_set == current_set;
    let exploded = new_values >= policy.explosion_threshold;

    if stalled || exploded {
        debug!(
            "Conflicts stopped converging (stalled: {}, new: {})",
            stalled, new_values
        );
        let conflicts = previous
            .keys()
            .chain(unsatisfiable.keys())
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        return Interpretation::Terminal(Error::Unsatisfiable {
            diagnostic: diagnostic.to_string(),
            conflicts,
        });
    }

    if new_values > 1 && unsatisfiable.contains_key(&policy.anchor) {
        debug!("Holding back {} so other conflicts are relaxed first", policy.anchor);
        unsatisfiable.shift_remove(&policy.anchor);
    }

    debug!(
        "Attempt failed with {} conflicts:\n{}",
        unsatisfiable.len(),
        diagnostic
    );
    let mut merged = previous.clone();
    merged.extend(unsatisfiable);
    Interpretation::Retry(merged)
}
