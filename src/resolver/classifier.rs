// src/resolver/classifier.rs

//! Turning solve state into a solver request
//!
//! Every name in `OutputState::specs` gets a [`Disposition`] decided by the
//! first matching rule; a version pin additionally contributes a constraint.
//! Names are visited in insertion order, so identical state always yields an
//! identical request.

use crate::error::Result;
use crate::packages::{NoArchType, PackageRecord};
use crate::spec::MatchSpec;
use crate::state::{InputState, OutputState};
use crate::version::{CondaVersion, VersionSpec};
use indexmap::IndexMap;
use tracing::debug;

use super::neuter::neuter;
use super::request::{Disposition, SolveRequest};
use super::ResolveMode;

/// Version that sorts below every real version; forces removal
const REMOVAL_SENTINEL: &str = "0.0.0dev0";

/// Per-attempt request builder
pub struct Classifier<'a> {
    input: &'a InputState,
    anchor: &'a str,
}

impl<'a> Classifier<'a> {
    pub fn new(input: &'a InputState, anchor: &'a str) -> Self {
        Self { input, anchor }
    }

    /// Build the request for the next attempt
    ///
    /// Neutered history specs are recorded in `out.neutered`.
    pub fn build_request(&self, out: &mut OutputState, mode: ResolveMode) -> Result<SolveRequest> {
        let dispositions = match mode {
            ResolveMode::BuildTool => self.build_tool_dispositions(),
            ResolveMode::Standard if self.input.is_removing() => self.remove_dispositions(out)?,
            ResolveMode::Standard => self.install_dispositions(out),
        };

        let mut request = SolveRequest::new();
        for (name, disposition) in dispositions {
            debug!("{}: {:?}", name, DispositionSummary(&disposition));
            request.apply(disposition)?;
        }
        Ok(request)
    }

    fn install_dispositions(&self, out: &mut OutputState) -> Vec<(String, Disposition)> {
        let always_update = self.input.always_update();
        let anchor_may_change = self.anchor_may_change(out);

        let names: Vec<String> = out.specs.keys().cloned().collect();
        let mut dispositions = Vec::with_capacity(names.len());
        for name in names {
            if name.contains('*') {
                dispositions.push((name, Disposition::Skipped));
                continue;
            }

            if let Some(kept) = self.keep_user_installed(&name, out, &always_update) {
                dispositions.push((name, kept));
                continue;
            }

            // Pins only constrain; the name still goes through the rules below
            let pin = self
                .input
                .pinned()
                .get(&name)
                .filter(|pin| !pin.is_name_only());
            if let Some(pin) = pin {
                dispositions.push((name.clone(), Disposition::Constraint(pin.clone())));
            }

            let disposition =
                self.install_disposition(&name, pin, out, &always_update, anchor_may_change);
            dispositions.push((name, disposition));
        }
        dispositions
    }

    /// User installed packages nobody asked to move stay where they are
    fn keep_user_installed(
        &self,
        name: &str,
        out: &OutputState,
        always_update: &IndexMap<String, MatchSpec>,
    ) -> Option<Disposition> {
        let input = self.input;
        let record = input.installed().get(name)?;
        let keep = input.is_user_installed(name)
            && !input.prune()
            && !out.conflicts.contains_key(name)
            && !input.requested().contains_key(name)
            && !always_update.contains_key(name);
        keep.then(|| Disposition::Kept {
            spec: installed_spec(record),
            record: record.clone(),
        })
    }

    fn install_disposition(
        &self,
        name: &str,
        pin: Option<&MatchSpec>,
        out: &mut OutputState,
        always_update: &IndexMap<String, MatchSpec>,
        anchor_may_change: bool,
    ) -> Disposition {
        let input = self.input;
        let installed = input.installed().get(name);
        let conflicting = out.conflicts.contains_key(name);

        if let Some(requested) = input.requested().get(name) {
            // A bare name under a real pin is sent as the pin for clearer errors
            return match pin {
                Some(pin) if requested.is_name_only() => Disposition::Spec(pin.clone()),
                _ => Disposition::Spec(requested.clone()),
            };
        }

        if always_update.contains_key(name) && !conflicting {
            return Disposition::Spec(MatchSpec::name_only(name));
        }

        if input.prune() {
            return Disposition::Skipped;
        }

        if name == self.anchor
            && let Some(record) = installed
            && !input.pinned().contains_key(name)
        {
            return Disposition::Constraint(minor_series(record));
        }

        if let Some(history) = input.history().get(name) {
            if conflicting && history.strictness() == 3 {
                let relaxed = neuter(history);
                debug!("Neutering {} to {}", history, relaxed);
                out.neutered.insert(name.to_string(), relaxed.clone());
                return Disposition::Spec(relaxed);
            }
            return Disposition::Spec(history.clone());
        }

        match installed {
            Some(_) if conflicting => Disposition::Skipped,
            // Native builds against a moving anchor have to be free to follow it
            Some(record) if anchor_may_change && self.follows_anchor(record) => {
                Disposition::Locked(record.clone())
            }
            Some(record) => Disposition::Pinned(record.clone()),
            None => Disposition::Skipped,
        }
    }

    fn remove_dispositions(&self, out: &OutputState) -> Result<Vec<(String, Disposition)>> {
        let input = self.input;
        let mut dispositions = Vec::new();
        let mut removed: Vec<String> = Vec::new();

        for spec in input.requested().values() {
            if spec.is_glob() {
                for (name, record) in input.installed() {
                    if spec.matches(record) && !removed.contains(name) {
                        removed.push(name.clone());
                    }
                }
            } else if !removed.contains(&spec.name) {
                removed.push(spec.name.clone());
            }
        }
        for name in &removed {
            dispositions.push((name.clone(), Disposition::Constraint(removal_spec(name)?)));
        }

        for name in out.specs.keys() {
            if name.contains('*') || removed.contains(name) {
                continue;
            }
            let installed = input.installed().get(name);
            let conflicting = out.conflicts.contains_key(name);

            let disposition = match (input.pinned().get(name), installed) {
                (Some(pin), _) if !pin.is_name_only() => Disposition::Constraint(pin.clone()),
                (Some(_), Some(record)) => Disposition::Pinned(record.clone()),
                (_, Some(record)) if !conflicting => match input.history().get(name) {
                    Some(history) => Disposition::Kept {
                        spec: history.clone(),
                        record: record.clone(),
                    },
                    None => Disposition::Locked(record.clone()),
                },
                _ => Disposition::Skipped,
            };
            dispositions.push((name.clone(), disposition));
        }

        Ok(dispositions)
    }

    fn build_tool_dispositions(&self) -> Vec<(String, Disposition)> {
        let requested = self
            .input
            .requested()
            .iter()
            .filter(|(name, _)| !name.starts_with("__"))
            .map(|(name, spec)| (name.clone(), Disposition::Spec(spec.clone())));
        let pins = self
            .input
            .pinned()
            .iter()
            .filter(|(_, pin)| !pin.is_name_only())
            .map(|(name, pin)| (name.clone(), Disposition::Constraint(pin.clone())));
        requested.chain(pins).collect()
    }

    /// Whether the solve may move the anchor away from its installed record
    fn anchor_may_change(&self, out: &OutputState) -> bool {
        match (
            self.input.installed().get(self.anchor),
            out.specs.get(self.anchor),
        ) {
            (Some(record), Some(spec)) => !spec.matches(record),
            _ => false,
        }
    }

    /// Native builds tied to the anchor must be free to follow it
    fn follows_anchor(&self, record: &PackageRecord) -> bool {
        record.noarch == NoArchType::Native
            && (record.depends_on(self.anchor)
                || record.depends_on(&format!("{}_abi", self.anchor)))
    }
}

/// The installed record as a spec, without channel so mirrors still match
fn installed_spec(record: &PackageRecord) -> MatchSpec {
    match record.to_match_spec() {
        Ok(spec) => MatchSpec {
            channel: None,
            ..spec
        },
        Err(_) => MatchSpec::name_only(record.name.clone()),
    }
}

/// `name X.Y.*` from the installed version
fn minor_series(record: &PackageRecord) -> MatchSpec {
    let version = CondaVersion::parse(&record.version)
        .ok()
        .map(|v| VersionSpec::Prefix(v.truncated(2)));
    MatchSpec {
        name: record.name.clone(),
        channel: None,
        version,
        build: None,
    }
}

fn removal_spec(name: &str) -> Result<MatchSpec> {
    Ok(MatchSpec {
        name: name.to_string(),
        channel: None,
        version: Some(VersionSpec::LessThan(CondaVersion::parse(REMOVAL_SENTINEL)?)),
        build: None,
    })
}

/// Compact log form of a disposition
struct DispositionSummary<'a>(&'a Disposition);

impl std::fmt::Debug for DispositionSummary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Disposition::Skipped => write!(f, "skipped"),
            Disposition::Kept { spec, .. } => write!(f, "kept ({})", spec),
            Disposition::Locked(record) => write!(f, "locked ({})", record),
            Disposition::Pinned(record) => write!(f, "pinned ({})", record),
            Disposition::Spec(spec) => write!(f, "spec ({})", spec),
            Disposition::Constraint(spec) => write!(f, "constraint ({})", spec),
        }
    }
}
