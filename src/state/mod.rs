// src/state/mod.rs

//! Solver input and output state
//!
//! `InputState` describes one solve session and never changes once built.
//! `OutputState` is threaded through the attempt loop: each failed attempt
//! derives a fresh one with [`OutputState::carry_forward`].

use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::packages::PackageRecord;
use crate::spec::MatchSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Package name → constraint currently known to cause unsatisfiability
pub type ConflictSet = IndexMap<String, MatchSpec>;

/// How aggressively already installed packages may move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateModifier {
    /// Update what the request needs; other installed packages stay pinned
    /// until a conflict frees them
    #[default]
    UpdateSpecs,
    /// Installed packages are mandatory; request building already pins
    /// them, so this behaves like `UpdateSpecs`
    FreezeInstalled,
    /// Update the requested packages and their dependencies
    UpdateDeps,
    /// Every historically requested package floats
    UpdateAll,
    /// Skip solving when the request is already satisfied
    SpecsSatisfiedSkipSolve,
}

/// Dependency handling for requested packages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepsModifier {
    #[default]
    NotSet,
    /// Install requested packages only, without new dependencies
    NoDeps,
    /// Install dependencies of requested packages, not the packages
    OnlyDeps,
}

/// A platform describing package (`__glibc`, `__cuda`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
}

/// Immutable inputs of one solve session
#[derive(Debug, Clone, Default)]
pub struct InputState {
    installed: IndexMap<String, PackageRecord>,
    history: IndexMap<String, MatchSpec>,
    pinned: IndexMap<String, MatchSpec>,
    requested: IndexMap<String, MatchSpec>,
    removing: bool,
    aggressive_updates: IndexMap<String, MatchSpec>,
    do_not_remove: IndexMap<String, MatchSpec>,
    virtual_packages: Vec<VirtualPackage>,
    channels: Vec<String>,
    update_modifier: UpdateModifier,
    deps_modifier: DepsModifier,
    prune: bool,
    ignore_pinned: bool,
    force_remove: bool,
}

impl InputState {
    pub fn builder() -> InputStateBuilder {
        InputStateBuilder::default()
    }

    pub fn installed(&self) -> &IndexMap<String, PackageRecord> {
        &self.installed
    }

    pub fn history(&self) -> &IndexMap<String, MatchSpec> {
        &self.history
    }

    /// Pinned specs; empty when pins are ignored
    pub fn pinned(&self) -> &IndexMap<String, MatchSpec> {
        &self.pinned
    }

    /// Specs to add, or to remove when [`is_removing`](Self::is_removing)
    pub fn requested(&self) -> &IndexMap<String, MatchSpec> {
        &self.requested
    }

    pub fn is_removing(&self) -> bool {
        self.removing
    }

    pub fn aggressive_updates(&self) -> &IndexMap<String, MatchSpec> {
        &self.aggressive_updates
    }

    pub fn do_not_remove(&self) -> &IndexMap<String, MatchSpec> {
        &self.do_not_remove
    }

    pub fn virtual_packages(&self) -> &[VirtualPackage] {
        &self.virtual_packages
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn update_modifier(&self) -> UpdateModifier {
        self.update_modifier
    }

    pub fn deps_modifier(&self) -> DepsModifier {
        self.deps_modifier
    }

    pub fn prune(&self) -> bool {
        self.prune
    }

    pub fn ignore_pinned(&self) -> bool {
        self.ignore_pinned
    }

    pub fn force_remove(&self) -> bool {
        self.force_remove
    }

    /// Names that should move to their latest version
    ///
    /// Aggressive updates, plus every history name with `UpdateAll`.
    pub fn always_update(&self) -> IndexMap<String, MatchSpec> {
        let mut names: IndexMap<String, MatchSpec> = self
            .aggressive_updates
            .keys()
            .map(|name| (name.clone(), MatchSpec::name_only(name.clone())))
            .collect();
        if self.update_modifier == UpdateModifier::UpdateAll {
            for name in self.history.keys() {
                names
                    .entry(name.clone())
                    .or_insert_with(|| MatchSpec::name_only(name.clone()));
            }
        }
        names
    }

    /// Installed and explicitly wanted by the user in some way
    pub fn is_user_installed(&self, name: &str) -> bool {
        self.installed.contains_key(name)
            && (self.history.contains_key(name)
                || self.aggressive_updates.contains_key(name)
                || self.pinned.contains_key(name)
                || self.do_not_remove.contains_key(name))
    }
}

/// Validating builder for [`InputState`]
#[derive(Debug, Clone, Default)]
pub struct InputStateBuilder {
    installed: Vec<PackageRecord>,
    history: Vec<MatchSpec>,
    pinned: Vec<MatchSpec>,
    specs_to_add: Vec<MatchSpec>,
    specs_to_remove: Vec<MatchSpec>,
    aggressive_updates: Vec<MatchSpec>,
    do_not_remove: Vec<MatchSpec>,
    virtual_packages: Vec<VirtualPackage>,
    channels: Vec<String>,
    update_modifier: UpdateModifier,
    deps_modifier: DepsModifier,
    prune: bool,
    ignore_pinned: bool,
    force_remove: bool,
}

impl InputStateBuilder {
    pub fn installed(mut self, records: impl IntoIterator<Item = PackageRecord>) -> Self {
        self.installed.extend(records);
        self
    }

    pub fn history(mut self, specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        self.history.extend(specs);
        self
    }

    pub fn pinned(mut self, specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        self.pinned.extend(specs);
        self
    }

    pub fn add(mut self, specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        self.specs_to_add.extend(specs);
        self
    }

    pub fn remove(mut self, specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        self.specs_to_remove.extend(specs);
        self
    }

    pub fn aggressive_updates(mut self, specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        self.aggressive_updates.extend(specs);
        self
    }

    pub fn do_not_remove(mut self, specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        self.do_not_remove.extend(specs);
        self
    }

    pub fn virtual_packages(mut self, packages: impl IntoIterator<Item = VirtualPackage>) -> Self {
        self.virtual_packages.extend(packages);
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn update_modifier(mut self, modifier: UpdateModifier) -> Self {
        self.update_modifier = modifier;
        self
    }

    pub fn deps_modifier(mut self, modifier: DepsModifier) -> Self {
        self.deps_modifier = modifier;
        self
    }

    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn ignore_pinned(mut self, ignore: bool) -> Self {
        self.ignore_pinned = ignore;
        self
    }

    pub fn force_remove(mut self, force: bool) -> Self {
        self.force_remove = force;
        self
    }

    /// Validate and freeze the inputs
    pub fn build(self) -> Result<InputState> {
        if !self.specs_to_add.is_empty() && !self.specs_to_remove.is_empty() {
            return Err(Error::InvalidInput(
                "Cannot add and remove packages in the same request".to_string(),
            ));
        }

        if self.force_remove && self.specs_to_remove.is_empty() {
            return Err(Error::InvalidInput(
                "force_remove requires packages to remove".to_string(),
            ));
        }

        if self.deps_modifier == DepsModifier::NoDeps
            && self.update_modifier == UpdateModifier::UpdateDeps
        {
            return Err(Error::InvalidInput(
                "Cannot combine no-deps with update-deps".to_string(),
            ));
        }

        let all_names = self
            .installed
            .iter()
            .map(|r| r.name.as_str())
            .chain(
                [
                    &self.history,
                    &self.pinned,
                    &self.specs_to_add,
                    &self.specs_to_remove,
                    &self.aggressive_updates,
                    &self.do_not_remove,
                ]
                .into_iter()
                .flatten()
                .map(|s| s.name.as_str()),
            );
        for name in all_names {
            validate_name(name)?;
        }

        let removing = !self.specs_to_remove.is_empty();
        let requested = if removing {
            self.specs_to_remove
        } else {
            self.specs_to_add
        };

        Ok(InputState {
            installed: self
                .installed
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
            history: by_name(self.history),
            pinned: if self.ignore_pinned {
                IndexMap::new()
            } else {
                by_name(self.pinned)
            },
            requested: by_name(requested),
            removing,
            aggressive_updates: by_name(self.aggressive_updates),
            do_not_remove: by_name(self.do_not_remove),
            virtual_packages: self.virtual_packages,
            channels: self.channels,
            update_modifier: self.update_modifier,
            deps_modifier: self.deps_modifier,
            prune: self.prune,
            ignore_pinned: self.ignore_pinned,
            force_remove: self.force_remove,
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Empty package name".to_string()));
    }
    if name.contains(['/', '\\']) {
        return Err(Error::InvalidInput(format!(
            "Package name '{}' contains a path separator",
            name
        )));
    }
    Ok(())
}

fn by_name(specs: Vec<MatchSpec>) -> IndexMap<String, MatchSpec> {
    specs.into_iter().map(|s| (s.name.clone(), s)).collect()
}

/// State threaded through the attempt loop
#[derive(Debug, Clone, Default)]
pub struct OutputState {
    /// Every name under consideration, in classification order
    pub specs: IndexMap<String, MatchSpec>,
    /// Current solution (initially the installed records)
    pub records: IndexMap<String, PackageRecord>,
    /// Specs to record in the environment history after a successful solve
    pub for_history: IndexMap<String, MatchSpec>,
    /// Historical specs relaxed during the solve
    pub neutered: IndexMap<String, MatchSpec>,
    pub conflicts: ConflictSet,
    /// Pins that applied to this solve
    pub pins: IndexMap<String, MatchSpec>,
}

impl OutputState {
    pub fn new(input: &InputState) -> Self {
        Self {
            specs: initial_specs(input),
            records: input.installed().clone(),
            ..Self::default()
        }
    }

    /// Next attempt's state: durable bookkeeping kept, specs recomputed
    pub fn carry_forward(&self, input: &InputState) -> Self {
        Self {
            specs: initial_specs(input),
            records: self.records.clone(),
            for_history: self.for_history.clone(),
            neutered: self.neutered.clone(),
            conflicts: self.conflicts.clone(),
            pins: self.pins.clone(),
        }
    }

    /// Final records when no solve is needed at all
    pub fn early_exit(&self, input: &InputState) -> Option<Vec<PackageRecord>> {
        if input.is_removing() && input.force_remove() {
            debug!("Forced removal, skipping solver");
            return Some(
                input
                    .installed()
                    .values()
                    .filter(|record| !input.requested().values().any(|spec| spec.matches(record)))
                    .cloned()
                    .collect(),
            );
        }

        if input.update_modifier() == UpdateModifier::SpecsSatisfiedSkipSolve
            && !input.is_removing()
        {
            let satisfied = input.requested().values().all(|spec| {
                input
                    .installed()
                    .values()
                    .any(|record| spec.matches(record))
            });
            if satisfied {
                debug!("All requested specs already satisfied, skipping solver");
                return Some(input.installed().values().cloned().collect());
            }
        }

        None
    }

    /// Record applicable pins and reject requests a pin makes impossible
    pub fn check_for_pin_conflicts(
        &mut self,
        input: &InputState,
        index: &dyn PackageIndex,
    ) -> Result<()> {
        if input.ignore_pinned() {
            return Ok(());
        }

        for (name, pin) in input.pinned() {
            self.pins.insert(name.clone(), pin.clone());

            if input.is_removing() || pin.is_name_only() {
                continue;
            }
            let Some(requested) = input.requested().get(name) else {
                continue;
            };
            if requested.is_name_only() {
                continue;
            }

            let candidates = index.search(requested);
            if !candidates.is_empty() && !candidates.iter().any(|record| pin.matches(record)) {
                return Err(Error::PinConflict {
                    requested: requested.clone(),
                    pin: pin.clone(),
                });
            }
        }
        Ok(())
    }

    /// Apply deps modifiers and record history after a successful solve
    pub fn post_solve(&mut self, input: &InputState) {
        if !input.is_removing() {
            match input.deps_modifier() {
                DepsModifier::OnlyDeps => {
                    self.records.retain(|name, _| {
                        !input.requested().contains_key(name) || input.installed().contains_key(name)
                    });
                }
                DepsModifier::NoDeps => {
                    let solved = std::mem::take(&mut self.records);
                    for (name, record) in solved {
                        if input.requested().contains_key(&name) {
                            self.records.insert(name, record);
                        } else if let Some(installed) = input.installed().get(&name) {
                            self.records.insert(name, installed.clone());
                        }
                    }
                    // Installed packages the solver dropped stay as they are
                    for (name, record) in input.installed() {
                        if !self.records.contains_key(name) {
                            self.records.insert(name.clone(), record.clone());
                        }
                    }
                }
                DepsModifier::NotSet => {}
            }
        }

        for (name, spec) in input.requested() {
            self.for_history.insert(name.clone(), spec.clone());
        }
    }

    /// Solution records in order
    pub fn current_solution(&self) -> Vec<PackageRecord> {
        self.records.values().cloned().collect()
    }
}

/// Names in classification order with the strongest known spec for each
///
/// Order: installed, history, pinned, aggressive updates, do-not-remove,
/// requested. Values: requested > pinned > history > installed record.
fn initial_specs(input: &InputState) -> IndexMap<String, MatchSpec> {
    let mut specs = IndexMap::new();

    for (name, record) in input.installed() {
        let spec = record
            .to_match_spec()
            .unwrap_or_else(|_| MatchSpec::name_only(name.clone()));
        specs.insert(name.clone(), spec);
    }
    for (name, spec) in input.history() {
        specs.insert(name.clone(), spec.clone());
    }
    for (name, spec) in input.pinned() {
        specs.insert(name.clone(), spec.clone());
    }
    for (name, spec) in input
        .aggressive_updates()
        .iter()
        .chain(input.do_not_remove().iter())
    {
        specs.entry(name.clone()).or_insert_with(|| spec.clone());
    }
    for (name, spec) in input.requested() {
        specs.insert(name.clone(), spec.clone());
    }
    specs
}
