// src/resolver/engine.rs

//! The attempt loop
//!
//! Each attempt classifies the current state into a request, calls the
//! backend once and either accepts the solution or folds the diagnostic
//! into the conflict set for the next attempt. When the bounded attempts
//! run out (or conflicts stop converging) every manageable installed
//! package is unfrozen for one last try.

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::packages::SolverRecord;
use crate::spec::MatchSpec;
use crate::state::{ConflictSet, InputState, OutputState};
use std::sync::Arc;
use tracing::{debug, info};

use super::backend::{SolveTask, SolverBackend, TimeoutBackend};
use super::classifier::Classifier;
use super::conflict::{interpret, EscalationPolicy, Interpretation};
use super::export::export_solution;
use super::plan::Resolution;
use super::request::SolveRequest;
use super::ResolveMode;

/// Result of one solver attempt
#[derive(Debug)]
enum AttemptOutcome {
    Success(Vec<SolverRecord>),
    /// Failed with conflicts worth another attempt
    Retry {
        conflicts: ConflictSet,
        diagnostic: String,
    },
    Terminal(Error),
}

/// Environment resolver driving a solver backend
pub struct Resolver<'a> {
    backend: Arc<dyn SolverBackend>,
    index: &'a dyn PackageIndex,
    config: &'a ResolverConfig,
    mode: ResolveMode,
}

impl<'a> Resolver<'a> {
    /// Create a resolver; calls are bounded by the configured timeout, if any
    pub fn new(
        backend: Arc<dyn SolverBackend>,
        index: &'a dyn PackageIndex,
        config: &'a ResolverConfig,
    ) -> Self {
        let backend: Arc<dyn SolverBackend> = match config.solve_timeout() {
            Some(timeout) => Arc::new(TimeoutBackend::from_arc(backend, timeout)),
            None => backend,
        };
        Self {
            backend,
            index,
            config,
            mode: ResolveMode::Standard,
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// The request the first attempt would send, without solving
    pub fn plan(&self, input: &InputState) -> Result<SolveRequest> {
        let mut out = OutputState::new(input);
        self.classifier(input).build_request(&mut out, self.mode)
    }

    /// Resolve the environment described by `input`
    pub fn solve(&self, input: &InputState) -> Result<Resolution> {
        info!(
            "Resolving environment: {} installed, {} requested",
            input.installed().len(),
            input.requested().len()
        );

        let mut out = OutputState::new(input);
        if let Some(records) = out.early_exit(input) {
            info!("Resolved without solving ({} packages)", records.len());
            return Ok(Resolution {
                records,
                ..Resolution::default()
            });
        }

        out.check_for_pin_conflicts(input, self.index)?;

        let max_attempts = self.max_attempts(input);
        let mut calls = 0;
        let mut last_diagnostic = String::new();
        let mut solution = None;

        for attempt in 1..=max_attempts {
            debug!("Starting solver attempt {} of {}", attempt, max_attempts);
            calls += 1;
            match self.attempt(input, &mut out)? {
                AttemptOutcome::Success(records) => {
                    solution = Some(records);
                    break;
                }
                AttemptOutcome::Retry {
                    conflicts,
                    diagnostic,
                } => {
                    last_diagnostic = diagnostic;
                    out = out.carry_forward(input);
                    out.conflicts = conflicts;
                }
                AttemptOutcome::Terminal(Error::Unsatisfiable { diagnostic, .. }) => {
                    debug!("Conflicts stopped converging after attempt {}", attempt);
                    last_diagnostic = diagnostic;
                    out = out.carry_forward(input);
                    break;
                }
                AttemptOutcome::Terminal(e) => return Err(e),
            }
        }

        let records = match solution {
            Some(records) => records,
            None => {
                self.unfreeze_installed(input, &mut out);
                debug!("Final attempt with every installed package unfrozen");
                calls += 1;
                match self.attempt(input, &mut out)? {
                    AttemptOutcome::Success(records) => records,
                    AttemptOutcome::Retry { diagnostic, .. } => {
                        return Err(self.unsatisfiable(diagnostic, &out));
                    }
                    AttemptOutcome::Terminal(Error::Unsatisfiable { diagnostic, .. }) => {
                        let diagnostic = if diagnostic.is_empty() {
                            last_diagnostic
                        } else {
                            diagnostic
                        };
                        return Err(self.unsatisfiable(diagnostic, &out));
                    }
                    AttemptOutcome::Terminal(e) => return Err(e),
                }
            }
        };

        out.conflicts.clear();
        export_solution(records, &mut out);
        out.post_solve(input);

        info!(
            "Resolved {} packages in {} solver attempt(s)",
            out.records.len(),
            calls
        );
        for (name, spec) in &out.neutered {
            info!("Relaxed history spec for {}: {}", name, spec);
        }

        Ok(Resolution {
            records: out.current_solution(),
            neutered: out.neutered,
            pins: out.pins,
            for_history: out.for_history,
            attempts: calls,
        })
    }

    fn attempt(&self, input: &InputState, out: &mut OutputState) -> Result<AttemptOutcome> {
        let request = self.classifier(input).build_request(out, self.mode)?;
        debug!("Solver request:\n{}", request);

        let task = SolveTask {
            request,
            virtual_packages: input.virtual_packages().to_vec(),
            channel_priority: self.config.channel_priority,
            strategy: self.config.strategy,
        };

        let failure = match self.backend.solve(&task) {
            Ok(records) => return Ok(AttemptOutcome::Success(records)),
            Err(failure) => failure,
        };

        let policy = EscalationPolicy {
            anchor: self.config.anchor_package.clone(),
            explosion_threshold: self.config.conflict_explosion_threshold,
        };
        let channels = self.channels(input);
        Ok(
            match interpret(&failure.diagnostic, &out.conflicts, &channels, &policy) {
                Interpretation::Retry(conflicts) => AttemptOutcome::Retry {
                    conflicts,
                    diagnostic: failure.diagnostic,
                },
                Interpretation::Terminal(e) => AttemptOutcome::Terminal(e),
            },
        )
    }

    fn classifier<'s>(&'s self, input: &'s InputState) -> Classifier<'s> {
        Classifier::new(input, &self.config.anchor_package)
    }

    /// Bounded attempts: one per installed package, within the configured cap
    fn max_attempts(&self, input: &InputState) -> usize {
        input.installed().len().min(self.config.max_attempts).max(1)
    }

    fn channels(&self, input: &InputState) -> Vec<String> {
        if input.channels().is_empty() {
            self.index.channels()
        } else {
            input.channels().to_vec()
        }
    }

    fn unfreeze_installed(&self, input: &InputState, out: &mut OutputState) {
        for (name, record) in input.installed() {
            if record.is_unmanageable() {
                continue;
            }
            let spec = record
                .to_match_spec()
                .unwrap_or_else(|_| MatchSpec::name_only(name.clone()));
            out.conflicts.insert(name.clone(), spec);
        }
    }

    fn unsatisfiable(&self, diagnostic: String, out: &OutputState) -> Error {
        let diagnostic = if diagnostic.is_empty() {
            "Could not find solution".to_string()
        } else {
            diagnostic
        };
        Error::Unsatisfiable {
            diagnostic,
            conflicts: out.conflicts.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RepoIndex;
    use crate::packages::PackageRecord;
    use crate::resolver::backend::{ReplayBackend, ReplayStep, SolveFailure};
    use crate::state::UpdateModifier;
    use std::thread;
    use std::time::Duration;

    fn record(name: &str, version: &str) -> PackageRecord {
        let mut record = PackageRecord::new(name, version, "0");
        record.channel = "conda-forge".to_string();
        record
    }

    fn solved(records: &[PackageRecord]) -> ReplayStep {
        ReplayStep::Solution(
            records
                .iter()
                .map(|r| SolverRecord::try_from(r).unwrap())
                .collect(),
        )
    }

    fn spec(s: &str) -> MatchSpec {
        MatchSpec::parse(s).unwrap()
    }

    fn run(
        steps: Vec<ReplayStep>,
        input: &InputState,
    ) -> (Result<Resolution>, Arc<ReplayBackend>) {
        let backend = Arc::new(ReplayBackend::new(steps));
        let index = RepoIndex::from_records("conda-forge", Vec::new());
        let config = ResolverConfig::default();
        let result = Resolver::new(backend.clone(), &index, &config).solve(input);
        (result, backend)
    }

    #[test]
    fn test_single_attempt_success() {
        let input = InputState::builder().add([spec("numpy")]).build().unwrap();
        let (result, backend) = run(vec![solved(&[record("numpy", "2.0")])], &input);

        let resolution = result.unwrap();
        assert_eq!(resolution.attempts, 1);
        assert_eq!(resolution.record("numpy").unwrap().version, "2.0");
        assert!(resolution.for_history.contains_key("numpy"));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let input = InputState::builder()
            .installed([record("python", "3.11.4")])
            .add([spec("nonexistent-pkg")])
            .channels(["conda-forge"])
            .build()
            .unwrap();
        let (result, backend) = run(
            vec![ReplayStep::Conflict(
                "No candidates were found for nonexistent-pkg.".to_string(),
            )],
            &input,
        );

        match result.unwrap_err() {
            Error::PackagesNotFound { specs, channels } => {
                assert_eq!(specs, vec![spec("nonexistent-pkg")]);
                assert_eq!(channels, vec!["conda-forge".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_early_exit_skips_solver() {
        let input = InputState::builder()
            .installed([record("numpy", "1.26.4")])
            .add([spec("numpy")])
            .update_modifier(UpdateModifier::SpecsSatisfiedSkipSolve)
            .build()
            .unwrap();
        let (result, backend) = run(Vec::new(), &input);

        let resolution = result.unwrap();
        assert_eq!(resolution.attempts, 0);
        assert_eq!(resolution.records.len(), 1);
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_empty_diagnostic_exhausts_to_unsatisfiable() {
        let input = InputState::builder()
            .installed([record("a", "1.0"), record("b", "1.0")])
            .add([spec("c")])
            .build()
            .unwrap();
        let (result, backend) = run(vec![ReplayStep::Conflict(String::new())], &input);

        // Empty diagnostics never converge: both bounded attempts run, then
        // the final one with everything unfrozen
        let err = result.unwrap_err();
        assert!(err.is_unsatisfiable());
        assert_eq!(backend.calls(), 3);
        if let Error::Unsatisfiable { conflicts, .. } = err {
            assert_eq!(conflicts, vec!["a".to_string(), "b".to_string()]);
        }
    }

    #[test]
    fn test_plan_does_not_call_backend() {
        let input = InputState::builder().add([spec("numpy")]).build().unwrap();
        let backend = Arc::new(ReplayBackend::new(Vec::new()));
        let index = RepoIndex::from_records("conda-forge", Vec::new());
        let config = ResolverConfig::default();
        let request = Resolver::new(backend.clone(), &index, &config)
            .plan(&input)
            .unwrap();

        assert_eq!(request.specs, vec![spec("numpy")]);
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_final_attempt_unfreezes_installed() {
        let input = InputState::builder()
            .installed([record("a", "1.0")])
            .add([spec("b")])
            .build()
            .unwrap();
        let (result, backend) = run(
            vec![
                ReplayStep::Conflict(
                    "a 1.0 is locked, but another version is required as reported above"
                        .to_string(),
                ),
                solved(&[record("a", "2.0"), record("b", "1.0")]),
            ],
            &input,
        );

        let resolution = result.unwrap();
        assert_eq!(resolution.attempts, 2);
        let tasks = backend.tasks();
        assert!(tasks[0].request.is_pinned("a"));
        assert!(!tasks[1].request.is_pinned("a"));
        assert!(!tasks[1].request.is_locked("a"));
    }

    /// Answers from a transcript, but only after the caller gave up
    struct LateBackend {
        replay: ReplayBackend,
        delay: Duration,
    }

    impl SolverBackend for LateBackend {
        fn solve(
            &self,
            task: &SolveTask,
        ) -> std::result::Result<Vec<SolverRecord>, SolveFailure> {
            let result = self.replay.solve(task);
            thread::sleep(self.delay);
            result
        }
    }

    #[test]
    fn test_timed_out_attempts_escalate_to_final_unfreeze() {
        let input = InputState::builder()
            .installed([record("a", "1.0"), record("b", "1.0")])
            .add([spec("c")])
            .build()
            .unwrap();
        let late = Arc::new(LateBackend {
            replay: ReplayBackend::new(vec![solved(&[
                record("a", "1.0"),
                record("b", "1.0"),
                record("c", "1.0"),
            ])]),
            delay: Duration::from_millis(100),
        });
        let backend = Arc::new(TimeoutBackend::from_arc(
            Arc::clone(&late),
            Duration::from_millis(20),
        ));
        let index = RepoIndex::from_records("conda-forge", Vec::new());
        let config = ResolverConfig::default();

        let err = Resolver::new(backend, &index, &config)
            .solve(&input)
            .unwrap_err();
        thread::sleep(Duration::from_millis(200));

        // A timeout reads as an empty diagnostic: both bounded attempts fail,
        // then everything installed is unfrozen
        match err {
            Error::Unsatisfiable { conflicts, .. } => {
                assert_eq!(conflicts, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let tasks = late.replay.tasks();
        assert_eq!(tasks.len(), 3);
        assert!(tasks[0].request.is_pinned("a") && tasks[0].request.is_pinned("b"));
        assert!(tasks[2].request.locked.is_empty());
        assert!(tasks[2].request.pinned.is_empty());
    }
}
