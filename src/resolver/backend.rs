// src/resolver/backend.rs

//! Solver backends
//!
//! The constraint solver itself is external. The loop only needs one
//! blocking call per attempt that either returns records or a diagnostic.

use crate::error::Result;
use crate::packages::SolverRecord;
use crate::state::VirtualPackage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use super::request::SolveRequest;

/// How channel order affects candidate selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelPriority {
    /// A package only comes from the highest priority channel that has it
    #[default]
    Strict,
    /// Channels are merged
    Disabled,
}

/// Which candidate versions the solver tries first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolveStrategy {
    #[default]
    Highest,
    Lowest,
    /// Lowest versions for direct requests, highest for the rest
    LowestDirect,
}

/// Everything one solver call receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveTask {
    pub request: SolveRequest,
    pub virtual_packages: Vec<VirtualPackage>,
    pub channel_priority: ChannelPriority,
    pub strategy: SolveStrategy,
}

/// A failed solver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveFailure {
    /// Free text explanation; may be empty
    pub diagnostic: String,
}

impl SolveFailure {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }

    /// Treated like any other failure with nothing to interpret
    pub fn timed_out() -> Self {
        Self::new(String::new())
    }
}

/// A constraint solver the resolution loop can call
pub trait SolverBackend: Send + Sync {
    /// Solve one request; calls are independent of each other
    fn solve(&self, task: &SolveTask) -> std::result::Result<Vec<SolverRecord>, SolveFailure>;
}

impl<B: SolverBackend + ?Sized> SolverBackend for Arc<B> {
    fn solve(&self, task: &SolveTask) -> std::result::Result<Vec<SolverRecord>, SolveFailure> {
        (**self).solve(task)
    }
}

/// Bounds each call of an inner backend by wall clock time
///
/// The call runs on a worker thread. A worker that overruns has its result
/// dropped but is not abandoned: the next call waits for it to exit before
/// starting its own worker, so the inner backend never sees two calls at
/// once and stateful backends observe tasks in call order.
pub struct TimeoutBackend<B: ?Sized> {
    inner: Arc<B>,
    timeout: Duration,
    /// Worker of the last call that timed out
    overrun: Mutex<Option<JoinHandle<()>>>,
}

impl<B: SolverBackend + 'static> TimeoutBackend<B> {
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self::from_arc(Arc::new(inner), timeout)
    }
}

impl<B: SolverBackend + ?Sized + 'static> TimeoutBackend<B> {
    pub fn from_arc(inner: Arc<B>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            overrun: Mutex::new(None),
        }
    }
}

impl<B: SolverBackend + ?Sized + 'static> SolverBackend for TimeoutBackend<B> {
    fn solve(&self, task: &SolveTask) -> std::result::Result<Vec<SolverRecord>, SolveFailure> {
        // Held for the whole call; concurrent callers queue up here
        let mut overrun = self.overrun.lock();
        if let Some(worker) = overrun.take() {
            debug!("Waiting for the timed out solver call to finish");
            if worker.join().is_err() {
                warn!("Timed out solver call panicked");
            }
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let task = task.clone();

        let worker = thread::Builder::new()
            .name("envsolve-solver".to_string())
            .spawn(move || {
                // The receiver may be gone after a timeout
                let _ = tx.send(inner.solve(&task));
            })
            .map_err(|e| SolveFailure::new(format!("could not start solver thread: {}", e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                let _ = worker.join();
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Solver call timed out after {:?}", self.timeout);
                *overrun = Some(worker);
                Err(SolveFailure::timed_out())
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                Err(SolveFailure::new("solver thread exited without a result"))
            }
        }
    }
}

/// One recorded solver response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStep {
    Solution(Vec<SolverRecord>),
    Conflict(String),
}

#[derive(Debug, Default)]
struct ReplayState {
    next: usize,
    tasks: Vec<SolveTask>,
}

/// Plays back a recorded transcript of solver responses
///
/// Responses are returned in order and the last one repeats. Every task
/// received is kept for inspection.
#[derive(Debug)]
pub struct ReplayBackend {
    steps: Vec<ReplayStep>,
    state: Mutex<ReplayState>,
}

impl ReplayBackend {
    pub fn new(steps: Vec<ReplayStep>) -> Self {
        Self {
            steps,
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Parse a JSON array of steps
    pub fn from_json(content: &str) -> Result<Self> {
        let steps: Vec<ReplayStep> = serde_json::from_str(content)?;
        Ok(Self::new(steps))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Tasks received so far, in call order
    pub fn tasks(&self) -> Vec<SolveTask> {
        self.state.lock().tasks.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

impl SolverBackend for ReplayBackend {
    fn solve(&self, task: &SolveTask) -> std::result::Result<Vec<SolverRecord>, SolveFailure> {
        let mut state = self.state.lock();
        state.tasks.push(task.clone());
        let step = self.steps.get(state.next).or(self.steps.last());
        state.next += 1;

        match step {
            Some(ReplayStep::Solution(records)) => Ok(records.clone()),
            Some(ReplayStep::Conflict(diagnostic)) => Err(SolveFailure::new(diagnostic.clone())),
            None => Err(SolveFailure::new("replay transcript is empty")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task() -> SolveTask {
        SolveTask {
            request: SolveRequest::new(),
            virtual_packages: Vec::new(),
            channel_priority: ChannelPriority::Strict,
            strategy: SolveStrategy::Highest,
        }
    }

    fn solver_record(name: &str) -> SolverRecord {
        SolverRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            build: "0".to_string(),
            ..SolverRecord::default()
        }
    }

    struct SlowBackend(Duration);

    /// Slow backend that tracks how many calls overlap
    #[derive(Default)]
    struct OverlapBackend {
        active: AtomicUsize,
        max_active: AtomicUsize,
        started: AtomicUsize,
    }

    impl SolverBackend for OverlapBackend {
        fn solve(&self, _task: &SolveTask) -> std::result::Result<Vec<SolverRecord>, SolveFailure> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Err(SolveFailure::new("too slow anyway"))
        }
    }

    impl SolverBackend for SlowBackend {
        fn solve(&self, _task: &SolveTask) -> std::result::Result<Vec<SolverRecord>, SolveFailure> {
            thread::sleep(self.0);
            Ok(vec![solver_record("late")])
        }
    }

    #[test]
    fn test_replay_repeats_last_step() {
        let backend = ReplayBackend::new(vec![
            ReplayStep::Conflict("the constraint a 1 cannot be fulfilled".to_string()),
            ReplayStep::Solution(vec![solver_record("a")]),
        ]);

        assert!(backend.solve(&task()).is_err());
        assert_eq!(backend.solve(&task()).unwrap()[0].name, "a");
        assert_eq!(backend.solve(&task()).unwrap()[0].name, "a");
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_replay_from_json() {
        let json = r#"[
            {"conflict": "No candidates were found for foo."},
            {"solution": [{"name": "foo", "version": "1.0", "build": "0"}]}
        ]"#;
        let backend = ReplayBackend::from_json(json).unwrap();
        let failure = backend.solve(&task()).unwrap_err();
        assert_eq!(failure.diagnostic, "No candidates were found for foo.");
        assert_eq!(backend.solve(&task()).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_replay_fails() {
        let backend = ReplayBackend::new(Vec::new());
        assert!(backend.solve(&task()).is_err());
    }

    #[test]
    fn test_timeout_yields_empty_diagnostic() {
        let backend = TimeoutBackend::new(
            SlowBackend(Duration::from_millis(500)),
            Duration::from_millis(20),
        );
        let failure = backend.solve(&task()).unwrap_err();
        assert_eq!(failure, SolveFailure::timed_out());
    }

    #[test]
    fn test_timeout_passes_fast_results() {
        let backend = TimeoutBackend::new(
            SlowBackend(Duration::from_millis(1)),
            Duration::from_secs(5),
        );
        assert_eq!(backend.solve(&task()).unwrap()[0].name, "late");
    }

    #[test]
    fn test_timed_out_call_finishes_before_next_starts() {
        let inner = Arc::new(OverlapBackend::default());
        let backend = TimeoutBackend::from_arc(Arc::clone(&inner), Duration::from_millis(10));

        for _ in 0..3 {
            assert_eq!(backend.solve(&task()).unwrap_err(), SolveFailure::timed_out());
        }
        thread::sleep(Duration::from_millis(250));

        assert_eq!(inner.started.load(Ordering::SeqCst), 3);
        assert_eq!(inner.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(inner.active.load(Ordering::SeqCst), 0);
    }
}
