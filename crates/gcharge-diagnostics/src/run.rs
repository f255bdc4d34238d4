//! # Test Runs
//!
//! The data model of one diagnostic run: its ordered steps, the run state
//! machine and the summary handed to completion listeners.
//!
//! All transitions live on [`TestRun`] so they can be checked without timers;
//! the sequencer only decides *when* to apply them.

use crate::config::StepDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Result text of a step that passed
pub const RESULT_PASSED: &str = "Passed";
/// Result text of a step that failed
pub const RESULT_FAILED: &str = "Failed";
/// Result text of a step ended by cancellation
pub const RESULT_CANCELLED: &str = "Cancelled";

/// Status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// One diagnostic check inside a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    /// Percentage in `0..=100`
    pub progress: u8,
    /// Set only on the terminal transition
    pub result: Option<String>,
}

impl TestStep {
    fn pending(definition: StepDefinition) -> Self {
        Self {
            id: definition.id,
            name: definition.name,
            description: definition.description,
            status: StepStatus::Pending,
            progress: 0,
            result: None,
        }
    }

    fn start(&mut self) {
        self.status = StepStatus::Running;
        self.progress = 0;
    }

    fn finish(&mut self, status: StepStatus, result: &str) {
        self.status = status;
        self.progress = 100;
        self.result = Some(result.to_string());
    }

    pub fn definition(&self) -> StepDefinition {
        StepDefinition::new(&self.id, &self.name, &self.description)
    }
}

/// Run state machine
///
/// `Idle -> Running(0) -> ... -> Running(n - 1) -> Done`, with `Cancelled`
/// reachable from any `Running(i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum RunState {
    Idle,
    Running(usize),
    Done,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Progress notification delivered to step progress listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub run_id: Uuid,
    pub target_id: String,
    pub step_index: usize,
    pub step_id: String,
    pub status: StepStatus,
    pub progress: u8,
}

/// Outcome of a step as reported on completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub result: Option<String>,
}

/// Payload delivered once to completion listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub target_id: String,
    pub cancelled: bool,
    pub current_index: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<StepSummary>,
}

impl RunSummary {
    /// True when every step completed
    pub fn all_passed(&self) -> bool {
        !self.cancelled
            && self
                .results
                .iter()
                .all(|r| r.status == StepStatus::Completed)
    }

    pub fn passed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count()
    }

    /// Wall time of the run, if it has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Outcome of [`TestRun::finish_step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTransition {
    /// The next step is now running
    Advanced { next: usize },
    /// That was the last step
    Done,
}

/// One execution of a step battery against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub run_id: Uuid,
    pub target_id: String,
    pub steps: Vec<TestStep>,
    /// Running step, or `steps.len()` once the run has ended
    pub current_index: usize,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestRun {
    /// Create an idle run. Definitions are expected to be validated.
    pub fn new(run_id: Uuid, target_id: impl Into<String>, definitions: Vec<StepDefinition>) -> Self {
        Self {
            run_id,
            target_id: target_id.into(),
            steps: definitions.into_iter().map(TestStep::pending).collect(),
            current_index: 0,
            state: RunState::Idle,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.current_index == self.steps.len()
    }

    /// Index of the running step
    pub fn active_index(&self) -> Option<usize> {
        match self.state {
            RunState::Running(index) => Some(index),
            _ => None,
        }
    }

    pub fn active_step(&self) -> Option<&TestStep> {
        self.active_index().and_then(|i| self.steps.get(i))
    }

    /// `Idle -> Running(0)`. Returns false if the run was not idle.
    pub fn begin(&mut self) -> bool {
        if self.state != RunState::Idle || self.steps.is_empty() {
            return false;
        }
        self.started_at = Utc::now();
        self.current_index = 0;
        self.steps[0].start();
        self.state = RunState::Running(0);
        true
    }

    /// Bump the running step's progress, capped at 100
    ///
    /// Returns the new value, or `None` when nothing is running or the step is
    /// already at 100.
    pub fn advance_progress(&mut self, increment: u8) -> Option<u8> {
        let index = self.active_index()?;
        let step = &mut self.steps[index];
        if step.progress >= 100 {
            return None;
        }
        step.progress = step.progress.saturating_add(increment).min(100);
        Some(step.progress)
    }

    /// Record the verdict for the running step and move on
    pub fn finish_step(&mut self, passed: bool) -> Option<StepTransition> {
        let index = self.active_index()?;
        if passed {
            self.steps[index].finish(StepStatus::Completed, RESULT_PASSED);
        } else {
            self.steps[index].finish(StepStatus::Failed, RESULT_FAILED);
        }

        let next = index + 1;
        self.current_index = next;
        if next < self.steps.len() {
            self.steps[next].start();
            self.state = RunState::Running(next);
            Some(StepTransition::Advanced { next })
        } else {
            self.state = RunState::Done;
            self.completed_at = Some(Utc::now());
            Some(StepTransition::Done)
        }
    }

    /// Fail the running and pending steps with `"Cancelled"`
    ///
    /// Returns the indices of the steps that changed, or `None` if the run had
    /// already ended.
    pub fn cancel(&mut self) -> Option<Vec<usize>> {
        if self.is_terminal() {
            return None;
        }

        let mut changed = Vec::new();
        for (index, step) in self.steps.iter_mut().enumerate() {
            if !step.status.is_terminal() {
                step.finish(StepStatus::Failed, RESULT_CANCELLED);
                changed.push(index);
            }
        }

        self.current_index = self.steps.len();
        self.state = RunState::Cancelled;
        self.completed_at = Some(Utc::now());
        Some(changed)
    }

    pub fn progress_of(&self, index: usize) -> Option<StepProgress> {
        let step = self.steps.get(index)?;
        Some(StepProgress {
            run_id: self.run_id,
            target_id: self.target_id.clone(),
            step_index: index,
            step_id: step.id.clone(),
            status: step.status,
            progress: step.progress,
        })
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            target_id: self.target_id.clone(),
            cancelled: self.state == RunState::Cancelled,
            current_index: self.current_index,
            started_at: self.started_at,
            completed_at: self.completed_at,
            results: self
                .steps
                .iter()
                .map(|s| StepSummary {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    status: s.status,
                    result: s.result.clone(),
                })
                .collect(),
        }
    }

    /// Check the structural invariants of the run
    pub fn check_invariants(&self) -> Result<(), String> {
        let running = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Running)
            .count();

        for step in &self.steps {
            if step.status == StepStatus::Pending && step.progress != 0 {
                return Err(format!("pending step '{}' has progress", step.id));
            }
            if step.status.is_terminal() && step.progress != 100 {
                return Err(format!("terminal step '{}' below 100", step.id));
            }
        }

        match self.state {
            RunState::Idle => {
                if running != 0 {
                    return Err("idle run has a running step".to_string());
                }
            }
            RunState::Running(index) => {
                let Some(active) = self.steps.get(index) else {
                    return Err(format!(
                        "running index {} out of range for {} steps",
                        index,
                        self.steps.len()
                    ));
                };
                if running != 1 || active.status != StepStatus::Running {
                    return Err(format!("step {} is not the single running step", index));
                }
                if self.steps[..index].iter().any(|s| !s.status.is_terminal()) {
                    return Err(format!("a step before {} is not terminal", index));
                }
                if self.steps[index + 1..]
                    .iter()
                    .any(|s| s.status != StepStatus::Pending)
                {
                    return Err(format!("a step after {} has started", index));
                }
            }
            RunState::Done | RunState::Cancelled => {
                if !self.is_complete() || self.steps.iter().any(|s| !s.status.is_terminal()) {
                    return Err("ended run has unfinished steps".to_string());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::station_battery;

    fn station_run() -> TestRun {
        TestRun::new(Uuid::new_v4(), "CS001", station_battery().steps)
    }

    #[test]
    fn test_begin_runs_first_step() {
        let mut run = station_run();
        assert_eq!(run.state, RunState::Idle);
        assert!(run.check_invariants().is_ok());

        assert!(run.begin());
        assert_eq!(run.state, RunState::Running(0));
        assert_eq!(run.steps[0].status, StepStatus::Running);
        assert!(run.check_invariants().is_ok());

        assert!(!run.begin());
    }

    #[test]
    fn test_progress_is_capped() {
        let mut run = station_run();
        assert_eq!(run.advance_progress(10), None);

        run.begin();
        assert_eq!(run.advance_progress(30), Some(30));
        assert_eq!(run.advance_progress(30), Some(60));
        assert_eq!(run.advance_progress(30), Some(90));
        assert_eq!(run.advance_progress(30), Some(100));
        assert_eq!(run.advance_progress(30), None);
    }

    #[test]
    fn test_failed_step_does_not_halt_run() {
        let mut run = station_run();
        run.begin();

        assert_eq!(
            run.finish_step(true),
            Some(StepTransition::Advanced { next: 1 })
        );
        assert_eq!(
            run.finish_step(false),
            Some(StepTransition::Advanced { next: 2 })
        );
        assert_eq!(run.steps[1].result.as_deref(), Some(RESULT_FAILED));
        assert_eq!(run.steps[2].status, StepStatus::Running);
        assert!(run.check_invariants().is_ok());

        run.finish_step(true);
        run.finish_step(true);
        assert_eq!(run.finish_step(true), Some(StepTransition::Done));
        assert_eq!(run.state, RunState::Done);
        assert_eq!(run.current_index, 5);
        assert!(run.completed_at.is_some());
        assert!(run.check_invariants().is_ok());

        assert_eq!(run.finish_step(true), None);
    }

    #[test]
    fn test_cancel_marks_remaining_steps() {
        let mut run = station_run();
        run.begin();
        run.finish_step(true);
        run.advance_progress(40);

        let changed = run.cancel().unwrap();
        assert_eq!(changed, vec![1, 2, 3, 4]);
        assert_eq!(run.state, RunState::Cancelled);
        assert_eq!(run.current_index, 5);
        assert_eq!(run.steps[0].result.as_deref(), Some(RESULT_PASSED));
        for step in &run.steps[1..] {
            assert_eq!(step.status, StepStatus::Failed);
            assert_eq!(step.result.as_deref(), Some(RESULT_CANCELLED));
            assert_eq!(step.progress, 100);
        }
        assert!(run.check_invariants().is_ok());

        assert!(run.cancel().is_none());
    }

    #[test]
    fn test_invariants_reject_out_of_range_index() {
        let mut run = station_run();
        run.begin();
        run.state = RunState::Running(99);

        let err = run.check_invariants().unwrap_err();
        assert!(err.contains("out of range"));

        let json = serde_json::to_string(&run).unwrap();
        let restored: TestRun = serde_json::from_str(&json).unwrap();
        assert!(restored.check_invariants().is_err());
    }

    #[test]
    fn test_summary_counts() {
        let mut run = station_run();
        run.begin();
        for passed in [true, true, false, true, true] {
            run.finish_step(passed);
        }

        let summary = run.summary();
        assert!(!summary.cancelled);
        assert!(!summary.all_passed());
        assert_eq!(summary.passed_count(), 4);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.results[2].name, "Safety Systems");
        assert!(summary.duration().is_some());
    }
}
