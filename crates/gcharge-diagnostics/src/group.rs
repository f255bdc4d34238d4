//! Diagnostics across a group of stations
//!
//! A group run starts one ordinary run per member. Members already under
//! test are skipped rather than failing the whole request.

use crate::config::{validate_steps, StepDefinition};
use crate::error::{DiagnosticsError, DiagnosticsResult};
use crate::run::RunSummary;
use crate::sequencer::{DiagnosticSequencer, TestRunHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Pick steps by id from a battery, keeping the battery's order
///
/// An empty selection keeps every step.
pub fn select_steps(
    steps: &[StepDefinition],
    ids: &[String],
) -> DiagnosticsResult<Vec<StepDefinition>> {
    if ids.is_empty() {
        return Ok(steps.to_vec());
    }

    if let Some(unknown) = ids.iter().find(|id| !steps.iter().any(|s| &s.id == *id)) {
        return Err(DiagnosticsError::resource_not_found("step", unknown.as_str()));
    }

    Ok(steps
        .iter()
        .filter(|s| ids.contains(&s.id))
        .cloned()
        .collect())
}

impl DiagnosticSequencer {
    /// Start `steps` against every target of a group
    ///
    /// Targets with a run in progress are skipped. Fails if the request is
    /// malformed or no target could be started.
    pub fn start_group(
        &self,
        group_id: &str,
        targets: &[String],
        steps: Vec<StepDefinition>,
    ) -> DiagnosticsResult<GroupRunHandle> {
        if group_id.trim().is_empty() {
            return Err(DiagnosticsError::configuration("group id must not be empty"));
        }
        if targets.is_empty() {
            return Err(DiagnosticsError::configuration(format!(
                "group '{}' has no targets",
                group_id
            )));
        }
        let mut seen = HashSet::new();
        for target in targets {
            if target.trim().is_empty() {
                return Err(DiagnosticsError::configuration("target id must not be empty"));
            }
            if !seen.insert(target.as_str()) {
                return Err(DiagnosticsError::configuration(format!(
                    "target '{}' listed twice in group '{}'",
                    target, group_id
                )));
            }
        }
        validate_steps(&steps)?;

        let mut runs = Vec::with_capacity(targets.len());
        let mut skipped = Vec::new();
        for target in targets {
            match self.start(target.as_str(), steps.clone()) {
                Ok(handle) => runs.push(handle),
                Err(DiagnosticsError::AlreadyRunningError { .. }) => {
                    warn!("Group {}: skipping {}, already under test", group_id, target);
                    skipped.push(target.clone());
                }
                Err(e) => return Err(e),
            }
        }

        if runs.is_empty() {
            return Err(DiagnosticsError::already_running(group_id));
        }

        info!(
            "Started group diagnostics {}: {} runs, {} skipped",
            group_id,
            runs.len(),
            skipped.len()
        );
        Ok(GroupRunHandle {
            group_id: group_id.to_string(),
            runs,
            skipped,
        })
    }
}

/// Handles to the runs of one group request
#[derive(Clone)]
pub struct GroupRunHandle {
    group_id: String,
    runs: Vec<TestRunHandle>,
    skipped: Vec<String>,
}

impl GroupRunHandle {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn runs(&self) -> &[TestRunHandle] {
        &self.runs
    }

    /// Targets that were busy when the group started
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Cancel every run still going; returns how many this call ended
    pub async fn cancel(&self) -> usize {
        let mut cancelled = 0;
        for run in &self.runs {
            if run.cancel().await {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Wait for every run, in target order
    pub async fn wait(&self) -> GroupSummary {
        let mut runs = Vec::with_capacity(self.runs.len());
        for run in &self.runs {
            runs.push(run.wait().await);
        }
        GroupSummary {
            group_id: self.group_id.clone(),
            runs,
            skipped: self.skipped.clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.runs.iter().all(TestRunHandle::is_finished)
    }
}

/// Outcome of a group request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub runs: Vec<RunSummary>,
    pub skipped: Vec<String>,
}

impl GroupSummary {
    /// Every target ran and passed every step
    pub fn all_passed(&self) -> bool {
        self.skipped.is_empty() && self.runs.iter().all(RunSummary::all_passed)
    }

    /// Targets with at least one failed or cancelled step
    pub fn failed_targets(&self) -> Vec<&str> {
        self.runs
            .iter()
            .filter(|r| !r.all_passed())
            .map(|r| r.target_id.as_str())
            .collect()
    }
}
