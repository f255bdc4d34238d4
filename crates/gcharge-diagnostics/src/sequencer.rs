//! # Diagnostic Sequencer
//!
//! Drives a step battery against one target, one step at a time.
//!
//! Each run owns two tasks. The driver advances the run on the configured
//! cadence and asks the evaluator for a verdict. The dispatcher drains the
//! run's ordered channel and invokes listeners, so callbacks for one run never
//! overlap and arrive in mutation order. Every mutation happens under the
//! run's lock and is queued before the lock is released; callbacks run
//! outside the lock.

use crate::config::{validate_steps, DiagnosticsConfig, StepDefinition};
use crate::error::{DiagnosticsError, DiagnosticsResult};
use crate::evaluator::StepEvaluator;
use crate::events::{DiagnosticEvent, DiagnosticEventHandler};
use crate::run::{RunState, RunSummary, StepProgress, StepTransition, TestRun};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Listener for step progress changes
pub type ProgressCallback = Arc<dyn Fn(&StepProgress) + Send + Sync>;
/// Listener for run completion
pub type CompleteCallback = Arc<dyn Fn(&RunSummary) + Send + Sync>;

/// Target id to the id of the run holding it
type ActiveRuns = Arc<DashMap<String, Uuid>>;

#[derive(Clone, Default)]
struct Listeners {
    progress: Vec<ProgressCallback>,
    complete: Vec<CompleteCallback>,
    handlers: Vec<Arc<dyn DiagnosticEventHandler>>,
}

enum Emission {
    Progress(StepProgress),
    Event(DiagnosticEvent),
    /// Last item a dispatcher handles
    Complete(RunSummary),
}

/// Sending half of a run's ordered channel
struct Emitter(mpsc::UnboundedSender<Emission>);

impl Emitter {
    fn send(&self, emission: Emission) {
        // The dispatcher stops after the completion payload; later sends are dropped.
        let _ = self.0.send(emission);
    }

    fn progress(&self, run: &TestRun, index: usize) {
        if let Some(progress) = run.progress_of(index) {
            self.send(Emission::Progress(progress));
        }
    }

    fn run_started(&self, run: &TestRun) {
        self.send(Emission::Event(DiagnosticEvent::RunStarted {
            run_id: run.run_id,
            target_id: run.target_id.clone(),
            step_count: run.steps.len(),
            timestamp: Utc::now(),
        }));
    }

    fn step_started(&self, run: &TestRun, index: usize) {
        self.send(Emission::Event(DiagnosticEvent::StepStarted {
            run_id: run.run_id,
            target_id: run.target_id.clone(),
            step_index: index,
            step_id: run.steps[index].id.clone(),
            timestamp: Utc::now(),
        }));
        self.progress(run, index);
    }

    fn step_progressed(&self, run: &TestRun, index: usize) {
        self.send(Emission::Event(DiagnosticEvent::StepProgressed {
            run_id: run.run_id,
            target_id: run.target_id.clone(),
            step_index: index,
            progress: run.steps[index].progress,
            timestamp: Utc::now(),
        }));
        self.progress(run, index);
    }

    fn step_finished(&self, run: &TestRun, index: usize) {
        let step = &run.steps[index];
        self.send(Emission::Event(DiagnosticEvent::StepFinished {
            run_id: run.run_id,
            target_id: run.target_id.clone(),
            step_index: index,
            step_id: step.id.clone(),
            status: step.status,
            result: step.result.clone().unwrap_or_default(),
            timestamp: Utc::now(),
        }));
        self.progress(run, index);
    }

    fn run_completed(&self, run: &TestRun) {
        let summary = run.summary();
        self.send(Emission::Event(DiagnosticEvent::RunCompleted {
            run_id: run.run_id,
            target_id: run.target_id.clone(),
            passed: summary.passed_count(),
            failed: summary.failed_count(),
            timestamp: Utc::now(),
        }));
        self.send(Emission::Complete(summary));
    }

    fn run_cancelled(&self, run: &TestRun, interrupted: Option<usize>, changed: &[usize]) {
        for &index in changed {
            self.step_finished(run, index);
        }
        self.send(Emission::Event(DiagnosticEvent::RunCancelled {
            run_id: run.run_id,
            target_id: run.target_id.clone(),
            step_index: interrupted,
            timestamp: Utc::now(),
        }));
        self.send(Emission::Complete(run.summary()));
    }
}

/// State shared by a run's handle and its driver
struct RunShared {
    run: Mutex<TestRun>,
    emitter: Emitter,
    cancelled: Notify,
    completion: watch::Receiver<Option<RunSummary>>,
    active: ActiveRuns,
}

impl RunShared {
    /// Free the target, unless a newer run already holds it
    fn release_target(&self, run: &TestRun) {
        self.active
            .remove_if(&run.target_id, |_, run_id| *run_id == run.run_id);
    }
}

/// Runs diagnostic batteries against targets
///
/// Listeners and handlers are registered up front and receive every run
/// started afterwards, including each run's first `Running(0)` update.
pub struct DiagnosticSequencer {
    config: Arc<DiagnosticsConfig>,
    evaluator: Arc<dyn StepEvaluator>,
    listeners: Listeners,
    active: ActiveRuns,
}

impl DiagnosticSequencer {
    /// Create a new sequencer
    ///
    /// Fails with a configuration error if `config` does not validate.
    pub fn new(
        config: DiagnosticsConfig,
        evaluator: impl StepEvaluator + 'static,
    ) -> DiagnosticsResult<Self> {
        Self::with_evaluator(config, Arc::new(evaluator))
    }

    /// Create a sequencer around a shared evaluator
    pub fn with_evaluator(
        config: DiagnosticsConfig,
        evaluator: Arc<dyn StepEvaluator>,
    ) -> DiagnosticsResult<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            evaluator,
            listeners: Listeners::default(),
            active: Arc::new(DashMap::new()),
        })
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// Register a listener for every progress change
    ///
    /// Listeners run on the run's dispatcher task and should return quickly.
    /// A listener that panics is logged and skipped; later listeners and the
    /// completion payload are still delivered.
    pub fn on_step_progress<F>(&mut self, callback: F)
    where
        F: Fn(&StepProgress) + Send + Sync + 'static,
    {
        self.listeners.progress.push(Arc::new(callback));
    }

    /// Register a listener invoked once per run when it ends
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: Fn(&RunSummary) + Send + Sync + 'static,
    {
        self.listeners.complete.push(Arc::new(callback));
    }

    /// Register an event handler
    ///
    /// Handlers are awaited in order on the dispatcher task and must not panic:
    /// a panicking handler ends delivery for that run, and `wait()` then falls
    /// back to the run's current snapshot.
    pub fn add_handler(&mut self, handler: impl DiagnosticEventHandler + 'static) {
        self.listeners.handlers.push(Arc::new(handler));
    }

    /// Whether a run currently holds `target_id`
    pub fn is_running(&self, target_id: &str) -> bool {
        self.active.contains_key(target_id)
    }

    /// Targets with a run in progress, sorted
    pub fn active_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        targets.sort_unstable();
        targets
    }

    /// Start a configured battery against `target_id`
    pub fn start_battery(&self, target_id: &str, battery: &str) -> DiagnosticsResult<TestRunHandle> {
        let definition = self
            .config
            .get_battery(battery)
            .ok_or_else(|| DiagnosticsError::resource_not_found("battery", battery))?;
        self.start(target_id, definition.steps.clone())
    }

    /// Start a run
    ///
    /// The first step is already `Running` when this returns. Must be called
    /// from within a tokio runtime.
    pub fn start(
        &self,
        target_id: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> DiagnosticsResult<TestRunHandle> {
        let target_id = target_id.into();
        if target_id.trim().is_empty() {
            return Err(DiagnosticsError::configuration("target id must not be empty"));
        }
        validate_steps(&steps)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DiagnosticsError::configuration("diagnostic runs require a tokio runtime")
        })?;

        let run_id = Uuid::new_v4();
        match self.active.entry(target_id.clone()) {
            Entry::Occupied(entry) => {
                warn!(
                    "Rejecting diagnostics for {}: run {} in progress",
                    target_id,
                    entry.get()
                );
                return Err(DiagnosticsError::already_running(target_id));
            }
            Entry::Vacant(entry) => {
                entry.insert(run_id);
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = watch::channel(None);
        let emitter = Emitter(sender);

        let mut run = TestRun::new(run_id, target_id.clone(), steps);
        run.begin();
        emitter.run_started(&run);
        emitter.step_started(&run, 0);

        info!(
            "Starting diagnostics run {} on {} ({} steps)",
            run_id,
            target_id,
            run.steps.len()
        );

        let shared = Arc::new(RunShared {
            run: Mutex::new(run),
            emitter,
            cancelled: Notify::new(),
            completion: completion_rx,
            active: Arc::clone(&self.active),
        });

        runtime.spawn(dispatch(
            receiver,
            Arc::new(self.listeners.clone()),
            completion_tx,
        ));
        runtime.spawn(drive(
            Arc::clone(&shared),
            Arc::clone(&self.config),
            Arc::clone(&self.evaluator),
        ));

        Ok(TestRunHandle {
            run_id,
            target_id,
            shared,
        })
    }
}

/// Handle to a started run
///
/// Dropping every handle does not stop the run.
#[derive(Clone)]
pub struct TestRunHandle {
    run_id: Uuid,
    target_id: String,
    shared: Arc<RunShared>,
}

impl TestRunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Copy of the live run state
    pub async fn snapshot(&self) -> TestRun {
        self.shared.run.lock().await.clone()
    }

    /// Cancel the run
    ///
    /// Returns `true` if this call ended the run; `false` if it had already
    /// completed or been cancelled.
    pub async fn cancel(&self) -> bool {
        let mut run = self.shared.run.lock().await;
        let interrupted = run.active_index();
        let changed = match run.cancel() {
            Some(changed) => changed,
            None => {
                debug!("Run {} already ended; cancel ignored", self.run_id);
                return false;
            }
        };

        self.shared.release_target(&run);
        self.shared
            .emitter
            .run_cancelled(&run, interrupted, &changed);
        drop(run);

        self.shared.cancelled.notify_one();
        info!(
            "Cancelled diagnostics run {} on {}",
            self.run_id, self.target_id
        );
        true
    }

    /// Wait until completion listeners have seen the run's summary
    pub async fn wait(&self) -> RunSummary {
        let mut completion = self.shared.completion.clone();
        let delivered = completion
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|summary| (*summary).clone());

        match delivered {
            Some(summary) => summary,
            // Dispatcher is gone; report the state as it stands.
            None => self.shared.run.lock().await.summary(),
        }
    }

    /// Whether completion listeners have been invoked
    pub fn is_finished(&self) -> bool {
        self.shared.completion.borrow().is_some()
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Emission>,
    listeners: Arc<Listeners>,
    completion: watch::Sender<Option<RunSummary>>,
) {
    while let Some(emission) = receiver.recv().await {
        match emission {
            Emission::Progress(progress) => {
                notify(&listeners.progress, &progress, "progress");
            }
            Emission::Event(event) => {
                for handler in &listeners.handlers {
                    handler.handle_event(event.clone()).await;
                }
            }
            Emission::Complete(summary) => {
                notify(&listeners.complete, &summary, "completion");
                completion.send_replace(Some(summary));
                return;
            }
        }
    }
}

/// Invoke every callback; a panicking one is logged and skipped
fn notify<T>(callbacks: &[Arc<dyn Fn(&T) + Send + Sync>], payload: &T, kind: &str) {
    for callback in callbacks {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
            error!("A {} listener panicked; remaining listeners still run", kind);
        }
    }
}

async fn drive(
    shared: Arc<RunShared>,
    config: Arc<DiagnosticsConfig>,
    evaluator: Arc<dyn StepEvaluator>,
) {
    let tick = config.tick_interval();

    loop {
        let (index, definition, target_id) = {
            let run = shared.run.lock().await;
            match run.active_index() {
                Some(index) => (index, run.steps[index].definition(), run.target_id.clone()),
                None => return,
            }
        };

        debug!("Running step {} '{}' on {}", index, definition.id, target_id);

        let started = Instant::now();
        let deadline = started + config.evaluation_delay();
        let mut ticker = time::interval_at(started + tick, tick);

        loop {
            tokio::select! {
                biased;
                _ = shared.cancelled.notified() => return,
                _ = ticker.tick() => {
                    let mut run = shared.run.lock().await;
                    if run.state != RunState::Running(index) {
                        return;
                    }
                    if run.advance_progress(config.progress_increment).is_some() {
                        shared.emitter.step_progressed(&run, index);
                    }
                }
                _ = time::sleep_until(deadline) => break,
            }
        }

        let passed = tokio::select! {
            biased;
            _ = shared.cancelled.notified() => return,
            outcome = time::timeout(
                config.evaluation_timeout(),
                evaluator.evaluate(&target_id, &definition),
            ) => match outcome {
                Ok(passed) => passed,
                Err(_) => {
                    warn!(
                        "Step '{}' on {} gave no verdict within {:?}; marking failed",
                        definition.id,
                        target_id,
                        config.evaluation_timeout()
                    );
                    false
                }
            },
        };

        let mut run = shared.run.lock().await;
        if run.state != RunState::Running(index) {
            return;
        }

        let transition = run.finish_step(passed);
        debug!(
            "Step '{}' on {} {}",
            definition.id,
            target_id,
            if passed { "passed" } else { "failed" }
        );
        shared.emitter.step_finished(&run, index);

        match transition {
            Some(StepTransition::Advanced { next }) => {
                shared.emitter.step_started(&run, next);
            }
            Some(StepTransition::Done) => {
                shared.release_target(&run);
                let summary = run.summary();
                info!(
                    "Diagnostics run {} on {} finished: {} passed, {} failed",
                    run.run_id,
                    target_id,
                    summary.passed_count(),
                    summary.failed_count()
                );
                shared.emitter.run_completed(&run);
                return;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{station_battery, DEVICE_BATTERY, STATION_BATTERY};
    use crate::evaluator::ScriptedEvaluator;
    use crate::run::{StepStatus, RESULT_CANCELLED, RESULT_FAILED, RESULT_PASSED};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    type Recorded<T> = Arc<StdMutex<Vec<T>>>;

    fn recorded<T>() -> Recorded<T> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    struct RecordingHandler(Recorded<DiagnosticEvent>);

    #[async_trait::async_trait]
    impl DiagnosticEventHandler for RecordingHandler {
        async fn handle_event(&self, event: DiagnosticEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct SlowEvaluator;

    #[async_trait::async_trait]
    impl StepEvaluator for SlowEvaluator {
        async fn evaluate(&self, _target_id: &str, _step: &StepDefinition) -> bool {
            time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    fn passing_sequencer() -> DiagnosticSequencer {
        DiagnosticSequencer::new(DiagnosticsConfig::default(), ScriptedEvaluator::passing())
            .unwrap()
    }

    fn recording_sequencer(
        evaluator: impl StepEvaluator + 'static,
    ) -> (
        DiagnosticSequencer,
        Recorded<StepProgress>,
        Recorded<RunSummary>,
        Recorded<DiagnosticEvent>,
    ) {
        let progress = recorded();
        let completed = recorded();
        let events = recorded();

        let mut sequencer = DiagnosticSequencer::new(DiagnosticsConfig::default(), evaluator)
            .unwrap();
        let sink = Arc::clone(&progress);
        sequencer.on_step_progress(move |p| sink.lock().unwrap().push(p.clone()));
        let sink = Arc::clone(&completed);
        sequencer.on_complete(move |s| sink.lock().unwrap().push(s.clone()));
        sequencer.add_handler(RecordingHandler(Arc::clone(&events)));

        (sequencer, progress, completed, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_run_with_failing_safety() {
        let (sequencer, _, completed, _) = recording_sequencer(|id: &str| id != "safety");

        let handle = sequencer.start("CS001", station_battery().steps).unwrap();
        assert!(sequencer.is_running("CS001"));

        let summary = handle.wait().await;
        let outcome: Vec<(&str, StepStatus)> = summary
            .results
            .iter()
            .map(|r| (r.name.as_str(), r.status))
            .collect();
        assert_eq!(
            outcome,
            vec![
                ("Power System Test", StepStatus::Completed),
                ("Network Connectivity", StepStatus::Completed),
                ("Safety Systems", StepStatus::Failed),
                ("Temperature Sensors", StepStatus::Completed),
                ("Authorization System", StepStatus::Completed),
            ]
        );
        assert_eq!(summary.current_index, 5);
        assert!(!summary.cancelled);
        assert!(!summary.all_passed());
        assert_eq!(summary.results[2].result.as_deref(), Some(RESULT_FAILED));
        assert_eq!(summary.results[0].result.as_deref(), Some(RESULT_PASSED));

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.state, RunState::Done);
        assert!(snapshot.completed_at.is_some());
        assert!(snapshot.check_invariants().is_ok());

        assert_eq!(completed.lock().unwrap().len(), 1);
        assert!(handle.is_finished());
        assert!(!sequencer.is_running("CS001"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_step_running_on_start() {
        let (sequencer, progress, _, _) = recording_sequencer(ScriptedEvaluator::passing());

        let handle = sequencer.start("CS001", station_battery().steps).unwrap();
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.state, RunState::Running(0));
        assert_eq!(snapshot.steps[0].status, StepStatus::Running);
        assert!(snapshot.check_invariants().is_ok());

        handle.wait().await;
        let first = progress.lock().unwrap()[0].clone();
        assert_eq!(first.step_index, 0);
        assert_eq!(first.status, StepStatus::Running);
        assert_eq!(first.progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_run_in_order_one_at_a_time() {
        let (sequencer, _, _, events) = recording_sequencer(ScriptedEvaluator::passing());
        let handle = sequencer.start("CS001", station_battery().steps).unwrap();

        while !handle.is_finished() {
            let snapshot = handle.snapshot().await;
            snapshot.check_invariants().unwrap();
            time::sleep(Duration::from_millis(150)).await;
        }

        let order: Vec<(&'static str, usize)> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                DiagnosticEvent::StepStarted { step_index, .. } => Some(("start", *step_index)),
                DiagnosticEvent::StepFinished { step_index, .. } => Some(("finish", *step_index)),
                _ => None,
            })
            .collect();

        let mut expected = Vec::new();
        for index in 0..5 {
            expected.push(("start", index));
            expected.push(("finish", index));
        }
        assert_eq!(order, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let (sequencer, progress, _, _) = recording_sequencer(ScriptedEvaluator::passing());
        sequencer
            .start("CS001", station_battery().steps)
            .unwrap()
            .wait()
            .await;

        let progress = progress.lock().unwrap();
        for index in 0..5 {
            let values: Vec<u8> = progress
                .iter()
                .filter(|p| p.step_index == index)
                .map(|p| p.progress)
                .collect();
            assert!(values.len() > 2, "step {} reported {:?}", index, values);
            assert!(values.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(values.first(), Some(&0));
            assert_eq!(values.last(), Some(&100));
        }

        let indices: Vec<usize> = progress.iter().map(|p| p.step_index).collect();
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_continues_after_failures() {
        let (sequencer, _, completed, events) = recording_sequencer(|_: &str| false);
        let summary = sequencer
            .start("CS001", station_battery().steps)
            .unwrap()
            .wait()
            .await;

        assert_eq!(summary.failed_count(), 5);
        assert_eq!(summary.current_index, 5);
        let started = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DiagnosticEvent::StepStarted { .. }))
            .count();
        assert_eq!(started, 5);
        assert_eq!(completed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_fires_once_after_all_steps() {
        let (sequencer, _, completed, events) = recording_sequencer(ScriptedEvaluator::passing());
        let handle = sequencer.start("CS001", station_battery().steps).unwrap();
        handle.wait().await;
        time::sleep(Duration::from_secs(30)).await;

        let completed = completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        let summary = &completed[0];
        assert!(summary.all_passed());
        let ids: Vec<&str> = summary.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["power", "network", "safety", "temperature", "auth"]);
        assert!(summary.results.iter().all(|r| r.status.is_terminal()));

        let events = events.lock().unwrap();
        assert_eq!(events.first().map(|e| e.event_type()), Some("run_started"));
        assert_eq!(events.last().map(|e| e.event_type()), Some("run_completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (sequencer, _, completed, events) = recording_sequencer(ScriptedEvaluator::passing());
        let handle = sequencer.start("CS001", station_battery().steps).unwrap();

        time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(handle.snapshot().await.state, RunState::Running(1));

        assert!(handle.cancel().await);
        assert!(!handle.cancel().await);
        assert!(!sequencer.is_running("CS001"));

        let summary = handle.wait().await;
        time::sleep(Duration::from_secs(30)).await;

        assert!(summary.cancelled);
        assert_eq!(summary.current_index, 5);
        assert_eq!(summary.results[0].status, StepStatus::Completed);
        for result in &summary.results[1..] {
            assert_eq!(result.status, StepStatus::Failed);
            assert_eq!(result.result.as_deref(), Some(RESULT_CANCELLED));
        }

        assert_eq!(completed.lock().unwrap().len(), 1);
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.state, RunState::Cancelled);
        assert!(snapshot.check_invariants().is_ok());

        let events = events.lock().unwrap();
        assert_eq!(
            events.iter().filter(|e| e.is_terminal()).count(),
            1,
            "exactly one terminal event"
        );
        assert!(matches!(
            events.last(),
            Some(DiagnosticEvent::RunCancelled {
                step_index: Some(1),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_completion_is_noop() {
        let (sequencer, _, completed, _) = recording_sequencer(ScriptedEvaluator::passing());
        let handle = sequencer.start("CS001", station_battery().steps).unwrap();
        let summary = handle.wait().await;

        assert!(!handle.cancel().await);
        assert!(!summary.cancelled);
        assert_eq!(handle.snapshot().await.state, RunState::Done);
        assert_eq!(completed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let (sequencer, progress, _, _) = recording_sequencer(ScriptedEvaluator::passing());
        let handle = sequencer.start("CS001", station_battery().steps).unwrap();
        assert!(handle.cancel().await);

        let summary = handle.wait().await;
        assert!(summary.cancelled);
        assert_eq!(summary.failed_count(), 5);
        assert!(progress
            .lock()
            .unwrap()
            .iter()
            .all(|p| p.progress == 0 || p.status == StepStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_step_ids_rejected() {
        let (sequencer, _, completed, _) = recording_sequencer(ScriptedEvaluator::passing());
        let steps = vec![
            StepDefinition::new("a", "First", ""),
            StepDefinition::new("a", "Second", ""),
        ];

        let err = sequencer.start("CS001", steps).err().unwrap();
        assert!(matches!(err, DiagnosticsError::ConfigurationError(_)));
        assert!(!sequencer.is_running("CS001"));
        assert!(sequencer.active_targets().is_empty());

        time::sleep(Duration::from_secs(5)).await;
        assert!(completed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zero_tick = DiagnosticsConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        let err = DiagnosticSequencer::new(zero_tick, ScriptedEvaluator::passing())
            .err()
            .unwrap();
        assert_eq!(err.category(), "configuration");

        let zero_timeout = DiagnosticsConfig {
            evaluation_timeout_ms: 0,
            ..Default::default()
        };
        let evaluator: Arc<dyn StepEvaluator> = Arc::new(ScriptedEvaluator::passing());
        let err = DiagnosticSequencer::with_evaluator(zero_timeout, evaluator)
            .err()
            .unwrap();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_does_not_block_completion() {
        let completed = recorded::<RunSummary>();
        let mut sequencer =
            DiagnosticSequencer::new(DiagnosticsConfig::default(), ScriptedEvaluator::passing())
                .unwrap();
        sequencer.on_step_progress(|p| {
            if p.progress == 50 {
                panic!("listener failure");
            }
        });
        let sink = Arc::clone(&completed);
        sequencer.on_complete(move |s| sink.lock().unwrap().push(s.clone()));

        let handle = sequencer.start("CS001", station_battery().steps).unwrap();
        let summary = handle.wait().await;

        assert!(handle.is_finished());
        assert!(summary.all_passed());
        assert_eq!(completed.lock().unwrap().len(), 1);
        assert!(!sequencer.is_running("CS001"));
    }

    #[tokio::test]
    async fn test_invalid_start_arguments() {
        let sequencer = passing_sequencer();

        let err = sequencer.start("CS001", vec![]).err().unwrap();
        assert_eq!(err.category(), "configuration");

        let err = sequencer.start("  ", station_battery().steps).err().unwrap();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_start_outside_runtime() {
        let sequencer = passing_sequencer();
        let err = sequencer.start("CS001", station_battery().steps).err().unwrap();
        assert_eq!(err.category(), "configuration");
        assert!(!sequencer.is_running("CS001"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_on_busy_target_rejected() {
        let sequencer = passing_sequencer();
        let first = sequencer.start("CS001", station_battery().steps).unwrap();

        let err = sequencer.start("CS001", station_battery().steps).err().unwrap();
        assert_eq!(err, DiagnosticsError::already_running("CS001"));
        assert!(err.is_recoverable());

        let other = sequencer.start("CS002", station_battery().steps).unwrap();
        assert_eq!(sequencer.active_targets(), vec!["CS001", "CS002"]);

        first.cancel().await;
        let retry = sequencer.start("CS001", station_battery().steps).unwrap();
        assert_ne!(retry.run_id(), first.run_id());

        // The old run's completion must not release the retry's registration.
        first.wait().await;
        assert!(sequencer.is_running("CS001"));

        retry.wait().await;
        other.wait().await;
        assert!(sequencer.active_targets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_evaluator_fails_step() {
        let config = DiagnosticsConfig {
            evaluation_timeout_ms: 500,
            ..Default::default()
        };
        let sequencer = DiagnosticSequencer::new(config, SlowEvaluator).unwrap();
        let summary = sequencer
            .start("DEV001", vec![StepDefinition::new("network", "Network", "")])
            .unwrap()
            .wait()
            .await;

        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.results[0].result.as_deref(), Some(RESULT_FAILED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_battery() {
        let sequencer = passing_sequencer();

        let err = sequencer.start_battery("CS001", "missing").err().unwrap();
        assert_eq!(err, DiagnosticsError::resource_not_found("battery", "missing"));

        let handle = sequencer.start_battery("DEV003", DEVICE_BATTERY).unwrap();
        assert_eq!(handle.target_id(), "DEV003");
        let summary = handle.wait().await;
        assert_eq!(summary.results.len(), 5);
        assert_eq!(summary.results[1].name, "Hardware Health Check");

        let handle = sequencer.start_battery("CS001", STATION_BATTERY).unwrap();
        assert!(handle.wait().await.all_passed());
    }
}
