//! Pass/fail policies for diagnostic steps

use crate::config::StepDefinition;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Pass probability used by the dashboard's placeholder checks
pub const DEFAULT_PASS_RATE: f64 = 0.8;

/// Decides whether a step passed
///
/// Implementations talk to the device under test. The sequencer bounds each
/// call with the configured evaluation timeout.
#[async_trait]
pub trait StepEvaluator: Send + Sync {
    async fn evaluate(&self, target_id: &str, step: &StepDefinition) -> bool;
}

/// Any `Fn(step_id) -> bool` closure is an evaluator
#[async_trait]
impl<F> StepEvaluator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn evaluate(&self, _target_id: &str, step: &StepDefinition) -> bool {
        self(&step.id)
    }
}

/// Fails a fixed set of step ids and passes everything else
#[derive(Debug, Clone, Default)]
pub struct ScriptedEvaluator {
    failing: HashSet<String>,
}

impl ScriptedEvaluator {
    /// Evaluator that passes every step
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn failing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fail(mut self, step_id: impl Into<String>) -> Self {
        self.failing.insert(step_id.into());
        self
    }

    pub fn fails(&self, step_id: &str) -> bool {
        self.failing.contains(step_id)
    }
}

#[async_trait]
impl StepEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, _target_id: &str, step: &StepDefinition) -> bool {
        !self.fails(&step.id)
    }
}

/// Placeholder evaluator that passes with a fixed probability
pub struct RandomEvaluator {
    pass_rate: f64,
    rng: Mutex<StdRng>,
}

impl RandomEvaluator {
    /// `pass_rate` is clamped to `0.0..=1.0`
    pub fn new(pass_rate: f64) -> Self {
        Self {
            pass_rate: clamp_rate(pass_rate),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence of verdicts
    pub fn with_seed(pass_rate: f64, seed: u64) -> Self {
        Self {
            pass_rate: clamp_rate(pass_rate),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn pass_rate(&self) -> f64 {
        self.pass_rate
    }
}

impl Default for RandomEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_RATE)
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return DEFAULT_PASS_RATE;
    }
    rate.clamp(0.0, 1.0)
}

#[async_trait]
impl StepEvaluator for RandomEvaluator {
    async fn evaluate(&self, _target_id: &str, _step: &StepDefinition) -> bool {
        self.rng.lock().await.gen_bool(self.pass_rate)
    }
}
