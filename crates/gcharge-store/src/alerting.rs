//! Rule, notification and alarm channel stores

use crate::repository::{MemoryStore, Record};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcharge_types::{AlarmChannel, ChannelStatus, CockpitResult, Notification, Rule, Severity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Deref;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

impl Record for Rule {
    const KIND: &'static str = "rule";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        Rule::validate(self)
    }
}

impl Record for Notification {
    const KIND: &'static str = "notification";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for AlarmChannel {
    const KIND: &'static str = "channel";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        AlarmChannel::validate(self)
    }
}

/// Alerting rules
#[derive(Clone, Default)]
pub struct RuleStore {
    records: MemoryStore<Rule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a rule between enabled and disabled, returning the new state
    pub fn toggle(&self, id: &str) -> CockpitResult<bool> {
        let rule = self.records.modify(id, |r| r.enabled = !r.enabled)?;
        info!(
            "Rule {} ({}) {}",
            rule.id,
            rule.name,
            if rule.enabled { "enabled" } else { "disabled" }
        );
        Ok(rule.enabled)
    }

    pub fn enabled(&self) -> Vec<Rule> {
        self.records.filter(|r| r.enabled)
    }

    /// Enabled rules whose condition on `parameter` matches `observed`
    ///
    /// Matching rules have `last_triggered` set to `at`.
    pub fn evaluate(&self, parameter: &str, observed: f64, at: DateTime<Utc>) -> Vec<Rule> {
        let matching = self.records.filter(|r| {
            r.enabled && r.condition.parameter == parameter && r.condition.matches(observed)
        });

        matching
            .into_iter()
            .filter_map(|rule| {
                debug!("Rule {} triggered by {} = {}", rule.id, parameter, observed);
                self.records
                    .modify(&rule.id, |r| r.last_triggered = Some(at))
                    .ok()
            })
            .collect()
    }
}

impl Deref for RuleStore {
    type Target = MemoryStore<Rule>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Notification center
#[derive(Clone, Default)]
pub struct NotificationStore {
    records: MemoryStore<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_read(&self, id: &str) -> CockpitResult<()> {
        self.records.modify(id, |n| n.read = true)?;
        Ok(())
    }

    /// Mark everything read, returning how many changed
    pub fn mark_all_read(&self) -> usize {
        let unread = self.unread();
        let mut changed = 0;
        for notification in unread {
            if self.mark_read(&notification.id).is_ok() {
                changed += 1;
            }
        }
        changed
    }

    pub fn unread(&self) -> Vec<Notification> {
        self.records.filter(|n| !n.read)
    }

    pub fn unread_count(&self) -> usize {
        self.unread().len()
    }

    pub fn by_priority(&self, priority: Severity) -> Vec<Notification> {
        self.records.filter(|n| n.priority == priority)
    }

    /// Notifications raised by a rule
    pub fn for_rule(&self, rule_id: &str) -> Vec<Notification> {
        self.records
            .filter(|n| n.rule_id.as_deref() == Some(rule_id))
    }
}

impl Deref for NotificationStore {
    type Target = MemoryStore<Notification>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Sends a test message through an alarm channel
#[async_trait]
pub trait ChannelTester: Send + Sync {
    async fn test(&self, channel: &AlarmChannel) -> bool;
}

#[async_trait]
impl<F> ChannelTester for F
where
    F: Fn(&AlarmChannel) -> bool + Send + Sync,
{
    async fn test(&self, channel: &AlarmChannel) -> bool {
        self(channel)
    }
}

/// Placeholder tester that succeeds with a fixed probability
pub struct RandomChannelTester {
    success_rate: f64,
    rng: Mutex<StdRng>,
}

impl RandomChannelTester {
    pub const DEFAULT_SUCCESS_RATE: f64 = 0.9;

    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: probability(success_rate, Self::DEFAULT_SUCCESS_RATE),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(success_rate: f64, seed: u64) -> Self {
        Self {
            success_rate: probability(success_rate, Self::DEFAULT_SUCCESS_RATE),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

/// `rate` limited to `0.0..=1.0`; NaN becomes `fallback`
pub(crate) fn probability(rate: f64, fallback: f64) -> f64 {
    if rate.is_nan() {
        return fallback;
    }
    rate.clamp(0.0, 1.0)
}

impl Default for RandomChannelTester {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SUCCESS_RATE)
    }
}

#[async_trait]
impl ChannelTester for RandomChannelTester {
    async fn test(&self, _channel: &AlarmChannel) -> bool {
        self.rng.lock().await.gen_bool(self.success_rate)
    }
}

/// Alarm channels
#[derive(Clone, Default)]
pub struct ChannelStore {
    records: MemoryStore<AlarmChannel>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&self, id: &str) -> CockpitResult<bool> {
        let channel = self.records.modify(id, |c| c.enabled = !c.enabled)?;
        Ok(channel.enabled)
    }

    pub fn enabled(&self) -> Vec<AlarmChannel> {
        self.records.filter(|c| c.enabled)
    }

    /// Run `tester` against a channel and record the outcome
    pub async fn test_channel(
        &self,
        id: &str,
        tester: &dyn ChannelTester,
    ) -> CockpitResult<AlarmChannel> {
        let channel = self
            .records
            .get(id)
            .ok_or_else(|| gcharge_types::CockpitError::not_found(AlarmChannel::KIND, id))?;

        let delivered = tester.test(&channel).await;
        if delivered {
            info!("Test message delivered through {} ({})", channel.name, channel.kind);
        } else {
            warn!("Test message through {} ({}) failed", channel.name, channel.kind);
        }

        let tested_at = Utc::now();
        self.records.modify(id, |c| {
            c.last_tested = Some(tested_at);
            c.status = if delivered {
                ChannelStatus::Active
            } else {
                ChannelStatus::Error
            };
        })
    }
}

impl Deref for ChannelStore {
    type Target = MemoryStore<AlarmChannel>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}
