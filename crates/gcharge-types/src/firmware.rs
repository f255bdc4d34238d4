//! Firmware catalogue and update scheduling records

use crate::{CockpitError, CockpitResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Dotted numeric firmware version such as `2.1.0`
///
/// Missing trailing components compare as zero, so `2.1` equals `2.1.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersionNumber(Vec<u32>);

impl FirmwareVersionNumber {
    pub fn parse(field: &str, text: &str) -> CockpitResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CockpitError::validation(field, "must not be empty"));
        }

        text.split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| {
                CockpitError::validation(field, format!("'{}' is not a dotted version", text))
            })
    }

    fn component(&self, index: usize) -> u32 {
        self.0.get(index).copied().unwrap_or(0)
    }
}

impl Ord for FirmwareVersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for FirmwareVersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings
pub fn compare_versions(a: &str, b: &str) -> CockpitResult<Ordering> {
    let a = FirmwareVersionNumber::parse("version", a)?;
    let b = FirmwareVersionNumber::parse("version", b)?;
    Ok(a.cmp(&b))
}

/// Release track of a firmware image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    #[default]
    Stable,
    Beta,
}

impl std::fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseType::Stable => write!(f, "stable"),
            ReleaseType::Beta => write!(f, "beta"),
        }
    }
}

/// Firmware image published by a manufacturer for a charger model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Catalogue key, see [`FirmwareVersion::catalogue_id`]
    pub id: String,
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub release_date: NaiveDate,
    pub release_type: ReleaseType,
    #[serde(default)]
    pub changelog: Vec<String>,
    pub size_mb: f64,
    /// Models this image installs on, besides `model`
    #[serde(default)]
    pub compatibility: Vec<String>,
    /// Oldest installed version this image upgrades from
    pub required_version: String,
    pub hash: Option<String>,
    pub signature: Option<String>,
}

impl FirmwareVersion {
    /// `manufacturer/model/version`, lowercased with spaces as dashes
    pub fn catalogue_id(manufacturer: &str, model: &str, version: &str) -> String {
        let slug = |s: &str| s.trim().to_lowercase().replace(' ', "-");
        format!("{}/{}/{}", slug(manufacturer), slug(model), version.trim())
    }

    pub fn validate(&self) -> CockpitResult<()> {
        if self.manufacturer.trim().is_empty() {
            return Err(CockpitError::validation("manufacturer", "must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(CockpitError::validation("model", "must not be empty"));
        }
        let version = FirmwareVersionNumber::parse("version", &self.version)?;
        let required = FirmwareVersionNumber::parse("required_version", &self.required_version)?;
        if required > version {
            return Err(CockpitError::validation(
                "required_version",
                "must not be newer than the image itself",
            ));
        }
        if self.id != Self::catalogue_id(&self.manufacturer, &self.model, &self.version) {
            return Err(CockpitError::validation(
                "id",
                "must be derived from manufacturer, model and version",
            ));
        }
        if self.size_mb < 0.0 {
            return Err(CockpitError::validation("size_mb", "must not be negative"));
        }
        Ok(())
    }

    /// Whether the image is published by `manufacturer` for `model`
    pub fn supports(&self, manufacturer: &str, model: &str) -> bool {
        self.manufacturer.eq_ignore_ascii_case(manufacturer)
            && (self.model.eq_ignore_ascii_case(model)
                || self.compatibility.iter().any(|m| m.eq_ignore_ascii_case(model)))
    }

    /// Whether a charger on `installed` can move to this image
    pub fn upgrades_from(&self, installed: &str) -> CockpitResult<bool> {
        let installed = FirmwareVersionNumber::parse("installed", installed)?;
        let version = FirmwareVersionNumber::parse("version", &self.version)?;
        let required = FirmwareVersionNumber::parse("required_version", &self.required_version)?;
        Ok(version > installed && installed >= required)
    }
}

/// Order in which a group's stations receive an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStrategy {
    /// One station at a time, stopping at the first failure
    #[default]
    Rolling,
    /// Every station, regardless of failures
    Parallel,
    /// Batches of [`UpdateStrategy::BATCH_SIZE`], stopping after a failed batch
    Batched,
}

impl UpdateStrategy {
    pub const BATCH_SIZE: usize = 5;

    /// Stations per batch for a group of `total`
    pub fn batch_size(self, total: usize) -> usize {
        match self {
            UpdateStrategy::Rolling => 1,
            UpdateStrategy::Parallel => total.max(1),
            UpdateStrategy::Batched => Self::BATCH_SIZE,
        }
    }
}

impl std::fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStrategy::Rolling => write!(f, "rolling"),
            UpdateStrategy::Parallel => write!(f, "parallel"),
            UpdateStrategy::Batched => write!(f, "batched"),
        }
    }
}

impl std::str::FromStr for UpdateStrategy {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rolling" => Ok(UpdateStrategy::Rolling),
            "parallel" => Ok(UpdateStrategy::Parallel),
            "batched" => Ok(UpdateStrategy::Batched),
            other => Err(CockpitError::validation(
                "strategy",
                format!("unknown update strategy '{}'", other),
            )),
        }
    }
}

/// Lifecycle of a scheduled update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UpdateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateStatus::Completed | UpdateStatus::Failed)
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStatus::Pending => write!(f, "pending"),
            UpdateStatus::InProgress => write!(f, "in-progress"),
            UpdateStatus::Completed => write!(f, "completed"),
            UpdateStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Operator choices made when scheduling an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    pub strategy: UpdateStrategy,
    /// Extra attempts after a failed rollout
    pub retry_attempts: u8,
    /// Minutes between a failed rollout and its retry
    pub retry_interval_mins: u32,
    /// Revert stations already updated when the rollout fails
    pub rollback_enabled: bool,
    /// Operator asked for the maintenance window; carried, not enforced
    pub maintenance_window: bool,
    /// Raise a notification when the update ends
    pub notify_users: bool,
}

impl UpdateOptions {
    pub const MAX_RETRY_ATTEMPTS: u8 = 5;
    pub const MIN_RETRY_INTERVAL_MINS: u32 = 15;

    pub fn validate(&self) -> CockpitResult<()> {
        if self.retry_attempts > Self::MAX_RETRY_ATTEMPTS {
            return Err(CockpitError::validation(
                "retry_attempts",
                format!("must be at most {}", Self::MAX_RETRY_ATTEMPTS),
            ));
        }
        if self.retry_interval_mins < Self::MIN_RETRY_INTERVAL_MINS {
            return Err(CockpitError::validation(
                "retry_interval_mins",
                format!("must be at least {}", Self::MIN_RETRY_INTERVAL_MINS),
            ));
        }
        Ok(())
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            strategy: UpdateStrategy::Rolling,
            retry_attempts: 3,
            retry_interval_mins: 30,
            rollback_enabled: true,
            maintenance_window: false,
            notify_users: true,
        }
    }
}

/// Per-station outcome of one rollout attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutReport {
    pub updated: Vec<String>,
    pub failed: Vec<String>,
    /// Not attempted because an earlier batch failed
    pub skipped: Vec<String>,
    /// Stations in `updated` were reverted
    pub rolled_back: bool,
}

impl RolloutReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.updated.is_empty()
    }
}

/// Firmware update scheduled for a station group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledUpdate {
    pub id: String,
    pub group_id: String,
    pub firmware_id: String,
    pub version: String,
    pub scheduled_time: DateTime<Utc>,
    pub options: UpdateOptions,
    pub status: UpdateStatus,
    /// Rollouts started so far
    pub attempts: u8,
    pub last_report: Option<RolloutReport>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScheduledUpdate {
    pub fn validate(&self) -> CockpitResult<()> {
        if self.id.trim().is_empty() {
            return Err(CockpitError::validation("id", "must not be empty"));
        }
        if self.group_id.trim().is_empty() {
            return Err(CockpitError::validation("group_id", "must not be empty"));
        }
        FirmwareVersionNumber::parse("version", &self.version)?;
        self.options.validate()?;
        if self.attempts > self.options.retry_attempts + 1 {
            return Err(CockpitError::validation(
                "attempts",
                "exceeds the configured retry attempts",
            ));
        }
        Ok(())
    }

    /// Pending and scheduled at or before `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == UpdateStatus::Pending && self.scheduled_time <= now
    }

    /// Whether another rollout may follow a failed one
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.options.retry_attempts
    }
}
