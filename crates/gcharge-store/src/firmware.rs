//! Firmware catalogue, update scheduling and group rollouts
//!
//! Transfers to the chargers go through [`FirmwareTransfer`] so the cockpit
//! can be driven by a real backend, a scripted outcome in tests, or the
//! random placeholder used by the CLI.

use crate::alerting::probability;
use crate::repository::{MemoryStore, Record};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gcharge_types::{
    generate_id, CockpitError, CockpitResult, FirmwareVersion, FirmwareVersionNumber,
    RolloutReport, ScheduledUpdate, StationGroup, UpdateOptions, UpdateStatus,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::ops::Deref;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

impl Record for FirmwareVersion {
    const KIND: &'static str = "firmware";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        FirmwareVersion::validate(self)
    }
}

impl Record for ScheduledUpdate {
    const KIND: &'static str = "update";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        ScheduledUpdate::validate(self)
    }
}

/// Moves firmware images to the update server and onto stations
#[async_trait]
pub trait FirmwareTransfer: Send + Sync {
    /// Publish an image; `false` when the server rejects it
    async fn upload(&self, firmware: &FirmwareVersion) -> bool;

    /// Install an image on one station
    async fn install(&self, station_id: &str, firmware: &FirmwareVersion) -> bool;
}

/// Deterministic transfer: every station installs except the listed ones
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransfer {
    reject_uploads: bool,
    failing: HashSet<String>,
}

impl ScriptedTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_uploads(mut self) -> Self {
        self.reject_uploads = true;
        self
    }

    pub fn failing_on<I, S>(mut self, stations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(stations.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl FirmwareTransfer for ScriptedTransfer {
    async fn upload(&self, _firmware: &FirmwareVersion) -> bool {
        !self.reject_uploads
    }

    async fn install(&self, station_id: &str, _firmware: &FirmwareVersion) -> bool {
        !self.failing.contains(station_id)
    }
}

/// Placeholder transfer where each install succeeds with a fixed probability
pub struct RandomFirmwareTransfer {
    success_rate: f64,
    rng: Mutex<StdRng>,
}

impl RandomFirmwareTransfer {
    pub const DEFAULT_SUCCESS_RATE: f64 = 0.95;

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

impl Default for RandomFirmwareTransfer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SUCCESS_RATE)
    }
}

#[async_trait]
impl FirmwareTransfer for RandomFirmwareTransfer {
    async fn upload(&self, _firmware: &FirmwareVersion) -> bool {
        true
    }

    async fn install(&self, _station_id: &str, _firmware: &FirmwareVersion) -> bool {
        self.rng.lock().await.gen_bool(self.success_rate)
    }
}

fn newest_first(a: &FirmwareVersion, b: &FirmwareVersion) -> std::cmp::Ordering {
    let parse = |f: &FirmwareVersion| FirmwareVersionNumber::parse("version", &f.version).ok();
    parse(b).cmp(&parse(a))
}

/// Published firmware images
#[derive(Clone, Default)]
pub struct FirmwareCatalog {
    records: MemoryStore<FirmwareVersion>,
}

impl FirmwareCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images installable on `model`, newest first
    pub fn for_model(&self, manufacturer: &str, model: &str) -> Vec<FirmwareVersion> {
        let mut images = self.records.filter(|f| f.supports(manufacturer, model));
        images.sort_by(newest_first);
        images
    }

    /// Images published by `manufacturer`, newest first
    pub fn for_manufacturer(&self, manufacturer: &str) -> Vec<FirmwareVersion> {
        let mut images = self
            .records
            .filter(|f| f.manufacturer.eq_ignore_ascii_case(manufacturer));
        images.sort_by(newest_first);
        images
    }

    pub fn latest(&self, manufacturer: &str, model: &str) -> Option<FirmwareVersion> {
        self.for_model(manufacturer, model).into_iter().next()
    }

    /// Images the group can move to from its installed version, newest first
    pub fn upgrades_for(&self, group: &StationGroup) -> Vec<FirmwareVersion> {
        self.for_model(&group.manufacturer, &group.model)
            .into_iter()
            .filter(|f| f.upgrades_from(&group.current_version).unwrap_or(false))
            .collect()
    }

    /// Publish an image through `transfer` and add it to the catalogue
    pub async fn upload(
        &self,
        firmware: FirmwareVersion,
        transfer: &dyn FirmwareTransfer,
    ) -> CockpitResult<FirmwareVersion> {
        firmware.validate()?;
        if self.records.contains(&firmware.id) {
            return Err(CockpitError::already_exists(FirmwareVersion::KIND, &firmware.id));
        }

        if !transfer.upload(&firmware).await {
            warn!("Upload of {} firmware {} was rejected", firmware.model, firmware.version);
            return Err(CockpitError::operation_failed(
                "firmware upload",
                format!(
                    "{} {} was rejected by the update server",
                    firmware.model, firmware.version
                ),
            ));
        }

        self.records.create(firmware.clone())?;
        info!(
            "Uploaded {} {} firmware {} ({:.1} MB)",
            firmware.manufacturer, firmware.model, firmware.version, firmware.size_mb
        );
        Ok(firmware)
    }
}

impl Deref for FirmwareCatalog {
    type Target = MemoryStore<FirmwareVersion>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Firmware updates scheduled for station groups
#[derive(Clone, Default)]
pub struct UpdateStore {
    records: MemoryStore<ScheduledUpdate>,
}

impl UpdateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `firmware` for `group` at `at`
    ///
    /// The image must fit the group's model and upgrade its installed
    /// version, and the group must not already have an open update.
    pub fn schedule(
        &self,
        group: &StationGroup,
        firmware: &FirmwareVersion,
        at: DateTime<Utc>,
        options: UpdateOptions,
    ) -> CockpitResult<ScheduledUpdate> {
        options.validate()?;
        if !firmware.supports(&group.manufacturer, &group.model) {
            return Err(CockpitError::validation(
                "firmware",
                format!(
                    "{} {} does not support {} {}",
                    firmware.model, firmware.version, group.manufacturer, group.model
                ),
            ));
        }
        if !firmware.upgrades_from(&group.current_version)? {
            return Err(CockpitError::validation(
                "version",
                format!(
                    "{} cannot upgrade from {} (requires {} or later)",
                    firmware.version, group.current_version, firmware.required_version
                ),
            ));
        }
        if let Some(open) = self.active_for(&group.id) {
            return Err(CockpitError::validation(
                "group_id",
                format!("{} already has update {} ({})", group.id, open.id, open.status),
            ));
        }

        let update = ScheduledUpdate {
            id: generate_id(),
            group_id: group.id.clone(),
            firmware_id: firmware.id.clone(),
            version: firmware.version.clone(),
            scheduled_time: at,
            options,
            status: UpdateStatus::Pending,
            attempts: 0,
            last_report: None,
            completed_at: None,
        };
        self.records.create(update.clone())?;
        info!(
            "Scheduled firmware {} for {} at {} ({})",
            update.version, group.id, at, update.options.strategy
        );
        Ok(update)
    }

    pub fn for_group(&self, group_id: &str) -> Vec<ScheduledUpdate> {
        self.records.filter(|u| u.group_id == group_id)
    }

    /// The pending or in-progress update of a group
    pub fn active_for(&self, group_id: &str) -> Option<ScheduledUpdate> {
        self.records
            .filter(|u| u.group_id == group_id && !u.status.is_terminal())
            .into_iter()
            .next()
    }

    /// Pending updates scheduled at or before `now`, earliest first
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledUpdate> {
        let mut due = self.records.filter(|u| u.is_due(now));
        due.sort_by_key(|u| u.scheduled_time);
        due
    }

    /// Move a pending update to in-progress and count the attempt
    pub fn begin(&self, id: &str) -> CockpitResult<ScheduledUpdate> {
        self.records.try_modify(id, |u| {
            if u.status != UpdateStatus::Pending {
                return Err(CockpitError::validation(
                    "status",
                    format!("cannot start a {} update", u.status),
                ));
            }
            u.status = UpdateStatus::InProgress;
            u.attempts += 1;
            Ok(())
        })
    }

    /// Record the outcome of a rollout
    ///
    /// A failed rollout goes back to pending after the retry interval until
    /// the retry attempts are used up, then the update fails.
    pub fn finish(
        &self,
        id: &str,
        report: RolloutReport,
        now: DateTime<Utc>,
    ) -> CockpitResult<ScheduledUpdate> {
        let update = self.records.try_modify(id, |u| {
            if u.status != UpdateStatus::InProgress {
                return Err(CockpitError::validation(
                    "status",
                    format!("cannot finish a {} update", u.status),
                ));
            }
            if report.succeeded() {
                u.status = UpdateStatus::Completed;
                u.completed_at = Some(now);
            } else if u.can_retry() {
                u.status = UpdateStatus::Pending;
                let interval = Duration::minutes(i64::from(u.options.retry_interval_mins));
                u.scheduled_time = now + interval;
            } else {
                u.status = UpdateStatus::Failed;
                u.completed_at = Some(now);
            }
            u.last_report = Some(report);
            Ok(())
        })?;

        match update.status {
            UpdateStatus::Completed => info!("Update {} completed", update.id),
            UpdateStatus::Pending => warn!(
                "Update {} failed attempt {}, retrying at {}",
                update.id, update.attempts, update.scheduled_time
            ),
            _ => warn!("Update {} failed after {} attempts", update.id, update.attempts),
        }
        Ok(update)
    }
}

impl Deref for UpdateStore {
    type Target = MemoryStore<ScheduledUpdate>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Install `firmware` on every station of `group`, batch by batch
///
/// Stations install one after another within a batch. After a batch with a
/// failure the remaining stations are skipped, and the updated ones are
/// marked rolled back when the options ask for it.
pub async fn rollout(
    group: &StationGroup,
    firmware: &FirmwareVersion,
    options: &UpdateOptions,
    transfer: &dyn FirmwareTransfer,
) -> RolloutReport {
    let batch = options.strategy.batch_size(group.stations.len());
    let mut report = RolloutReport::default();

    for (index, chunk) in group.stations.chunks(batch).enumerate() {
        if !report.failed.is_empty() {
            report.skipped.extend(chunk.iter().cloned());
            continue;
        }

        debug!("Group {} batch {}: {:?}", group.id, index + 1, chunk);
        for station in chunk {
            if transfer.install(station, firmware).await {
                report.updated.push(station.clone());
            } else {
                warn!("Station {} failed to install firmware {}", station, firmware.version);
                report.failed.push(station.clone());
            }
        }
    }

    if !report.failed.is_empty() && options.rollback_enabled && !report.updated.is_empty() {
        warn!(
            "Rolling back {} station(s) of {} to {}",
            report.updated.len(),
            group.id,
            group.current_version
        );
        report.rolled_back = true;
    }
    report
}
