//! # G-Charge Store
//!
//! Explicit store objects for the cockpit's records:
//!
//! - Charging stations with status/location filtering
//! - Alerting rules, notifications and alarm channels
//! - Network device inventory
//! - Station groups, the firmware catalogue and scheduled group updates
//! - Persisted UI settings and the sync status cache

pub mod alerting;
pub mod demo;
pub mod firmware;
pub mod groups;
pub mod network;
pub mod repository;
pub mod settings;
pub mod stations;
pub mod sync;

pub use alerting::{ChannelStore, ChannelTester, NotificationStore, RandomChannelTester, RuleStore};
pub use firmware::{
    rollout, FirmwareCatalog, FirmwareTransfer, RandomFirmwareTransfer, ScriptedTransfer,
    UpdateStore,
};
pub use groups::GroupStore;
pub use network::DeviceStore;
pub use repository::{MemoryStore, Record, Repository};
pub use settings::{Settings, SettingsPatch, SettingsStore, Theme, TimeFormat};
pub use stations::{StationFilter, StationStore};
pub use sync::{SyncState, SyncStatus, SyncTracker};

use chrono::{DateTime, Utc};
use gcharge_types::{
    generate_id, CockpitError, CockpitResult, FirmwareVersion, GroupHealth, Notification,
    NotificationKind, ScheduledUpdate, Severity, StationGroup, UpdateStatus,
};
use tracing::{info, warn};

/// All record stores of the cockpit
#[derive(Clone, Default)]
pub struct CockpitStores {
    pub stations: StationStore,
    pub rules: RuleStore,
    pub notifications: NotificationStore,
    pub channels: ChannelStore,
    pub devices: DeviceStore,
    pub groups: GroupStore,
    pub firmware: FirmwareCatalog,
    pub updates: UpdateStore,
}

impl CockpitStores {
    /// Empty stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores seeded with the sample dashboard records
    pub fn demo() -> CockpitResult<Self> {
        let stores = Self::new();
        for station in demo::stations() {
            stores.stations.create(station)?;
        }
        for rule in demo::rules() {
            stores.rules.create(rule)?;
        }
        for notification in demo::notifications() {
            stores.notifications.create(notification)?;
        }
        for channel in demo::channels() {
            stores.channels.create(channel)?;
        }
        for device in demo::devices() {
            stores.devices.create(device)?;
        }
        for group in demo::groups() {
            stores.groups.create(group)?;
        }
        for firmware in demo::firmware() {
            stores.firmware.create(firmware)?;
        }
        for update in demo::updates() {
            stores.updates.create(update)?;
        }

        info!(
            "Seeded demo data: {} stations, {} rules, {} notifications, {} channels, \
             {} devices, {} groups, {} firmware images",
            stores.stations.len(),
            stores.rules.len(),
            stores.notifications.len(),
            stores.channels.len(),
            stores.devices.len(),
            stores.groups.len(),
            stores.firmware.len()
        );
        Ok(stores)
    }

    fn group(&self, id: &str) -> CockpitResult<StationGroup> {
        self.groups
            .get(id)
            .ok_or_else(|| CockpitError::not_found("group", id))
    }

    /// Health of a group from the status of its known member stations
    pub fn group_health(&self, group_id: &str) -> CockpitResult<GroupHealth> {
        let group = self.group(group_id)?;
        Ok(GroupHealth::from_statuses(
            group
                .stations
                .iter()
                .filter_map(|id| self.stations.get(id))
                .map(|station| station.status),
        ))
    }

    /// Roll out a pending update now, whatever its scheduled time
    ///
    /// A completed rollout moves the group to the new version. When the update
    /// asks for it, the outcome is posted as a notification.
    pub async fn run_update(
        &self,
        update_id: &str,
        transfer: &dyn FirmwareTransfer,
        now: DateTime<Utc>,
    ) -> CockpitResult<ScheduledUpdate> {
        let update = self
            .updates
            .get(update_id)
            .ok_or_else(|| CockpitError::not_found("update", update_id))?;
        let group = self.group(&update.group_id)?;
        let firmware = self
            .firmware
            .get(&update.firmware_id)
            .ok_or_else(|| CockpitError::not_found("firmware", &update.firmware_id))?;

        let update = self.updates.begin(update_id)?;
        info!(
            "Rolling out {} to {} ({} stations, attempt {})",
            firmware.version,
            group.id,
            group.stations.len(),
            update.attempts
        );
        let report = rollout(&group, &firmware, &update.options, transfer).await;
        let update = self.updates.finish(update_id, report, now)?;

        if update.status == UpdateStatus::Completed {
            self.groups.set_version(&group.id, &update.version, now)?;
        }
        if update.options.notify_users {
            self.notifications
                .create(update_notification(&update, &group, &firmware, now))?;
        }
        Ok(update)
    }

    /// Run every update due at `now`, earliest first
    ///
    /// An update that cannot start is logged and skipped.
    pub async fn run_due_updates(
        &self,
        transfer: &dyn FirmwareTransfer,
        now: DateTime<Utc>,
    ) -> Vec<ScheduledUpdate> {
        let mut finished = Vec::new();
        for update in self.updates.due(now) {
            match self.run_update(&update.id, transfer, now).await {
                Ok(update) => finished.push(update),
                Err(e) => warn!("Skipping update {}: {}", update.id, e),
            }
        }
        finished
    }
}

fn update_notification(
    update: &ScheduledUpdate,
    group: &StationGroup,
    firmware: &FirmwareVersion,
    now: DateTime<Utc>,
) -> Notification {
    let failed = update
        .last_report
        .as_ref()
        .map(|r| r.failed.join(", "))
        .unwrap_or_default();
    let (title, message, kind, priority) = match update.status {
        UpdateStatus::Completed => (
            "Firmware Update Completed",
            format!("{} now runs {} {}", group.name, firmware.model, firmware.version),
            NotificationKind::Success,
            Severity::Low,
        ),
        UpdateStatus::Failed => (
            "Firmware Update Failed",
            format!(
                "{} could not install {} after {} attempts (failed: {})",
                group.name, firmware.version, update.attempts, failed
            ),
            NotificationKind::Error,
            Severity::High,
        ),
        _ => (
            "Firmware Update Retry Scheduled",
            format!(
                "{} failed to install {} on {}; retrying at {}",
                group.name,
                firmware.version,
                failed,
                update.scheduled_time.format("%Y-%m-%d %H:%M UTC")
            ),
            NotificationKind::Warning,
            Severity::Medium,
        ),
    };

    Notification {
        id: generate_id(),
        title: title.to_string(),
        message,
        kind,
        timestamp: now,
        read: false,
        priority,
        rule_id: None,
        ocpp_code: None,
    }
}
