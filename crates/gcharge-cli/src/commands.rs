//! # CLI Commands Module
//!
//! Implementations behind the `gcharge` subcommands. Listing commands build a
//! [`TableDisplay`] and leave printing to the caller.

use crate::config::load_diagnostics_config;
use crate::ui::{self, StatusDisplay, StepBars, TableDisplay, TargetBars};
use anyhow::{anyhow, bail, Context, Result};
use gcharge_diagnostics::{
    select_steps, DiagnosticSequencer, DiagnosticsConfig, GroupSummary, LoggingEventHandler,
    RandomEvaluator, RunSummary, ScriptedEvaluator, StepEvaluator,
};
use gcharge_store::{
    CockpitStores, FirmwareTransfer, RandomChannelTester, RandomFirmwareTransfer,
    ScriptedTransfer, SettingsPatch, SettingsStore, StationFilter,
};
use gcharge_types::{
    AlarmChannel, DateTime, DeviceStatus, FirmwareVersion, ReleaseType, ScheduledUpdate,
    UpdateOptions, Utc,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, time};
use tracing::info;

/// Options of `gcharge diagnose`
#[derive(Debug, Clone)]
pub struct DiagnoseOptions {
    pub target: String,
    pub battery: String,
    /// Step ids forced to fail
    pub fail: Vec<String>,
    /// Switches to the random placeholder evaluator
    pub pass_rate: Option<f64>,
    pub seed: Option<u64>,
    pub cancel_after: Option<Duration>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl DiagnoseOptions {
    pub fn new(target: impl Into<String>, battery: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            battery: battery.into(),
            fail: Vec::new(),
            pass_rate: None,
            seed: None,
            cancel_after: None,
            config: None,
            json: false,
        }
    }

    /// Evaluator selected by the options
    pub fn evaluator(&self) -> Arc<dyn StepEvaluator> {
        select_evaluator(&self.fail, self.pass_rate, self.seed)
    }
}

fn select_evaluator(
    fail: &[String],
    pass_rate: Option<f64>,
    seed: Option<u64>,
) -> Arc<dyn StepEvaluator> {
    match (pass_rate, seed) {
        (Some(rate), Some(seed)) => Arc::new(RandomEvaluator::with_seed(rate, seed)),
        (Some(rate), None) => Arc::new(RandomEvaluator::new(rate)),
        (None, _) => Arc::new(ScriptedEvaluator::failing(fail.iter().cloned())),
    }
}

/// `gcharge diagnose`
pub async fn diagnose(options: &DiagnoseOptions) -> Result<RunSummary> {
    let config = load_diagnostics_config(options.config.as_deref())?;
    run_diagnostics(config, options).await
}

/// Run one battery to completion, rendering bars or JSON
pub async fn run_diagnostics(
    config: DiagnosticsConfig,
    options: &DiagnoseOptions,
) -> Result<RunSummary> {
    let battery = config
        .get_battery(&options.battery)
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "Unknown battery '{}'. Available: {}",
                options.battery,
                config.battery_names().join(", ")
            )
        })?;

    let display = StatusDisplay::new();
    if !options.json {
        match describe_target(&options.target) {
            Some(description) => display.info(&description),
            None => display.warning(&format!(
                "{} is not in the station or device inventory",
                options.target
            )),
        }
    }

    let mut sequencer = DiagnosticSequencer::with_evaluator(config, options.evaluator())?;
    sequencer.add_handler(LoggingEventHandler::default());

    let bars = if options.json {
        None
    } else {
        Some(StepBars::new(&battery.steps)?)
    };
    if let Some(bars) = bars.clone() {
        sequencer.on_step_progress(move |progress| bars.update(progress));
    }

    let handle = sequencer
        .start(options.target.clone(), battery.steps)
        .with_context(|| format!("Could not start diagnostics on {}", options.target))?;

    let summary = tokio::select! {
        summary = handle.wait() => summary,
        _ = cancel_requested(options.cancel_after) => {
            if let Some(ref bars) = bars {
                bars.note("Cancelling diagnostics...")?;
            }
            handle.cancel().await;
            handle.wait().await
        }
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        display.run_summary(&summary);
    }

    Ok(summary)
}

/// Options of `gcharge group-diagnose`
#[derive(Debug, Clone)]
pub struct GroupDiagnoseOptions {
    pub group: String,
    pub battery: String,
    /// Step ids to run; empty runs the whole battery
    pub steps: Vec<String>,
    pub fail: Vec<String>,
    pub pass_rate: Option<f64>,
    pub seed: Option<u64>,
    pub cancel_after: Option<Duration>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl GroupDiagnoseOptions {
    pub fn new(group: impl Into<String>, battery: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            battery: battery.into(),
            steps: Vec::new(),
            fail: Vec::new(),
            pass_rate: None,
            seed: None,
            cancel_after: None,
            config: None,
            json: false,
        }
    }
}

/// `gcharge group-diagnose`
pub async fn group_diagnose(
    stores: &CockpitStores,
    options: &GroupDiagnoseOptions,
) -> Result<GroupSummary> {
    let config = load_diagnostics_config(options.config.as_deref())?;
    run_group_diagnostics(stores, config, options).await
}

/// Run one battery across every station of a group
pub async fn run_group_diagnostics(
    stores: &CockpitStores,
    config: DiagnosticsConfig,
    options: &GroupDiagnoseOptions,
) -> Result<GroupSummary> {
    let group = stores
        .groups
        .get(&options.group)
        .ok_or_else(|| anyhow!("Unknown group '{}'", options.group))?;
    let battery = config.get_battery(&options.battery).cloned().ok_or_else(|| {
        anyhow!(
            "Unknown battery '{}'. Available: {}",
            options.battery,
            config.battery_names().join(", ")
        )
    })?;
    let steps = select_steps(&battery.steps, &options.steps)?;

    let display = StatusDisplay::new();
    if !options.json {
        display.info(&format!(
            "{} ({}): {} stations, {} checks",
            group.name,
            group.id,
            group.stations.len(),
            steps.len()
        ));
    }

    let evaluator = select_evaluator(&options.fail, options.pass_rate, options.seed);
    let mut sequencer = DiagnosticSequencer::with_evaluator(config, evaluator)?;
    sequencer.add_handler(LoggingEventHandler::default());

    let bars = if options.json {
        None
    } else {
        Some(TargetBars::new(&group.stations, &steps)?)
    };
    if let Some(bars) = bars.clone() {
        let finished = bars.clone();
        sequencer.on_step_progress(move |progress| bars.update(progress));
        sequencer.on_complete(move |summary| finished.finish(summary));
    }

    let handle = sequencer
        .start_group(&group.id, &group.stations, steps)
        .with_context(|| format!("Could not start diagnostics on group {}", group.id))?;
    if let Some(ref bars) = bars {
        for target in handle.skipped() {
            bars.skip(target);
        }
    }

    let summary = tokio::select! {
        summary = handle.wait() => summary,
        _ = cancel_requested(options.cancel_after) => {
            if let Some(ref bars) = bars {
                bars.note("Cancelling group diagnostics...")?;
            }
            handle.cancel().await;
            handle.wait().await
        }
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        display.group_summary(&summary);
    }
    Ok(summary)
}

/// Resolves when the run should be cancelled: timer expiry or Ctrl-C
async fn cancel_requested(after: Option<Duration>) {
    let deadline = async move {
        match after {
            Some(after) => time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    let interrupted = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = deadline => info!("Cancel timer expired"),
        _ = interrupted => info!("Interrupted"),
    }
}

/// One-line description of a known station or device
pub fn describe_target(target: &str) -> Option<String> {
    let stores = CockpitStores::demo().ok()?;
    if let Some(station) = stores.stations.get(target) {
        return Some(format!(
            "Station {} at {} ({})",
            station.id, station.location, station.status
        ));
    }
    stores.devices.get(target).map(|device| {
        format!(
            "Device {} {} at {} ({})",
            device.id, device.name, device.ip_address, device.status
        )
    })
}

/// `gcharge batteries`
pub fn batteries_table(config: &DiagnosticsConfig) -> TableDisplay {
    let mut table = TableDisplay::new(vec!["Battery", "#", "Step", "Name", "Description"]);
    for name in config.battery_names() {
        if let Some(battery) = config.get_battery(name) {
            for (index, step) in battery.steps.iter().enumerate() {
                table.add_row(vec![
                    if index == 0 { name.to_string() } else { String::new() },
                    (index + 1).to_string(),
                    step.id.clone(),
                    step.name.clone(),
                    step.description.clone(),
                ]);
            }
        }
    }
    table
}

/// `gcharge stations`
pub fn stations_table(stores: &CockpitStores, filter: &StationFilter) -> TableDisplay {
    let mut table = TableDisplay::new(vec![
        "ID", "Location", "Status", "Power", "Util", "Uptime", "Next service", "Alerts",
    ]);
    for station in stores.stations.filter(filter) {
        table.add_row(vec![
            station.id,
            station.location,
            station.status.to_string(),
            format!("{:.0} kW", station.power_kw),
            format!("{:.0}%", station.utilization),
            format!("{:.1}%", station.uptime),
            station.next_maintenance.to_string(),
            station.alerts.join("; "),
        ]);
    }
    table
}

/// `gcharge rules`
pub fn rules_table(stores: &CockpitStores) -> TableDisplay {
    let mut table = TableDisplay::new(vec![
        "ID", "Name", "Condition", "Severity", "Enabled", "OCPP", "Last triggered",
    ]);
    for rule in stores.rules.list() {
        table.add_row(vec![
            rule.id,
            rule.name,
            rule.condition.to_string(),
            rule.severity.to_string(),
            if rule.enabled { "enabled" } else { "disabled" }.to_string(),
            rule.ocpp_code.map(|c| c.to_string()).unwrap_or_default(),
            rule.last_triggered
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string()),
        ]);
    }
    table
}

/// `gcharge notifications`
pub fn notifications_table(stores: &CockpitStores, unread_only: bool) -> TableDisplay {
    let mut table = TableDisplay::new(vec!["ID", "Priority", "Title", "Message", "Read", "Time"]);
    let notifications = if unread_only {
        stores.notifications.unread()
    } else {
        stores.notifications.list()
    };
    for notification in notifications {
        table.add_row(vec![
            notification.id,
            notification.priority.to_string(),
            notification.title,
            notification.message,
            if notification.read { "yes" } else { "no" }.to_string(),
            notification.timestamp.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

/// `gcharge channels`
pub fn channels_table(stores: &CockpitStores) -> TableDisplay {
    let mut table = TableDisplay::new(vec!["ID", "Name", "Type", "Target", "Enabled", "Status"]);
    for channel in stores.channels.list() {
        let target = channel_target(&channel);
        table.add_row(vec![
            channel.id,
            channel.name,
            channel.kind.to_string(),
            target,
            if channel.enabled { "enabled" } else { "disabled" }.to_string(),
            format!("{:?}", channel.status).to_lowercase(),
        ]);
    }
    table
}

fn channel_target(channel: &AlarmChannel) -> String {
    if !channel.config.recipients.is_empty() {
        return channel.config.recipients.join(", ");
    }
    match (&channel.config.channel, &channel.config.url) {
        (Some(name), _) => name.clone(),
        (None, Some(url)) => url.clone(),
        (None, None) => String::new(),
    }
}

/// `gcharge channels --test <id>`
pub async fn test_channel(stores: &CockpitStores, id: &str) -> Result<AlarmChannel> {
    let spinner = ui::spinner(&format!("Sending test message through channel {}", id))?;
    let tester = RandomChannelTester::default();
    let result = stores.channels.test_channel(id, &tester).await;
    spinner.finish_and_clear();
    Ok(result?)
}

/// `gcharge devices`
pub fn devices_table(stores: &CockpitStores, status: Option<DeviceStatus>) -> TableDisplay {
    let mut table = TableDisplay::new(vec![
        "ID", "Name", "Type", "IP", "Firmware", "Status", "Signal", "Stations",
    ]);
    let devices = match status {
        Some(status) => stores.devices.by_status(status),
        None => stores.devices.list(),
    };
    for device in devices {
        table.add_row(vec![
            device.id,
            device.name,
            device.kind.to_string(),
            device.ip_address,
            device.firmware_version,
            device.status.to_string(),
            device
                .signal_strength
                .map(|s| format!("{}%", s))
                .unwrap_or_else(|| "-".to_string()),
            device.stations.join(", "),
        ]);
    }
    table
}

/// `gcharge groups`
pub fn groups_table(stores: &CockpitStores) -> TableDisplay {
    let mut table = TableDisplay::new(vec![
        "ID", "Name", "Stations", "Model", "Firmware", "Health", "Last update", "Open update",
    ]);
    for group in stores.groups.list() {
        let health = stores
            .group_health(&group.id)
            .map(|h| h.to_string())
            .unwrap_or_default();
        let open = stores
            .updates
            .active_for(&group.id)
            .map(|u| {
                format!(
                    "{} {} ({})",
                    u.version,
                    u.scheduled_time.format("%Y-%m-%d %H:%M"),
                    u.status
                )
            })
            .unwrap_or_default();
        table.add_row(vec![
            group.id,
            group.name,
            group.stations.join(", "),
            format!("{} {}", group.manufacturer, group.model),
            group.current_version,
            health,
            group
                .last_update
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "never".to_string()),
            open,
        ]);
    }
    table
}

/// `gcharge firmware catalog`
pub fn firmware_table(stores: &CockpitStores, manufacturer: Option<&str>) -> TableDisplay {
    let mut table = TableDisplay::new(vec![
        "Manufacturer", "Model", "Version", "Type", "Released", "Size", "Requires", "Compatible",
    ]);
    let images = match manufacturer {
        Some(manufacturer) => stores.firmware.for_manufacturer(manufacturer),
        None => stores.firmware.list(),
    };
    for firmware in images {
        table.add_row(vec![
            firmware.manufacturer,
            firmware.model,
            firmware.version,
            firmware.release_type.to_string(),
            firmware.release_date.to_string(),
            format!("{:.1} MB", firmware.size_mb),
            firmware.required_version,
            firmware.compatibility.join(", "),
        ]);
    }
    table
}

/// `gcharge firmware updates`
pub fn updates_table(stores: &CockpitStores, group: Option<&str>) -> TableDisplay {
    let mut table = TableDisplay::new(vec![
        "ID", "Group", "Version", "Scheduled", "Strategy", "Status", "Attempts", "Failed",
    ]);
    let updates = match group {
        Some(group) => stores.updates.for_group(group),
        None => stores.updates.list(),
    };
    for update in updates {
        let failed = update
            .last_report
            .as_ref()
            .map(|r| r.failed.join(", "))
            .unwrap_or_default();
        table.add_row(vec![
            update.id,
            update.group_id,
            update.version,
            update.scheduled_time.format("%Y-%m-%d %H:%M").to_string(),
            update.options.strategy.to_string(),
            update.status.to_string(),
            format!("{}/{}", update.attempts, update.options.retry_attempts + 1),
            failed,
        ]);
    }
    table
}

/// `gcharge firmware schedule`
///
/// Without an explicit version the newest upgrade available to the group is
/// picked.
pub fn schedule_update(
    stores: &CockpitStores,
    group_id: &str,
    version: Option<&str>,
    at: DateTime<Utc>,
    options: UpdateOptions,
) -> Result<ScheduledUpdate> {
    let group = stores
        .groups
        .get(group_id)
        .ok_or_else(|| anyhow!("Unknown group '{}'", group_id))?;

    let firmware = match version {
        Some(version) => stores
            .firmware
            .for_model(&group.manufacturer, &group.model)
            .into_iter()
            .find(|f| f.version == version)
            .ok_or_else(|| {
                anyhow!(
                    "No {} {} firmware {} in the catalogue",
                    group.manufacturer,
                    group.model,
                    version
                )
            })?,
        None => stores
            .firmware
            .upgrades_for(&group)
            .into_iter()
            .next()
            .ok_or_else(|| {
                anyhow!(
                    "No firmware upgrade from {} available for {}",
                    group.current_version,
                    group.name
                )
            })?,
    };

    Ok(stores.updates.schedule(&group, &firmware, at, options)?)
}

/// Image file types accepted by `gcharge firmware upload`
pub const FIRMWARE_EXTENSIONS: [&str; 3] = ["bin", "hex", "fw"];

/// Fields of `gcharge firmware upload`
#[derive(Debug, Clone)]
pub struct FirmwareUpload {
    pub file: PathBuf,
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub required_version: String,
    pub release_type: ReleaseType,
    pub compatibility: Vec<String>,
    pub changelog: Vec<String>,
}

/// `gcharge firmware upload`
pub async fn upload_firmware(
    stores: &CockpitStores,
    upload: FirmwareUpload,
    transfer: &dyn FirmwareTransfer,
) -> Result<FirmwareVersion> {
    let extension = upload
        .file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !FIRMWARE_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "{} is not a firmware image (expected .{})",
            upload.file.display(),
            FIRMWARE_EXTENSIONS.join(", .")
        );
    }
    let metadata = tokio::fs::metadata(&upload.file)
        .await
        .with_context(|| format!("Failed to read {}", upload.file.display()))?;

    let mut compatibility = upload.compatibility;
    if !compatibility.iter().any(|m| m.eq_ignore_ascii_case(&upload.model)) {
        compatibility.insert(0, upload.model.clone());
    }
    let firmware = FirmwareVersion {
        id: FirmwareVersion::catalogue_id(&upload.manufacturer, &upload.model, &upload.version),
        manufacturer: upload.manufacturer,
        model: upload.model,
        version: upload.version,
        release_date: Utc::now().date_naive(),
        release_type: upload.release_type,
        changelog: upload.changelog,
        size_mb: metadata.len() as f64 / (1024.0 * 1024.0),
        compatibility,
        required_version: upload.required_version,
        hash: None,
        signature: None,
    };

    let spinner = ui::spinner(&format!("Uploading {}", upload.file.display()))?;
    let result = stores.firmware.upload(firmware, transfer).await;
    spinner.finish_and_clear();
    Ok(result?)
}

/// Transfer selected by `gcharge firmware run` options
pub fn select_transfer(
    fail: &[String],
    success_rate: Option<f64>,
    seed: Option<u64>,
) -> Box<dyn FirmwareTransfer> {
    match (success_rate, seed) {
        (Some(rate), Some(seed)) => Box::new(RandomFirmwareTransfer::with_seed(rate, seed)),
        (Some(rate), None) => Box::new(RandomFirmwareTransfer::new(rate)),
        (None, _) => Box::new(ScriptedTransfer::new().failing_on(fail.iter().cloned())),
    }
}

/// `gcharge firmware run`: one update by id, or everything due at `now`
pub async fn run_updates(
    stores: &CockpitStores,
    update_id: Option<&str>,
    transfer: &dyn FirmwareTransfer,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledUpdate>> {
    match update_id {
        Some(id) => Ok(vec![stores.run_update(id, transfer, now).await?]),
        None => Ok(stores.run_due_updates(transfer, now).await),
    }
}

/// `gcharge settings` actions
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsCommand {
    Show,
    Set { key: String, value: String },
    Reset { confirmed: bool },
}

/// `gcharge settings`
pub async fn settings(path: &Path, command: SettingsCommand) -> Result<()> {
    let display = StatusDisplay::new();
    let store = SettingsStore::load(path)
        .await
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;

    match command {
        SettingsCommand::Show => {
            display.section_header(&format!("Settings ({})", path.display()));
            for (key, value) in store.get().await.entries() {
                display.key_value(key, &value);
            }
        }
        SettingsCommand::Set { key, value } => {
            let patch = SettingsPatch::from_pair(&key, &value)?;
            store.update(patch).await?;
            store.save(path).await?;
            display.success(&format!("{} set to {}", key, value));
        }
        SettingsCommand::Reset { confirmed } => {
            if !confirmed && !ui::confirm("Reset all settings to defaults?", false)? {
                display.info("Settings left unchanged");
                return Ok(());
            }
            store.reset().await;
            store.save(path).await?;
            display.success("Settings reset to defaults");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcharge_diagnostics::{StepDefinition, StepStatus};
    use gcharge_store::Settings;
    use gcharge_types::StationStatus;

    fn fast_config() -> DiagnosticsConfig {
        DiagnosticsConfig {
            tick_interval_ms: 1,
            progress_increment: 50,
            evaluation_delay_ms: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_evaluator_selection() {
        let safety = StepDefinition::new("safety", "Safety Systems", "");
        let power = StepDefinition::new("power", "Power System Test", "");

        let mut options = DiagnoseOptions::new("CS001", "station");
        options.fail = vec!["safety".to_string()];
        let scripted = options.evaluator();
        assert!(!scripted.evaluate("CS001", &safety).await);
        assert!(scripted.evaluate("CS001", &power).await);

        options.pass_rate = Some(1.0);
        options.seed = Some(7);
        let random = options.evaluator();
        assert!(random.evaluate("CS001", &safety).await);
    }

    #[tokio::test]
    async fn test_run_diagnostics_with_forced_failure() {
        let mut options = DiagnoseOptions::new("CS001", "station");
        options.fail = vec!["safety".to_string()];
        options.json = true;

        let summary = run_diagnostics(fast_config(), &options).await.unwrap();
        assert_eq!(summary.current_index, 5);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.results[2].status, StepStatus::Failed);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_run_diagnostics_cancel_after() {
        let config = DiagnosticsConfig {
            evaluation_delay_ms: 10_000,
            ..Default::default()
        };
        let mut options = DiagnoseOptions::new("DEV001", "device");
        options.cancel_after = Some(Duration::from_millis(20));
        options.json = true;

        let summary = run_diagnostics(config, &options).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.failed_count(), 5);
    }

    #[tokio::test]
    async fn test_unknown_battery() {
        let options = DiagnoseOptions::new("CS001", "firmware");
        let err = run_diagnostics(fast_config(), &options).await.unwrap_err();
        assert!(err.to_string().contains("Unknown battery 'firmware'"));
    }

    #[tokio::test]
    async fn test_run_group_diagnostics() {
        let stores = CockpitStores::demo().unwrap();
        let mut options = GroupDiagnoseOptions::new("group1", "station");
        options.steps = vec!["power".to_string(), "safety".to_string()];
        options.fail = vec!["safety".to_string()];
        options.json = true;

        let summary = run_group_diagnostics(&stores, fast_config(), &options)
            .await
            .unwrap();
        assert_eq!(summary.runs.len(), 3);
        assert!(summary.runs.iter().all(|r| r.results.len() == 2));
        assert_eq!(summary.failed_targets(), vec!["CS001", "CS002", "CS003"]);

        options.fail.clear();
        let summary = run_group_diagnostics(&stores, fast_config(), &options)
            .await
            .unwrap();
        assert!(summary.all_passed());
    }

    #[tokio::test]
    async fn test_group_diagnostics_errors() {
        let stores = CockpitStores::demo().unwrap();

        let options = GroupDiagnoseOptions::new("group9", "station");
        let err = run_group_diagnostics(&stores, fast_config(), &options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown group 'group9'"));

        let mut options = GroupDiagnoseOptions::new("group1", "station");
        options.steps = vec!["firmware".to_string()];
        assert!(run_group_diagnostics(&stores, fast_config(), &options)
            .await
            .is_err());
    }

    #[test]
    fn test_schedule_update_picks_newest_upgrade() {
        let stores = CockpitStores::demo().unwrap();
        stores.updates.delete("update1").unwrap();

        let update =
            schedule_update(&stores, "group1", None, Utc::now(), UpdateOptions::default()).unwrap();
        assert_eq!(update.version, "2.1.1");
        assert!(!updates_table(&stores, Some("group1")).is_empty());

        // ABB 3.0.2 needs 3.0.0 installed
        let err = schedule_update(&stores, "group2", None, Utc::now(), UpdateOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("No firmware upgrade"));
        assert!(schedule_update(
            &stores,
            "group2",
            Some("3.0.2"),
            Utc::now(),
            UpdateOptions::default()
        )
        .is_err());
        assert!(schedule_update(&stores, "group9", None, Utc::now(), UpdateOptions::default())
            .is_err());
    }

    #[tokio::test]
    async fn test_upload_firmware() {
        let stores = CockpitStores::demo().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("terra-3.1.0.BIN");
        std::fs::write(&image, vec![0u8; 2048]).unwrap();

        let upload = |file: PathBuf| FirmwareUpload {
            file,
            manufacturer: "ABB".to_string(),
            model: "Terra DC".to_string(),
            version: "3.1.0".to_string(),
            required_version: "3.0.0".to_string(),
            release_type: ReleaseType::Beta,
            compatibility: vec!["Terra HP".to_string()],
            changelog: vec![],
        };

        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "x").unwrap();
        assert!(upload_firmware(&stores, upload(notes), &ScriptedTransfer::new())
            .await
            .is_err());

        let rejected = ScriptedTransfer::new().rejecting_uploads();
        assert!(upload_firmware(&stores, upload(image.clone()), &rejected)
            .await
            .is_err());

        let firmware = upload_firmware(&stores, upload(image), &ScriptedTransfer::new())
            .await
            .unwrap();
        assert_eq!(firmware.compatibility, vec!["Terra DC", "Terra HP"]);
        assert!(firmware.size_mb > 0.0);
        assert_eq!(stores.firmware.latest("ABB", "Terra HP").unwrap().version, "3.1.0");
        assert_eq!(firmware_table(&stores, Some("abb")).render().lines().count(), 4);
    }

    #[tokio::test]
    async fn test_run_updates() {
        let stores = CockpitStores::demo().unwrap();
        let transfer = select_transfer(&["CS003".to_string()], None, None);

        let finished = run_updates(&stores, None, transfer.as_ref(), Utc::now())
            .await
            .unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, gcharge_types::UpdateStatus::Pending);
        assert_eq!(finished[0].attempts, 1);

        // The retry is not due yet, but can be forced by id
        assert!(run_updates(&stores, None, transfer.as_ref(), Utc::now())
            .await
            .unwrap()
            .is_empty());
        let clean = select_transfer(&[], None, None);
        let forced = run_updates(&stores, Some("update1"), clean.as_ref(), Utc::now())
            .await
            .unwrap();
        assert_eq!(forced[0].status, gcharge_types::UpdateStatus::Completed);
        assert!(groups_table(&stores).render().contains("2.1.1"));
    }

    #[test]
    fn test_describe_target() {
        assert!(describe_target("CS001")
            .unwrap()
            .contains("North Mall Parking"));
        assert!(describe_target("DEV002").unwrap().contains("Sierra Wireless"));
        assert!(describe_target("CS999").is_none());
    }

    #[test]
    fn test_tables() {
        let stores = CockpitStores::demo().unwrap();

        let filter = StationFilter {
            status: Some(StationStatus::Error),
            ..Default::default()
        };
        let table = stations_table(&stores, &filter);
        assert!(!table.is_empty());

        let filter = StationFilter {
            location: Some("nowhere".to_string()),
            ..Default::default()
        };
        assert!(stations_table(&stores, &filter).is_empty());

        assert!(!rules_table(&stores).is_empty());
        assert!(!notifications_table(&stores, true).is_empty());
        stores.notifications.mark_all_read();
        assert!(notifications_table(&stores, true).is_empty());
        assert!(!channels_table(&stores).is_empty());
        assert!(devices_table(&stores, Some(DeviceStatus::Offline)).is_empty());
        assert!(!batteries_table(&DiagnosticsConfig::default()).is_empty());
        assert!(!groups_table(&stores).is_empty());
        assert!(!firmware_table(&stores, None).is_empty());
        assert!(firmware_table(&stores, Some("Gersan")).is_empty());
        assert!(!updates_table(&stores, None).is_empty());
    }

    #[test]
    fn test_channel_target() {
        let channels = CockpitStores::demo().unwrap().channels.list();
        assert_eq!(
            channel_target(&channels[0]),
            "maintenance@example.com, support@example.com"
        );
        assert_eq!(channel_target(&channels[2]), "#ev-alerts");
    }

    #[tokio::test]
    async fn test_settings_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcharge").join("settings.toml");

        settings(&path, SettingsCommand::Show).await.unwrap();
        assert!(!path.exists());

        settings(
            &path,
            SettingsCommand::Set {
                key: "theme".to_string(),
                value: "dark".to_string(),
            },
        )
        .await
        .unwrap();
        let stored = SettingsStore::load(&path).await.unwrap().get().await;
        assert_eq!(stored.theme, gcharge_store::Theme::Dark);

        let err = settings(
            &path,
            SettingsCommand::Set {
                key: "sync_interval_secs".to_string(),
                value: "0".to_string(),
            },
        )
        .await;
        assert!(err.is_err());

        settings(&path, SettingsCommand::Reset { confirmed: true })
            .await
            .unwrap();
        let stored = SettingsStore::load(&path).await.unwrap().get().await;
        assert_eq!(stored, Settings::default());
    }
}
