//! # G-Charge Cockpit CLI
//!
//! Runs diagnostic batteries against stations and network devices and
//! inspects the cockpit's record stores from a terminal.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gcharge_cli::commands::{
    self, DiagnoseOptions, FirmwareUpload, GroupDiagnoseOptions, SettingsCommand,
};
use gcharge_cli::config::{load_diagnostics_config, resolve_settings_path, LoggingConfig};
use gcharge_cli::ui::StatusDisplay;
use gcharge_store::{CockpitStores, StationFilter};
use gcharge_types::{
    ChannelStatus, DateTime, DeviceStatus, ReleaseType, StationStatus, UpdateOptions,
    UpdateStatus, UpdateStrategy, Utc,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gcharge")]
#[command(about = "G-Charge Cockpit - diagnostics and monitoring for EV charging networks")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a diagnostic battery against a station or device
    Diagnose(DiagnoseArgs),
    /// List the configured diagnostic batteries
    Batteries {
        /// Diagnostics configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List charging stations
    Stations {
        /// Only stations in this status
        #[arg(short, long)]
        status: Option<StationStatus>,
        /// Case-insensitive location substring
        #[arg(short, long)]
        location: Option<String>,
    },
    /// List alerting rules
    Rules,
    /// List notifications
    Notifications {
        /// Only unread notifications
        #[arg(short, long)]
        unread: bool,
    },
    /// List alarm channels, optionally sending a test message
    Channels {
        /// Channel to test
        #[arg(short, long, value_name = "ID")]
        test: Option<String>,
    },
    /// List network devices
    Devices {
        /// Only devices in this status
        #[arg(short, long)]
        status: Option<DeviceStatus>,
    },
    /// List station groups with their health and firmware
    Groups,
    /// Run a diagnostic battery against every station of a group
    GroupDiagnose(GroupDiagnoseArgs),
    /// Firmware catalogue and group updates
    Firmware {
        #[command(subcommand)]
        action: FirmwareAction,
    },
    /// Show or change persisted settings
    Settings(SettingsArgs),
}

#[derive(Args)]
struct DiagnoseArgs {
    /// Station or device id
    #[arg(short, long)]
    target: String,

    /// Battery to run
    #[arg(short, long, default_value = "station")]
    battery: String,

    /// Step id to force to fail (repeatable)
    #[arg(short, long, value_name = "STEP")]
    fail: Vec<String>,

    /// Pass probability of each step; enables random outcomes
    #[arg(long, value_name = "RATE")]
    pass_rate: Option<f64>,

    /// Seed for random outcomes
    #[arg(long)]
    seed: Option<u64>,

    /// Cancel the run after this many milliseconds
    #[arg(long, value_name = "MS")]
    cancel_after_ms: Option<u64>,

    /// Diagnostics configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GroupDiagnoseArgs {
    /// Station group id
    #[arg(short, long)]
    group: String,

    /// Battery to run
    #[arg(short, long, default_value = "station")]
    battery: String,

    /// Only these step ids, comma separated
    #[arg(long, value_delimiter = ',', value_name = "STEPS")]
    steps: Vec<String>,

    /// Step id to force to fail (repeatable)
    #[arg(short, long, value_name = "STEP")]
    fail: Vec<String>,

    /// Pass probability of each step; enables random outcomes
    #[arg(long, value_name = "RATE")]
    pass_rate: Option<f64>,

    /// Seed for random outcomes
    #[arg(long)]
    seed: Option<u64>,

    /// Cancel every run after this many milliseconds
    #[arg(long, value_name = "MS")]
    cancel_after_ms: Option<u64>,

    /// Diagnostics configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the group summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum FirmwareAction {
    /// List firmware images
    Catalog {
        /// Only images from this manufacturer
        #[arg(short, long)]
        manufacturer: Option<String>,
    },
    /// List scheduled updates
    Updates {
        /// Only updates of this group
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Schedule a firmware update for a group
    Schedule(ScheduleArgs),
    /// Upload a firmware image to the catalogue
    Upload(UploadArgs),
    /// Roll out due updates, or one update by id
    Run {
        /// Update to run now, whatever its scheduled time
        #[arg(short, long, value_name = "ID")]
        update: Option<String>,
        /// Station to fail installing on (repeatable)
        #[arg(short, long, value_name = "STATION")]
        fail: Vec<String>,
        /// Install success probability; enables random outcomes
        #[arg(long, value_name = "RATE")]
        success_rate: Option<f64>,
        /// Seed for random outcomes
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct ScheduleArgs {
    /// Station group id
    #[arg(short, long)]
    group: String,

    /// Firmware version; defaults to the newest upgrade available
    #[arg(long)]
    version: Option<String>,

    /// Start time (RFC 3339); defaults to now
    #[arg(long, value_name = "TIME")]
    at: Option<DateTime<Utc>>,

    /// rolling, parallel or batched
    #[arg(long, default_value = "rolling")]
    strategy: UpdateStrategy,

    /// Retries after a failed rollout (0-5)
    #[arg(long, default_value_t = 3)]
    retry_attempts: u8,

    /// Minutes between retries (15 or more)
    #[arg(long, default_value_t = 30)]
    retry_interval: u32,

    /// Leave updated stations on the new image when a rollout fails
    #[arg(long)]
    no_rollback: bool,

    /// Restrict the rollout to the maintenance window
    #[arg(long)]
    maintenance_window: bool,

    /// Do not post a notification when the update ends
    #[arg(long)]
    no_notify: bool,
}

#[derive(Args)]
struct UploadArgs {
    /// Image file (.bin, .hex or .fw)
    file: PathBuf,

    #[arg(long)]
    manufacturer: String,

    #[arg(long)]
    model: String,

    #[arg(long)]
    version: String,

    /// Oldest installed version the image upgrades from
    #[arg(long)]
    required_version: String,

    /// Publish as a beta release
    #[arg(long)]
    beta: bool,

    /// Further compatible model (repeatable)
    #[arg(long, value_name = "MODEL")]
    compatible: Vec<String>,

    /// Changelog entry (repeatable)
    #[arg(long, value_name = "TEXT")]
    changelog: Vec<String>,
}

#[derive(Args)]
struct SettingsArgs {
    /// Settings file; defaults to the user config directory
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    action: Option<SettingsAction>,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print all settings
    Show,
    /// Change one setting
    Set { key: String, value: String },
    /// Restore defaults
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl From<DiagnoseArgs> for DiagnoseOptions {
    fn from(args: DiagnoseArgs) -> Self {
        Self {
            target: args.target,
            battery: args.battery,
            fail: args.fail,
            pass_rate: args.pass_rate,
            seed: args.seed,
            cancel_after: args.cancel_after_ms.map(Duration::from_millis),
            config: args.config,
            json: args.json,
        }
    }
}

impl From<GroupDiagnoseArgs> for GroupDiagnoseOptions {
    fn from(args: GroupDiagnoseArgs) -> Self {
        Self {
            group: args.group,
            battery: args.battery,
            steps: args.steps,
            fail: args.fail,
            pass_rate: args.pass_rate,
            seed: args.seed,
            cancel_after: args.cancel_after_ms.map(Duration::from_millis),
            config: args.config,
            json: args.json,
        }
    }
}

impl From<&ScheduleArgs> for UpdateOptions {
    fn from(args: &ScheduleArgs) -> Self {
        Self {
            strategy: args.strategy,
            retry_attempts: args.retry_attempts,
            retry_interval_mins: args.retry_interval,
            rollback_enabled: !args.no_rollback,
            maintenance_window: args.maintenance_window,
            notify_users: !args.no_notify,
        }
    }
}

impl From<UploadArgs> for FirmwareUpload {
    fn from(args: UploadArgs) -> Self {
        Self {
            file: args.file,
            manufacturer: args.manufacturer,
            model: args.model,
            version: args.version,
            required_version: args.required_version,
            release_type: if args.beta {
                ReleaseType::Beta
            } else {
                ReleaseType::Stable
            },
            compatibility: args.compatible,
            changelog: args.changelog,
        }
    }
}

impl From<SettingsAction> for SettingsCommand {
    fn from(action: SettingsAction) -> Self {
        match action {
            SettingsAction::Show => SettingsCommand::Show,
            SettingsAction::Set { key, value } => SettingsCommand::Set { key, value },
            SettingsAction::Reset { yes } => SettingsCommand::Reset { confirmed: yes },
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(&LoggingConfig {
        level: cli.log_level.clone(),
        verbose: cli.verbose,
    });

    match cli.command {
        Commands::Diagnose(args) => {
            let summary = commands::diagnose(&args.into()).await?;
            if !summary.all_passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Batteries { config } => {
            let config = load_diagnostics_config(config.as_deref())?;
            commands::batteries_table(&config).display();
        }
        Commands::Stations { status, location } => {
            let stores = demo_stores()?;
            let filter = StationFilter { status, location };
            commands::stations_table(&stores, &filter).display();
        }
        Commands::Rules => commands::rules_table(&demo_stores()?).display(),
        Commands::Notifications { unread } => {
            commands::notifications_table(&demo_stores()?, unread).display()
        }
        Commands::Channels { test } => {
            let stores = demo_stores()?;
            if let Some(id) = test {
                let channel = commands::test_channel(&stores, &id).await?;
                let display = StatusDisplay::new();
                match channel.status {
                    ChannelStatus::Active => {
                        display.success(&format!("Test message delivered via {}", channel.name))
                    }
                    _ => display.error(&format!("Test message via {} failed", channel.name)),
                }
            }
            commands::channels_table(&stores).display();
        }
        Commands::Devices { status } => {
            commands::devices_table(&demo_stores()?, status).display()
        }
        Commands::Groups => commands::groups_table(&demo_stores()?).display(),
        Commands::GroupDiagnose(args) => {
            let summary = commands::group_diagnose(&demo_stores()?, &args.into()).await?;
            if !summary.all_passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Firmware { action } => return firmware(action).await,
        Commands::Settings(args) => {
            let path = resolve_settings_path(args.settings)?;
            let action = args.action.unwrap_or(SettingsAction::Show);
            commands::settings(&path, action.into()).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn firmware(action: FirmwareAction) -> Result<ExitCode> {
    let stores = demo_stores()?;
    let display = StatusDisplay::new();

    match action {
        FirmwareAction::Catalog { manufacturer } => {
            commands::firmware_table(&stores, manufacturer.as_deref()).display()
        }
        FirmwareAction::Updates { group } => {
            commands::updates_table(&stores, group.as_deref()).display()
        }
        FirmwareAction::Schedule(args) => {
            let at = args.at.unwrap_or_else(Utc::now);
            let update = commands::schedule_update(
                &stores,
                &args.group,
                args.version.as_deref(),
                at,
                UpdateOptions::from(&args),
            )?;
            display.success(&format!(
                "Scheduled firmware {} for {} at {}",
                update.version,
                update.group_id,
                update.scheduled_time.format("%Y-%m-%d %H:%M UTC")
            ));
            commands::updates_table(&stores, Some(&update.group_id)).display();
        }
        FirmwareAction::Upload(args) => {
            let transfer = commands::select_transfer(&[], None, None);
            let firmware =
                commands::upload_firmware(&stores, args.into(), transfer.as_ref()).await?;
            display.success(&format!(
                "Uploaded {} {} firmware {} ({:.1} MB)",
                firmware.manufacturer, firmware.model, firmware.version, firmware.size_mb
            ));
        }
        FirmwareAction::Run {
            update,
            fail,
            success_rate,
            seed,
        } => {
            let transfer = commands::select_transfer(&fail, success_rate, seed);
            let finished =
                commands::run_updates(&stores, update.as_deref(), transfer.as_ref(), Utc::now())
                    .await?;
            if finished.is_empty() {
                display.info("No updates due");
            }
            for update in &finished {
                match update.status {
                    UpdateStatus::Completed => display.success(&format!(
                        "{} now runs {}",
                        update.group_id, update.version
                    )),
                    UpdateStatus::Pending => display.warning(&format!(
                        "{} rollout of {} failed, retry at {}",
                        update.group_id,
                        update.version,
                        update.scheduled_time.format("%Y-%m-%d %H:%M UTC")
                    )),
                    _ => display.error(&format!(
                        "{} could not install {}",
                        update.group_id, update.version
                    )),
                }
            }
            commands::groups_table(&stores).display();
            if finished.iter().any(|u| u.status != UpdateStatus::Completed) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn demo_stores() -> Result<CockpitStores> {
    CockpitStores::demo().context("Failed to load cockpit records")
}

fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}
