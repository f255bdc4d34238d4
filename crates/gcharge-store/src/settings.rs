//! # Settings
//!
//! Persisted UI preferences. The file is TOML or JSON by extension; a missing
//! file means defaults.

use gcharge_types::{CockpitError, CockpitResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// File name of the persisted preferences
pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(CockpitError::validation(
                "theme",
                format!("unknown theme '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeFormat::TwelveHour => write!(f, "12h"),
            TimeFormat::TwentyFourHour => write!(f, "24h"),
        }
    }
}

impl FromStr for TimeFormat {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "12h" => Ok(TimeFormat::TwelveHour),
            "24h" => Ok(TimeFormat::TwentyFourHour),
            other => Err(CockpitError::validation(
                "time_format",
                format!("expected 12h or 24h, got '{}'", other),
            )),
        }
    }
}

/// User preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub language: String,
    /// Desktop notifications on/off
    pub notifications: bool,
    pub auto_sync: bool,
    pub sync_interval_secs: u64,
    pub date_format: String,
    pub time_format: TimeFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            language: "en".to_string(),
            notifications: true,
            auto_sync: true,
            sync_interval_secs: 300,
            date_format: "YYYY-MM-DD".to_string(),
            time_format: TimeFormat::TwentyFourHour,
        }
    }
}

impl Settings {
    /// Keys accepted by [`SettingsPatch::from_pair`]
    pub const KEYS: [&'static str; 7] = [
        "theme",
        "language",
        "notifications",
        "auto_sync",
        "sync_interval_secs",
        "date_format",
        "time_format",
    ];

    pub fn validate(&self) -> CockpitResult<()> {
        if self.language.trim().is_empty() {
            return Err(CockpitError::validation("language", "must not be empty"));
        }
        if self.sync_interval_secs == 0 {
            return Err(CockpitError::validation(
                "sync_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.date_format.trim().is_empty() {
            return Err(CockpitError::validation("date_format", "must not be empty"));
        }
        Ok(())
    }

    /// Value of `key` rendered as text
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "theme" => self.theme.to_string(),
            "language" => self.language.clone(),
            "notifications" => self.notifications.to_string(),
            "auto_sync" => self.auto_sync.to_string(),
            "sync_interval_secs" => self.sync_interval_secs.to_string(),
            "date_format" => self.date_format.clone(),
            "time_format" => self.time_format.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// `(key, value)` pairs in display order
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    fn apply(&mut self, patch: SettingsPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        if let Some(auto_sync) = patch.auto_sync {
            self.auto_sync = auto_sync;
        }
        if let Some(interval) = patch.sync_interval_secs {
            self.sync_interval_secs = interval;
        }
        if let Some(date_format) = patch.date_format {
            self.date_format = date_format;
        }
        if let Some(time_format) = patch.time_format {
            self.time_format = time_format;
        }
    }
}

/// Partial update; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub notifications: Option<bool>,
    pub auto_sync: Option<bool>,
    pub sync_interval_secs: Option<u64>,
    pub date_format: Option<String>,
    pub time_format: Option<TimeFormat>,
}

impl SettingsPatch {
    /// Build a single-field patch from text, as typed on a command line
    pub fn from_pair(key: &str, value: &str) -> CockpitResult<Self> {
        let mut patch = Self::default();
        match key {
            "theme" => patch.theme = Some(value.parse()?),
            "language" => patch.language = Some(value.to_string()),
            "notifications" => patch.notifications = Some(parse_bool(key, value)?),
            "auto_sync" => patch.auto_sync = Some(parse_bool(key, value)?),
            "sync_interval_secs" => {
                let interval = value.parse().map_err(|_| {
                    CockpitError::validation(key, format!("'{}' is not a number of seconds", value))
                })?;
                patch.sync_interval_secs = Some(interval);
            }
            "date_format" => patch.date_format = Some(value.to_string()),
            "time_format" => patch.time_format = Some(value.parse()?),
            other => {
                return Err(CockpitError::validation(
                    "key",
                    format!("unknown setting '{}'", other),
                ))
            }
        }
        Ok(patch)
    }
}

fn parse_bool(key: &str, value: &str) -> CockpitResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(CockpitError::validation(
            key,
            format!("'{}' is not a boolean", value),
        )),
    }
}

/// Shared, persistable settings
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Load from `path`, falling back to defaults when the file is missing
    pub async fn load(path: impl AsRef<Path>) -> CockpitResult<Self> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let settings: Settings = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)
                .map_err(|e| CockpitError::serialization(e.to_string()))?,
        };
        settings.validate()?;

        debug!("Loaded settings from {}", path.display());
        Ok(Self::new(settings))
    }

    /// Write the current settings to `path`, creating parent directories
    pub async fn save(&self, path: impl AsRef<Path>) -> CockpitResult<()> {
        let path = path.as_ref();
        let settings = self.get().await;
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(&settings)?,
            _ => toml::to_string_pretty(&settings)
                .map_err(|e| CockpitError::serialization(e.to_string()))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;

        info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Merge `patch` into the current settings
    ///
    /// Nothing changes if the merged result is invalid.
    pub async fn update(&self, patch: SettingsPatch) -> CockpitResult<Settings> {
        let mut settings = self.settings.write().await;
        let mut updated = settings.clone();
        updated.apply(patch);
        updated.validate()?;
        *settings = updated.clone();
        Ok(updated)
    }

    pub async fn reset(&self) -> Settings {
        let defaults = Settings::default();
        *self.settings.write().await = defaults.clone();
        info!("Settings reset to defaults");
        defaults
    }
}
