//! # Diagnostics Configuration
//!
//! This module provides the sequencer timing configuration and the named
//! step batteries a run can be started from.

use crate::error::{DiagnosticsError, DiagnosticsResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Name of the built-in charging station battery
pub const STATION_BATTERY: &str = "station";
/// Name of the built-in network device battery
pub const DEVICE_BATTERY: &str = "device";

/// One named check within a battery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Stable identifier, unique within a battery
    pub id: String,
    /// Display name
    pub name: String,
    /// Display description
    #[serde(default)]
    pub description: String,
}

impl StepDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Ordered list of checks run together against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryDefinition {
    /// Battery name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Checks in execution order
    pub steps: Vec<StepDefinition>,
}

/// Main diagnostics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Progress cadence in milliseconds
    pub tick_interval_ms: u64,
    /// Progress added on every tick, in percent
    pub progress_increment: u8,
    /// Time a step runs before its verdict is requested, in milliseconds
    pub evaluation_delay_ms: u64,
    /// Time the evaluator is given to answer, in milliseconds
    pub evaluation_timeout_ms: u64,
    /// Available batteries by name
    pub batteries: HashMap<String, BatteryDefinition>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        let mut batteries = HashMap::new();
        batteries.insert(STATION_BATTERY.to_string(), station_battery());
        batteries.insert(DEVICE_BATTERY.to_string(), device_battery());

        Self {
            tick_interval_ms: 200,
            progress_increment: 10,
            evaluation_delay_ms: 2000,
            evaluation_timeout_ms: 10_000,
            batteries,
        }
    }
}

impl DiagnosticsConfig {
    /// Load configuration from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> DiagnosticsResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(DiagnosticsError::configuration(
                    "Unsupported configuration file format. Use .toml or .json",
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a `.toml` or `.json` file
    pub fn to_file(&self, path: impl AsRef<Path>) -> DiagnosticsResult<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::to_string_pretty(self)?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => {
                return Err(DiagnosticsError::configuration(
                    "Unsupported configuration file format. Use .toml or .json",
                ))
            }
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> DiagnosticsResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(DiagnosticsError::configuration(
                "Tick interval must be greater than 0",
            ));
        }

        if self.progress_increment == 0 || self.progress_increment > 100 {
            return Err(DiagnosticsError::configuration(
                "Progress increment must be between 1 and 100",
            ));
        }

        if self.evaluation_timeout_ms == 0 {
            return Err(DiagnosticsError::configuration(
                "Evaluation timeout must be greater than 0",
            ));
        }

        for (name, battery) in &self.batteries {
            validate_steps(&battery.steps).map_err(|e| {
                DiagnosticsError::configuration(format!("battery '{}': {}", name, e))
            })?;
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn evaluation_delay(&self) -> Duration {
        Duration::from_millis(self.evaluation_delay_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    /// Get battery by name
    pub fn get_battery(&self, name: &str) -> Option<&BatteryDefinition> {
        self.batteries.get(name)
    }

    /// Add battery
    pub fn add_battery(&mut self, battery: BatteryDefinition) {
        self.batteries.insert(battery.name.clone(), battery);
    }

    /// Remove battery
    pub fn remove_battery(&mut self, name: &str) -> Option<BatteryDefinition> {
        self.batteries.remove(name)
    }

    /// Battery names in alphabetical order
    pub fn battery_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.batteries.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Check a step list: non-empty, no blank ids, ids unique
pub fn validate_steps(steps: &[StepDefinition]) -> DiagnosticsResult<()> {
    if steps.is_empty() {
        return Err(DiagnosticsError::configuration(
            "step definitions must not be empty",
        ));
    }

    let mut seen = HashSet::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(DiagnosticsError::configuration(format!(
                "step {} has an empty id",
                index
            )));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(DiagnosticsError::configuration(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
    }

    Ok(())
}

/// Checks run against a charging station
pub fn station_battery() -> BatteryDefinition {
    BatteryDefinition {
        name: STATION_BATTERY.to_string(),
        description: "Full charging station health check".to_string(),
        steps: vec![
            StepDefinition::new(
                "power",
                "Power System Test",
                "Checking power output and stability",
            ),
            StepDefinition::new(
                "network",
                "Network Connectivity",
                "Verifying network connection and signal strength",
            ),
            StepDefinition::new(
                "safety",
                "Safety Systems",
                "Testing ground fault and safety circuits",
            ),
            StepDefinition::new(
                "temperature",
                "Temperature Sensors",
                "Validating temperature monitoring systems",
            ),
            StepDefinition::new(
                "auth",
                "Authorization System",
                "Testing RFID and payment systems",
            ),
        ],
    }
}

/// Checks run against a router, modem or local controller
pub fn device_battery() -> BatteryDefinition {
    BatteryDefinition {
        name: DEVICE_BATTERY.to_string(),
        description: "Network device health check".to_string(),
        steps: vec![
            StepDefinition::new(
                "network",
                "Network Connectivity",
                "Checking uplink reachability",
            ),
            StepDefinition::new(
                "hardware",
                "Hardware Health Check",
                "Reading hardware sensors and counters",
            ),
            StepDefinition::new(
                "firmware",
                "Firmware Verification",
                "Verifying installed firmware image",
            ),
            StepDefinition::new("power", "Power Systems", "Checking supply voltage"),
            StepDefinition::new("memory", "Memory Usage", "Inspecting memory headroom"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiagnosticsConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(200));
        assert_eq!(config.progress_increment, 10);
        assert_eq!(config.evaluation_delay(), Duration::from_secs(2));
        assert_eq!(config.battery_names(), vec!["device", "station"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_station_battery_order() {
        let ids: Vec<String> = station_battery().steps.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["power", "network", "safety", "temperature", "auth"]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DiagnosticsConfig::default();

        config.tick_interval_ms = 0;
        assert!(config.validate().is_err());
        config.tick_interval_ms = 200;

        config.progress_increment = 0;
        assert!(config.validate().is_err());
        config.progress_increment = 101;
        assert!(config.validate().is_err());
        config.progress_increment = 25;
        assert!(config.validate().is_ok());

        config.add_battery(BatteryDefinition {
            name: "broken".to_string(),
            description: String::new(),
            steps: vec![],
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("battery 'broken'"));
    }

    #[test]
    fn test_validate_steps() {
        assert!(validate_steps(&[]).is_err());

        let duplicate = vec![
            StepDefinition::new("a", "First", ""),
            StepDefinition::new("a", "Second", ""),
        ];
        let err = validate_steps(&duplicate).unwrap_err();
        assert_eq!(
            err,
            DiagnosticsError::configuration("duplicate step id 'a'")
        );

        let blank = vec![StepDefinition::new(" ", "Blank", "")];
        assert!(validate_steps(&blank).is_err());

        assert!(validate_steps(&station_battery().steps).is_ok());
    }

    #[test]
    fn test_battery_operations() {
        let mut config = DiagnosticsConfig::default();
        assert!(config.get_battery(STATION_BATTERY).is_some());

        config.add_battery(BatteryDefinition {
            name: "quick".to_string(),
            description: "Single check".to_string(),
            steps: vec![StepDefinition::new("ping", "Ping", "")],
        });
        assert!(config.get_battery("quick").is_some());

        assert!(config.remove_battery("quick").is_some());
        assert!(config.get_battery("quick").is_none());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiagnosticsConfig {
            tick_interval_ms: 50,
            ..Default::default()
        };

        let toml_path = dir.path().join("diagnostics.toml");
        config.to_file(&toml_path).unwrap();
        let loaded = DiagnosticsConfig::from_file(&toml_path).unwrap();
        assert_eq!(loaded, config);

        let json_path = dir.path().join("diagnostics.json");
        config.to_file(&json_path).unwrap();
        let loaded = DiagnosticsConfig::from_file(&json_path).unwrap();
        assert_eq!(loaded.tick_interval_ms, 50);

        let yaml_path = dir.path().join("diagnostics.yaml");
        assert!(config.to_file(&yaml_path).is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: DiagnosticsConfig = toml::from_str("evaluation_delay_ms = 500").unwrap();
        assert_eq!(config.evaluation_delay_ms, 500);
        assert_eq!(config.tick_interval_ms, 200);
        assert!(config.get_battery(STATION_BATTERY).is_some());
    }
}
