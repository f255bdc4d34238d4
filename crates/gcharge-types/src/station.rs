//! Charging station records

use crate::{CockpitError, CockpitResult, FirmwareVersionNumber};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Operational status of a charging station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    /// Charging normally
    Operational,
    /// Running with active warnings
    Warning,
    /// Out of service because of a fault
    Error,
    /// Taken offline for maintenance
    Maintenance,
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StationStatus::Operational => write!(f, "operational"),
            StationStatus::Warning => write!(f, "warning"),
            StationStatus::Error => write!(f, "error"),
            StationStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl std::str::FromStr for StationStatus {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "operational" => Ok(StationStatus::Operational),
            "warning" => Ok(StationStatus::Warning),
            "error" => Ok(StationStatus::Error),
            "maintenance" => Ok(StationStatus::Maintenance),
            other => Err(CockpitError::validation(
                "status",
                format!("unknown station status '{}'", other),
            )),
        }
    }
}

/// Signal strength of the station uplinks in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSignal {
    pub wifi: u8,
    pub cellular: u8,
}

/// Charging station as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station identifier (e.g. `CS001`)
    pub id: String,
    /// Human readable location
    pub location: String,
    /// Current status
    pub status: StationStatus,
    /// Current power output in kW
    pub power_kw: f64,
    /// Utilization in percent
    pub utilization: f64,
    /// Uptime in percent
    pub uptime: f64,
    /// Date of the last maintenance visit
    pub last_maintenance: NaiveDate,
    /// Date of the next scheduled maintenance visit
    pub next_maintenance: NaiveDate,
    /// Active alert messages
    #[serde(default)]
    pub alerts: Vec<String>,
    /// Uplink signal strength
    #[serde(default)]
    pub network: NetworkSignal,
}

impl Station {
    /// Check the record for values the dashboard cannot display
    pub fn validate(&self) -> CockpitResult<()> {
        if self.id.trim().is_empty() {
            return Err(CockpitError::validation("id", "must not be empty"));
        }
        if self.power_kw < 0.0 {
            return Err(CockpitError::validation("power_kw", "must not be negative"));
        }
        if !(0.0..=100.0).contains(&self.utilization) {
            return Err(CockpitError::validation(
                "utilization",
                "must be between 0 and 100",
            ));
        }
        if !(0.0..=100.0).contains(&self.uptime) {
            return Err(CockpitError::validation("uptime", "must be between 0 and 100"));
        }
        if self.next_maintenance < self.last_maintenance {
            return Err(CockpitError::validation(
                "next_maintenance",
                "must not precede last_maintenance",
            ));
        }
        Ok(())
    }

    /// Whether maintenance is due on or before `today`
    pub fn maintenance_due(&self, today: NaiveDate) -> bool {
        self.next_maintenance <= today
    }

    /// Whether the station needs operator attention
    pub fn needs_attention(&self) -> bool {
        matches!(self.status, StationStatus::Warning | StationStatus::Error) || !self.alerts.is_empty()
    }
}

/// Roll-up health of a station group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupHealth {
    Healthy,
    Warning,
    Critical,
}

impl GroupHealth {
    /// Worst status among `statuses`; an error anywhere makes the group critical
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = StationStatus>,
    {
        statuses
            .into_iter()
            .map(|status| match status {
                StationStatus::Operational => GroupHealth::Healthy,
                StationStatus::Warning | StationStatus::Maintenance => GroupHealth::Warning,
                StationStatus::Error => GroupHealth::Critical,
            })
            .max()
            .unwrap_or(GroupHealth::Healthy)
    }
}

impl std::fmt::Display for GroupHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupHealth::Healthy => write!(f, "healthy"),
            GroupHealth::Warning => write!(f, "warning"),
            GroupHealth::Critical => write!(f, "critical"),
        }
    }
}

/// Stations of one model managed and updated together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationGroup {
    pub id: String,
    pub name: String,
    /// Member station ids
    pub stations: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    /// Firmware version installed across the group
    pub current_version: String,
    pub last_update: Option<DateTime<Utc>>,
}

impl StationGroup {
    pub fn validate(&self) -> CockpitResult<()> {
        if self.id.trim().is_empty() {
            return Err(CockpitError::validation("id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(CockpitError::validation("name", "must not be empty"));
        }
        if self.stations.is_empty() {
            return Err(CockpitError::validation("stations", "must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.stations.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(CockpitError::validation(
                "stations",
                format!("'{}' is listed twice", dup),
            ));
        }
        FirmwareVersionNumber::parse("current_version", &self.current_version)?;
        Ok(())
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.iter().any(|s| s == station_id)
    }
}
