//! Network operations center records

use crate::{CockpitError, CockpitResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of network device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cellular,
    Router,
    Controller,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cellular => write!(f, "cellular"),
            DeviceKind::Router => write!(f, "router"),
            DeviceKind::Controller => write!(f, "controller"),
        }
    }
}

/// Reachability of a network device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Warning => write!(f, "warning"),
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "warning" => Ok(DeviceStatus::Warning),
            other => Err(CockpitError::validation(
                "status",
                format!("unknown device status '{}'", other),
            )),
        }
    }
}

/// Router, modem or local controller connecting stations to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub model: String,
    pub manufacturer: String,
    pub ip_address: String,
    pub mac_address: String,
    pub firmware_version: String,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    /// Signal strength in percent, cellular devices only
    pub signal_strength: Option<u8>,
    /// Stations served by this device
    #[serde(default)]
    pub stations: Vec<String>,
}

impl NetworkDevice {
    pub fn validate(&self) -> CockpitResult<()> {
        if self.id.trim().is_empty() {
            return Err(CockpitError::validation("id", "must not be empty"));
        }
        if self.ip_address.parse::<std::net::IpAddr>().is_err() {
            return Err(CockpitError::validation(
                "ip_address",
                format!("'{}' is not an IP address", self.ip_address),
            ));
        }
        if let Some(signal) = self.signal_strength {
            if signal > 100 {
                return Err(CockpitError::validation(
                    "signal_strength",
                    "must be between 0 and 100",
                ));
            }
        }
        Ok(())
    }

    /// Whether the device serves the given station
    pub fn serves(&self, station_id: &str) -> bool {
        self.stations.iter().any(|s| s == station_id)
    }
}
