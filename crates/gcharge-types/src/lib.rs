//! # G-Charge Types
//!
//! This crate provides the shared domain records of the G-Charge cockpit:
//! charging stations, alerting rules, notifications, alarm channels and
//! network devices, station groups and firmware updates, together with the
//! common error type used by the stores.

pub mod alerting;
pub mod error;
pub mod firmware;
pub mod network;
pub mod station;

pub use alerting::*;
pub use error::*;
pub use firmware::*;
pub use network::*;
pub use station::*;

/// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Generate a fresh record identifier
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// OCPP 1.6J error codes used to label rules and notifications.
///
/// The cockpit does not speak OCPP itself; these only tag records so that
/// operators can correlate them with what a charge point reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OcppErrorCode {
    ConnectorLockFailure,
    EVCommunicationError,
    GroundFailure,
    HighTemperature,
    InternalError,
    LocalListConflict,
    NoError,
    OtherError,
    OverCurrentFailure,
    OverVoltage,
    PowerMeterFailure,
    PowerSwitchFailure,
    ReaderFailure,
    ResetFailure,
    UnderVoltage,
    WeakSignal,
}

impl std::fmt::Display for OcppErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Severity shared by rules and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(CockpitError::validation(
                "severity",
                format!("unknown severity '{}'", other),
            )),
        }
    }
}
