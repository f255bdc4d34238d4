//! Charging station store

use crate::repository::{MemoryStore, Record};
use chrono::NaiveDate;
use gcharge_types::{CockpitResult, Station, StationStatus};
use std::ops::Deref;
use tracing::info;

impl Record for Station {
    const KIND: &'static str = "station";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        Station::validate(self)
    }
}

/// Criteria for narrowing the station list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationFilter {
    pub status: Option<StationStatus>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
}

impl StationFilter {
    pub fn matches(&self, station: &Station) -> bool {
        if let Some(status) = self.status {
            if station.status != status {
                return false;
            }
        }

        if let Some(ref needle) = self.location {
            let needle = needle.to_lowercase();
            if !station.location.to_lowercase().contains(&needle) {
                return false;
            }
        }

        true
    }
}

#[derive(Clone, Default)]
pub struct StationStore {
    records: MemoryStore<Station>,
}

impl StationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self, filter: &StationFilter) -> Vec<Station> {
        self.records.filter(|s| filter.matches(s))
    }

    pub fn set_status(&self, id: &str, status: StationStatus) -> CockpitResult<Station> {
        let station = self.records.modify(id, |s| s.status = status)?;
        info!("Station {} is now {}", id, status);
        Ok(station)
    }

    pub fn needing_attention(&self) -> Vec<Station> {
        self.records.filter(Station::needs_attention)
    }

    pub fn maintenance_due(&self, today: NaiveDate) -> Vec<Station> {
        self.records.filter(|s| s.maintenance_due(today))
    }

    /// Total power currently delivered, in kW
    pub fn total_power_kw(&self) -> f64 {
        self.records.list().iter().map(|s| s.power_kw).sum()
    }
}

impl Deref for StationStore {
    type Target = MemoryStore<Station>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;

    fn store() -> StationStore {
        let store = StationStore::new();
        for station in demo::stations() {
            store.create(station).unwrap();
        }
        store
    }

    #[test]
    fn test_filter_by_status_and_location() {
        let store = store();

        let filter = StationFilter {
            status: Some(StationStatus::Warning),
            ..Default::default()
        };
        let ids: Vec<String> = store.filter(&filter).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["CS002"]);

        let filter = StationFilter {
            location: Some("PLAZA".to_string()),
            ..Default::default()
        };
        assert_eq!(store.filter(&filter)[0].id, "CS003");

        assert_eq!(store.filter(&StationFilter::default()).len(), 3);
    }

    #[test]
    fn test_set_status() {
        let store = store();
        let station = store
            .set_status("CS003", StationStatus::Maintenance)
            .unwrap();
        assert_eq!(station.status, StationStatus::Maintenance);
        assert_eq!(store.get("CS003").unwrap().status, StationStatus::Maintenance);

        assert!(store.set_status("CS404", StationStatus::Error).is_err());
    }

    #[test]
    fn test_attention_and_maintenance() {
        let store = store();
        let ids: Vec<String> = store
            .needing_attention()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["CS002", "CS003"]);

        let today = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        let due: Vec<String> = store.maintenance_due(today).into_iter().map(|s| s.id).collect();
        assert_eq!(due, vec!["CS002"]);

        assert_eq!(store.total_power_kw(), 270.0);
    }

    #[test]
    fn test_invalid_station_rejected() {
        let store = StationStore::new();
        let mut station = demo::stations().remove(0);
        station.utilization = 140.0;
        assert!(store.create(station).is_err());
    }
}
