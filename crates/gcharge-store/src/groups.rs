//! Station groups

use crate::repository::{MemoryStore, Record};
use chrono::{DateTime, Utc};
use gcharge_types::{CockpitError, CockpitResult, FirmwareVersionNumber, StationGroup};
use std::ops::Deref;
use tracing::info;

impl Record for StationGroup {
    const KIND: &'static str = "group";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        StationGroup::validate(self)
    }
}

#[derive(Clone, Default)]
pub struct GroupStore {
    records: MemoryStore<StationGroup>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups listing `station_id` as a member
    pub fn containing(&self, station_id: &str) -> Vec<StationGroup> {
        self.records.filter(|g| g.contains(station_id))
    }

    pub fn members(&self, id: &str) -> CockpitResult<Vec<String>> {
        self.records
            .get(id)
            .map(|g| g.stations)
            .ok_or_else(|| CockpitError::not_found(StationGroup::KIND, id))
    }

    /// Record a finished firmware update across the group
    pub fn set_version(
        &self,
        id: &str,
        version: &str,
        at: DateTime<Utc>,
    ) -> CockpitResult<StationGroup> {
        FirmwareVersionNumber::parse("version", version)?;
        let group = self.records.modify(id, |g| {
            g.current_version = version.to_string();
            g.last_update = Some(at);
        })?;
        info!("Group {} ({}) now runs firmware {}", group.id, group.name, version);
        Ok(group)
    }
}

impl Deref for GroupStore {
    type Target = MemoryStore<StationGroup>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;

    fn store() -> GroupStore {
        let store = GroupStore::new();
        for group in demo::groups() {
            store.create(group).unwrap();
        }
        store
    }

    #[test]
    fn test_membership_queries() {
        let store = store();
        let ids: Vec<String> = store.containing("CS002").into_iter().map(|g| g.id).collect();
        assert_eq!(ids, vec!["group1"]);
        assert!(store.containing("CS999").is_empty());

        assert_eq!(store.members("group2").unwrap(), vec!["CS004", "CS005"]);
        assert!(store.members("group9").is_err());
    }

    #[test]
    fn test_set_version() {
        let store = store();
        let at = Utc::now();

        let group = store.set_version("group1", "2.1.1", at).unwrap();
        assert_eq!(group.current_version, "2.1.1");
        assert_eq!(group.last_update, Some(at));

        assert!(store.set_version("group1", "next", at).is_err());
        assert_eq!(store.get("group1").unwrap().current_version, "2.1.1");
        assert!(store.set_version("group9", "1.0", at).is_err());
    }
}
