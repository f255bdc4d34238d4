//! Network device inventory

use crate::repository::{MemoryStore, Record};
use gcharge_types::{CockpitResult, DeviceKind, DeviceStatus, NetworkDevice};
use std::ops::Deref;

impl Record for NetworkDevice {
    const KIND: &'static str = "device";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> CockpitResult<()> {
        NetworkDevice::validate(self)
    }
}

#[derive(Clone, Default)]
pub struct DeviceStore {
    records: MemoryStore<NetworkDevice>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_status(&self, status: DeviceStatus) -> Vec<NetworkDevice> {
        self.records.filter(|d| d.status == status)
    }

    pub fn by_type(&self, kind: DeviceKind) -> Vec<NetworkDevice> {
        self.records.filter(|d| d.kind == kind)
    }

    /// Devices that carry traffic for `station_id`
    pub fn serving(&self, station_id: &str) -> Vec<NetworkDevice> {
        self.records.filter(|d| d.serves(station_id))
    }
}

impl Deref for DeviceStore {
    type Target = MemoryStore<NetworkDevice>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}
