//! Sample records shown by the cockpit before a backend is attached

use chrono::{NaiveDate, TimeZone, Utc};
use gcharge_types::{
    AlarmChannel, ChannelConfig, ChannelKind, ChannelStatus, ComparisonOperator, DeviceKind,
    DeviceStatus, FirmwareVersion, NetworkDevice, NetworkSignal, Notification, NotificationKind,
    OcppErrorCode, ReleaseType, Rule, RuleCondition, ScheduledUpdate, Severity, Station,
    StationGroup, StationStatus, UpdateOptions, UpdateStatus,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn march_first_afternoon() -> chrono::DateTime<Utc> {
    at(2024, 3, 1, 14, 30)
}

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn stations() -> Vec<Station> {
    vec![
        Station {
            id: "CS001".to_string(),
            location: "North Mall Parking".to_string(),
            status: StationStatus::Operational,
            power_kw: 150.0,
            utilization: 75.0,
            uptime: 99.8,
            last_maintenance: date(2024, 2, 1),
            next_maintenance: date(2024, 3, 1),
            alerts: vec![],
            network: NetworkSignal {
                wifi: 85,
                cellular: 90,
            },
        },
        Station {
            id: "CS002".to_string(),
            location: "South Station".to_string(),
            status: StationStatus::Warning,
            power_kw: 120.0,
            utilization: 60.0,
            uptime: 98.5,
            last_maintenance: date(2024, 1, 15),
            next_maintenance: date(2024, 2, 15),
            alerts: vec!["High temperature warning".to_string()],
            network: NetworkSignal {
                wifi: 65,
                cellular: 75,
            },
        },
        Station {
            id: "CS003".to_string(),
            location: "East Plaza".to_string(),
            status: StationStatus::Error,
            power_kw: 0.0,
            utilization: 0.0,
            uptime: 85.2,
            last_maintenance: date(2024, 1, 20),
            next_maintenance: date(2024, 2, 20),
            alerts: vec![
                "Communication error".to_string(),
                "Power output failure".to_string(),
            ],
            network: NetworkSignal {
                wifi: 30,
                cellular: 45,
            },
        },
    ]
}

pub fn rules() -> Vec<Rule> {
    vec![Rule {
        id: "1".to_string(),
        name: "High Temperature Alert".to_string(),
        condition: RuleCondition {
            parameter: "temperature".to_string(),
            operator: ComparisonOperator::GreaterThan,
            value: 75.0,
            unit: "°C".to_string(),
        },
        actions: vec![
            "Send notification to maintenance team".to_string(),
            "Reduce charging power by 20%".to_string(),
            "Log event in system".to_string(),
        ],
        severity: Severity::High,
        enabled: true,
        last_triggered: Some(march_first_afternoon()),
        ocpp_code: Some(OcppErrorCode::HighTemperature),
    }]
}

pub fn notifications() -> Vec<Notification> {
    vec![Notification {
        id: "1".to_string(),
        title: "Critical Temperature Alert".to_string(),
        message: "Temperature exceeds threshold (80°C)".to_string(),
        kind: NotificationKind::Error,
        timestamp: march_first_afternoon(),
        read: false,
        priority: Severity::High,
        rule_id: Some("1".to_string()),
        ocpp_code: Some(OcppErrorCode::HighTemperature),
    }]
}

pub fn channels() -> Vec<AlarmChannel> {
    let last_tested = Utc
        .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
        .single();

    vec![
        AlarmChannel {
            id: "1".to_string(),
            name: "Maintenance Team Email".to_string(),
            kind: ChannelKind::Email,
            config: ChannelConfig {
                recipients: vec![
                    "maintenance@example.com".to_string(),
                    "support@example.com".to_string(),
                ],
                ..Default::default()
            },
            enabled: true,
            last_tested,
            status: ChannelStatus::Active,
        },
        AlarmChannel {
            id: "2".to_string(),
            name: "Emergency SMS".to_string(),
            kind: ChannelKind::Sms,
            config: ChannelConfig {
                recipients: vec!["+1234567890".to_string(), "+9876543210".to_string()],
                ..Default::default()
            },
            enabled: true,
            last_tested,
            status: ChannelStatus::Active,
        },
        AlarmChannel {
            id: "3".to_string(),
            name: "Slack Alerts".to_string(),
            kind: ChannelKind::Slack,
            config: ChannelConfig {
                url: Some("https://hooks.slack.com/services/xxx".to_string()),
                channel: Some("#ev-alerts".to_string()),
                ..Default::default()
            },
            enabled: true,
            last_tested,
            status: ChannelStatus::Active,
        },
    ]
}

pub fn devices() -> Vec<NetworkDevice> {
    let now = Utc::now();
    let stations = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    vec![
        NetworkDevice {
            id: "DEV001".to_string(),
            name: "Teltonika RUT950".to_string(),
            kind: DeviceKind::Router,
            model: "RUT950".to_string(),
            manufacturer: "Teltonika".to_string(),
            ip_address: "192.168.1.1".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            firmware_version: "RUT9XX_R_00.07.04.2".to_string(),
            status: DeviceStatus::Online,
            last_seen: now,
            signal_strength: None,
            stations: stations(&["CS001", "CS002", "CS003"]),
        },
        NetworkDevice {
            id: "DEV002".to_string(),
            name: "Sierra Wireless MP70".to_string(),
            kind: DeviceKind::Cellular,
            model: "MP70".to_string(),
            manufacturer: "Sierra Wireless".to_string(),
            ip_address: "10.0.0.2".to_string(),
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
            firmware_version: "SWI9X07A_00.02.05.00".to_string(),
            status: DeviceStatus::Online,
            last_seen: now,
            signal_strength: Some(85),
            stations: stations(&["CS004"]),
        },
        NetworkDevice {
            id: "DEV003".to_string(),
            name: "Local Controller Hub".to_string(),
            kind: DeviceKind::Controller,
            model: "OCPPHub-1000".to_string(),
            manufacturer: "ChargePro".to_string(),
            ip_address: "192.168.1.10".to_string(),
            mac_address: "11:22:33:44:55:66".to_string(),
            firmware_version: "2.1.0".to_string(),
            status: DeviceStatus::Warning,
            last_seen: now,
            signal_strength: None,
            stations: stations(&["CS005", "CS006", "CS007"]),
        },
    ]
}

pub fn groups() -> Vec<StationGroup> {
    vec![
        StationGroup {
            id: "group1".to_string(),
            name: "Mall Stations".to_string(),
            stations: strings(&["CS001", "CS002", "CS003"]),
            manufacturer: "Autel".to_string(),
            model: "MaxiCharger DC".to_string(),
            current_version: "2.1.0".to_string(),
            last_update: Some(at(2024, 2, 15, 0, 0)),
        },
        StationGroup {
            id: "group2".to_string(),
            name: "Airport Stations".to_string(),
            stations: strings(&["CS004", "CS005"]),
            manufacturer: "ABB".to_string(),
            model: "Terra DC".to_string(),
            current_version: "2.0.5".to_string(),
            last_update: Some(at(2024, 2, 20, 0, 0)),
        },
    ]
}

pub fn firmware() -> Vec<FirmwareVersion> {
    vec![
        FirmwareVersion {
            id: FirmwareVersion::catalogue_id("Autel", "MaxiCharger DC", "2.1.0"),
            manufacturer: "Autel".to_string(),
            model: "MaxiCharger DC".to_string(),
            version: "2.1.0".to_string(),
            release_date: date(2024, 1, 10),
            release_type: ReleaseType::Stable,
            changelog: strings(&["OCPP 1.6J smart charging profiles"]),
            size_mb: 23.9,
            compatibility: strings(&["MaxiCharger DC"]),
            required_version: "2.0.0".to_string(),
            hash: Some("sha256:0f1e2d3c4b5a6978".to_string()),
            signature: Some("valid".to_string()),
        },
        FirmwareVersion {
            id: FirmwareVersion::catalogue_id("Autel", "MaxiCharger DC", "2.1.1"),
            manufacturer: "Autel".to_string(),
            model: "MaxiCharger DC".to_string(),
            version: "2.1.1".to_string(),
            release_date: date(2024, 3, 1),
            release_type: ReleaseType::Stable,
            changelog: strings(&[
                "Improved charging efficiency",
                "Enhanced network stability",
                "Fixed payment processing issues",
            ]),
            size_mb: 24.5,
            compatibility: strings(&["MaxiCharger DC"]),
            required_version: "2.0.0".to_string(),
            hash: Some("sha256:1234567890abcdef".to_string()),
            signature: Some("valid".to_string()),
        },
        FirmwareVersion {
            id: FirmwareVersion::catalogue_id("ABB", "Terra DC", "3.0.2"),
            manufacturer: "ABB".to_string(),
            model: "Terra DC".to_string(),
            version: "3.0.2".to_string(),
            release_date: date(2024, 2, 15),
            release_type: ReleaseType::Stable,
            changelog: strings(&[
                "Added support for new payment methods",
                "Improved error handling",
                "Updated security protocols",
            ]),
            size_mb: 32.8,
            compatibility: strings(&["Terra DC", "Terra HP"]),
            required_version: "3.0.0".to_string(),
            hash: Some("sha256:abcdef1234567890".to_string()),
            signature: Some("valid".to_string()),
        },
    ]
}

pub fn updates() -> Vec<ScheduledUpdate> {
    vec![ScheduledUpdate {
        id: "update1".to_string(),
        group_id: "group1".to_string(),
        firmware_id: FirmwareVersion::catalogue_id("Autel", "MaxiCharger DC", "2.1.1"),
        version: "2.1.1".to_string(),
        scheduled_time: at(2024, 3, 15, 2, 0),
        options: UpdateOptions::default(),
        status: UpdateStatus::Pending,
        attempts: 0,
        last_report: None,
        completed_at: None,
    }]
}
