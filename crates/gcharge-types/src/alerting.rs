//! Alerting records: rules, notifications and alarm channels

use crate::{CockpitError, CockpitResult, OcppErrorCode, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comparison used by a rule condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl ComparisonOperator {
    /// Apply the comparison to `observed` against `threshold`
    pub fn compare(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => observed > threshold,
            Self::GreaterOrEqual => observed >= threshold,
            Self::LessThan => observed < threshold,
            Self::LessOrEqual => observed <= threshold,
            Self::Equal => (observed - threshold).abs() < f64::EPSILON,
            Self::NotEqual => (observed - threshold).abs() >= f64::EPSILON,
        }
    }

    /// Symbol as written in rule definitions
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }
}

/// Threshold condition of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Monitored parameter (e.g. `temperature`, `power_output`)
    pub parameter: String,
    pub operator: ComparisonOperator,
    pub value: f64,
    pub unit: String,
}

impl RuleCondition {
    /// Check whether an observed reading triggers the condition
    pub fn matches(&self, observed: f64) -> bool {
        self.operator.compare(observed, self.value)
    }
}

impl std::fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}{}",
            self.parameter,
            self.operator.symbol(),
            self.value,
            self.unit
        )
    }
}

/// Automated response to station telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub condition: RuleCondition,
    /// Actions to take when the rule triggers
    pub actions: Vec<String>,
    pub severity: Severity,
    pub enabled: bool,
    pub last_triggered: Option<DateTime<Utc>>,
    /// OCPP error code associated with the rule, if any
    pub ocpp_code: Option<OcppErrorCode>,
}

impl Rule {
    pub fn validate(&self) -> CockpitResult<()> {
        if self.id.trim().is_empty() {
            return Err(CockpitError::validation("id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(CockpitError::validation("name", "must not be empty"));
        }
        if self.condition.parameter.trim().is_empty() {
            return Err(CockpitError::validation(
                "condition.parameter",
                "must not be empty",
            ));
        }
        if self.actions.is_empty() {
            return Err(CockpitError::validation(
                "actions",
                "at least one action is required",
            ));
        }
        Ok(())
    }
}

/// Visual category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Success,
    Info,
}

/// Notification raised by a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub priority: Severity,
    /// Rule that raised the notification
    pub rule_id: Option<String>,
    pub ocpp_code: Option<OcppErrorCode>,
}

/// Delivery mechanism of an alarm channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Webhook,
    Slack,
    Teams,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Sms => write!(f, "sms"),
            ChannelKind::Webhook => write!(f, "webhook"),
            ChannelKind::Slack => write!(f, "slack"),
            ChannelKind::Teams => write!(f, "teams"),
        }
    }
}

/// Channel specific delivery settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Health of an alarm channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Inactive,
    Error,
}

/// Notification delivery channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmChannel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub config: ChannelConfig,
    pub enabled: bool,
    pub last_tested: Option<DateTime<Utc>>,
    pub status: ChannelStatus,
}

impl AlarmChannel {
    /// Check that the channel carries the settings its kind needs
    pub fn validate(&self) -> CockpitResult<()> {
        if self.id.trim().is_empty() {
            return Err(CockpitError::validation("id", "must not be empty"));
        }
        match self.kind {
            ChannelKind::Email | ChannelKind::Sms if self.config.recipients.is_empty() => Err(
                CockpitError::validation("config.recipients", "at least one recipient is required"),
            ),
            ChannelKind::Webhook | ChannelKind::Slack | ChannelKind::Teams
                if self.config.url.is_none() =>
            {
                Err(CockpitError::validation("config.url", "a URL is required"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_matching() {
        let condition = RuleCondition {
            parameter: "temperature".to_string(),
            operator: ComparisonOperator::GreaterThan,
            value: 75.0,
            unit: "°C".to_string(),
        };

        assert!(condition.matches(80.0));
        assert!(!condition.matches(75.0));
        assert_eq!(condition.to_string(), "temperature > 75°C");
    }

    #[test]
    fn test_operator_serialization() {
        let json = serde_json::to_string(&ComparisonOperator::LessOrEqual).unwrap();
        assert_eq!(json, "\"<=\"");
        let op: ComparisonOperator = serde_json::from_str("\"!=\"").unwrap();
        assert_eq!(op, ComparisonOperator::NotEqual);
    }

    #[test]
    fn test_rule_requires_actions() {
        let rule = Rule {
            id: "1".to_string(),
            name: "High Temperature Alert".to_string(),
            condition: RuleCondition {
                parameter: "temperature".to_string(),
                operator: ComparisonOperator::GreaterThan,
                value: 75.0,
                unit: "°C".to_string(),
            },
            actions: vec![],
            severity: Severity::High,
            enabled: true,
            last_triggered: None,
            ocpp_code: Some(OcppErrorCode::HighTemperature),
        };

        assert!(matches!(
            rule.validate(),
            Err(CockpitError::Validation { ref field, .. }) if field == "actions"
        ));
    }

    #[test]
    fn test_channel_validation_by_kind() {
        let mut channel = AlarmChannel {
            id: "3".to_string(),
            name: "Slack Alerts".to_string(),
            kind: ChannelKind::Slack,
            config: ChannelConfig::default(),
            enabled: true,
            last_tested: None,
            status: ChannelStatus::Active,
        };
        assert!(channel.validate().is_err());

        channel.config.url = Some("https://hooks.slack.com/services/xxx".to_string());
        assert!(channel.validate().is_ok());

        channel.kind = ChannelKind::Email;
        assert!(channel.validate().is_err());
    }
}
