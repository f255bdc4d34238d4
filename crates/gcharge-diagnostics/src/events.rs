//! # Diagnostic Events
//!
//! This module provides the event stream emitted by diagnostic runs and the
//! handler trait used to observe it.

use crate::run::StepStatus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Diagnostic event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
pub enum DiagnosticEvent {
    /// Run created and first step started
    RunStarted {
        run_id: Uuid,
        target_id: String,
        step_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Step entered `Running`
    StepStarted {
        run_id: Uuid,
        target_id: String,
        step_index: usize,
        step_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Step progress changed
    StepProgressed {
        run_id: Uuid,
        target_id: String,
        step_index: usize,
        progress: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Step reached a terminal status
    StepFinished {
        run_id: Uuid,
        target_id: String,
        step_index: usize,
        step_id: String,
        status: StepStatus,
        result: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every step was evaluated
    RunCompleted {
        run_id: Uuid,
        target_id: String,
        passed: usize,
        failed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run was cancelled
    RunCancelled {
        run_id: Uuid,
        target_id: String,
        /// Step that was running when the cancel landed
        step_index: Option<usize>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl DiagnosticEvent {
    /// Get event timestamp
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::StepStarted { timestamp, .. }
            | Self::StepProgressed { timestamp, .. }
            | Self::StepFinished { timestamp, .. }
            | Self::RunCompleted { timestamp, .. }
            | Self::RunCancelled { timestamp, .. } => *timestamp,
        }
    }

    /// Get event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepProgressed { .. } => "step_progressed",
            Self::StepFinished { .. } => "step_finished",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunCancelled { .. } => "run_cancelled",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepProgressed { run_id, .. }
            | Self::StepFinished { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunCancelled { run_id, .. } => *run_id,
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Self::RunStarted { target_id, .. }
            | Self::StepStarted { target_id, .. }
            | Self::StepProgressed { target_id, .. }
            | Self::StepFinished { target_id, .. }
            | Self::RunCompleted { target_id, .. }
            | Self::RunCancelled { target_id, .. } => target_id,
        }
    }

    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunCancelled { .. })
    }

    /// Get event severity (for filtering)
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::StepProgressed { .. } => EventSeverity::Debug,
            Self::StepFinished {
                status: StepStatus::Failed,
                ..
            }
            | Self::RunCancelled { .. } => EventSeverity::Warning,
            Self::RunCompleted { failed, .. } if *failed > 0 => EventSeverity::Warning,
            _ => EventSeverity::Info,
        }
    }
}

/// Event severity levels for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug = 0,
    Info = 1,
    Warning = 2,
}

/// Event handler trait
#[async_trait::async_trait]
pub trait DiagnosticEventHandler: Send + Sync {
    /// Handle a diagnostic event
    async fn handle_event(&self, event: DiagnosticEvent);
}

/// Writes events to `tracing`
pub struct LoggingEventHandler {
    /// Minimum severity to log
    min_severity: EventSeverity,
}

impl LoggingEventHandler {
    /// Create a new logging event handler
    pub fn new(min_severity: EventSeverity) -> Self {
        Self { min_severity }
    }
}

impl Default for LoggingEventHandler {
    fn default() -> Self {
        Self::new(EventSeverity::Info)
    }
}

#[async_trait::async_trait]
impl DiagnosticEventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: DiagnosticEvent) {
        if event.severity() < self.min_severity {
            return;
        }

        let run_id = event.run_id();
        let target_id = event.target_id();
        let event_type = event.event_type();

        match event.severity() {
            EventSeverity::Debug => {
                debug!(%run_id, target_id, "{}: {:?}", event_type, event);
            }
            EventSeverity::Info => {
                info!(%run_id, target_id, "{}: {:?}", event_type, event);
            }
            EventSeverity::Warning => {
                warn!(%run_id, target_id, "{}: {:?}", event_type, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finished(status: StepStatus) -> DiagnosticEvent {
        DiagnosticEvent::StepFinished {
            run_id: Uuid::nil(),
            target_id: "CS001".to_string(),
            step_index: 2,
            step_id: "safety".to_string(),
            status,
            result: status.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_properties() {
        let event = finished(StepStatus::Completed);
        assert_eq!(event.event_type(), "step_finished");
        assert_eq!(event.target_id(), "CS001");
        assert_eq!(event.run_id(), Uuid::nil());
        assert!(!event.is_terminal());
        assert_eq!(event.severity(), EventSeverity::Info);

        assert_eq!(finished(StepStatus::Failed).severity(), EventSeverity::Warning);
    }

    #[test]
    fn test_run_severity() {
        let cancelled = DiagnosticEvent::RunCancelled {
            run_id: Uuid::nil(),
            target_id: "CS001".to_string(),
            step_index: Some(1),
            timestamp: Utc::now(),
        };
        assert!(cancelled.is_terminal());
        assert_eq!(cancelled.severity(), EventSeverity::Warning);

        let clean = DiagnosticEvent::RunCompleted {
            run_id: Uuid::nil(),
            target_id: "CS001".to_string(),
            passed: 5,
            failed: 0,
            timestamp: Utc::now(),
        };
        assert_eq!(clean.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_event_serialization() {
        let event = finished(StepStatus::Failed);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_finished");
        assert_eq!(json["data"]["status"], "failed");

        let back: DiagnosticEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(EventSeverity::Debug < EventSeverity::Info);
        assert!(EventSeverity::Info < EventSeverity::Warning);
    }

    #[tokio::test]
    async fn test_logging_handler_accepts_all_events() {
        let handler = LoggingEventHandler::new(EventSeverity::Debug);
        handler.handle_event(finished(StepStatus::Failed)).await;
        handler
            .handle_event(DiagnosticEvent::StepProgressed {
                run_id: Uuid::nil(),
                target_id: "CS001".to_string(),
                step_index: 0,
                progress: 10,
                timestamp: Utc::now(),
            })
            .await;
    }
}
