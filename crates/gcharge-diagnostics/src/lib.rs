//! # G-Charge Diagnostics
//!
//! This crate runs diagnostic batteries against charging stations and network
//! devices. It supports:
//!
//! - Strictly sequential step execution with timer-driven progress
//! - Pluggable pass/fail evaluators
//! - Ordered, non-overlapping progress and completion callbacks
//! - Idempotent cancellation
//! - One run per target at a time
//! - Group requests fanning one battery out to every member station
//! - Named batteries loaded from TOML or JSON configuration

pub mod config;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod group;
pub mod run;
pub mod sequencer;

pub use config::{BatteryDefinition, DiagnosticsConfig, StepDefinition};
pub use error::{DiagnosticsError, DiagnosticsResult};
pub use evaluator::{RandomEvaluator, ScriptedEvaluator, StepEvaluator};
pub use events::{DiagnosticEvent, DiagnosticEventHandler, EventSeverity, LoggingEventHandler};
pub use group::{select_steps, GroupRunHandle, GroupSummary};
pub use run::{RunState, RunSummary, StepProgress, StepStatus, StepSummary, TestRun, TestStep};
pub use sequencer::{DiagnosticSequencer, TestRunHandle};
