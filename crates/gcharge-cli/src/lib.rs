//! # G-Charge CLI Library
//!
//! Building blocks of the `gcharge` binary: command implementations,
//! configuration lookup and terminal rendering.

pub mod commands;
pub mod config;
pub mod ui;

pub use commands::{DiagnoseOptions, FirmwareUpload, GroupDiagnoseOptions, SettingsCommand};
pub use config::LoggingConfig;
pub use ui::{StatusDisplay, StepBars, TableDisplay, TargetBars};
