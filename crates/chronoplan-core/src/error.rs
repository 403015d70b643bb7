//! Core error types for chronoplan-core.
//!
//! This module defines the error hierarchy using thiserror. Planning
//! failures are fatal to a derivation run and are surfaced verbatim to the
//! caller; the expected remedy is to edit the declaration and re-run.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

use crate::task::TaskId;
use crate::time::Time;

/// Core error type for chronoplan-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Planning and scheduling failures
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors that abort a plan or schedule derivation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A project window cannot be interpreted.
    #[error("project '{project}' is misconfigured: {message}")]
    Configuration { project: String, message: String },

    /// A date or timeline constraint cannot be satisfied.
    #[error("impossible schedule: {message}")]
    ImpossibleSchedule { message: String },

    /// A task landed on or before the date of the dependency it waits for.
    #[error(
        "task {task} is planned on {task_date} but depends on {dependency}, \
         which is planned on {dependency_date}"
    )]
    PrecedenceViolation {
        task: TaskId,
        task_date: NaiveDate,
        dependency: TaskId,
        dependency_date: NaiveDate,
    },

    /// Rollover kept spilling past the allowed number of days.
    #[error(
        "capacity exceeded: {} task(s) still rolling over after {days} day(s) from {since} ({})",
        tasks.len(),
        tasks.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    CapacityExceeded {
        since: NaiveDate,
        days: u32,
        tasks: Vec<TaskId>,
    },
}

impl PlanError {
    pub fn configuration(project: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            project: project.into(),
            message: message.into(),
        }
    }

    pub fn impossible(message: impl Into<String>) -> Self {
        Self::ImpossibleSchedule {
            message: message.into(),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must not precede start ({start})")]
    InvalidTimeRange { start: Time, end: Time },

    /// Clock time outside 00:00-24:00 or unparsable
    #[error("Invalid time '{0}': expected HH:MM between 00:00 and 24:00")]
    InvalidTime(String),

    /// Malformed task identifier
    #[error("Invalid task id '{0}'")]
    InvalidTaskId(String),

    /// Two tasks share an identifier
    #[error("Duplicate task id {0}")]
    DuplicateTask(TaskId),

    /// A dependency does not name a declared task
    #[error("Task {task} depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    #[test]
    fn precedence_message_names_both_tasks_and_dates() {
        let err = PlanError::PrecedenceViolation {
            task: id("life.house.paint"),
            task_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            dependency: id("life.house.buy-paint"),
            dependency_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("life.house.paint"));
        assert!(msg.contains("life.house.buy-paint"));
        assert!(msg.contains("2024-03-01"));
        assert!(msg.contains("2024-03-02"));
    }

    #[test]
    fn capacity_message_lists_tasks() {
        let err = PlanError::CapacityExceeded {
            since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            days: 3,
            tasks: vec![id("a.b.c"), id("a.b.d")],
        };
        assert!(err.to_string().contains("a.b.c, a.b.d"));
    }

    #[test]
    fn plan_error_converts_into_core_error() {
        let err: CoreError = PlanError::impossible("no room").into();
        assert!(matches!(err, CoreError::Plan(PlanError::ImpossibleSchedule { .. })));
        assert_eq!(err.to_string(), "impossible schedule: no room");
    }
}
