//! # Chronoplan Core Library
//!
//! This library provides the planning and scheduling engine behind the
//! `chronoplan` CLI. It spreads a user's projects over calendar dates and
//! then lays each date out as a 00:00-24:00 timeline.
//!
//! ## Architecture
//!
//! - **Planning**: projects cluster their tasks and propose dates; the plan
//!   fits them into each day's free time and rolls the excess forward
//! - **Scheduling**: each planned date becomes a gap-free timeline where
//!   movable entries are compressed or stretched around immovable ones
//! - **Declaration**: TOML/JSON input model for roadmaps, routines, day
//!   overrides and one-off entries
//! - **Configuration**: TOML-based defaults and planning bounds
//!
//! ## Key Components
//!
//! - [`Engine`]: one derivation run over a declaration
//! - [`Plan`]: tasks laid out over dates
//! - [`Schedules`]: per-date timelines
//! - [`Entries`]: the timeline fitting algorithm
//! - [`Config`]: engine configuration

pub mod calendar;
pub mod config;
pub mod declaration;
pub mod engine;
pub mod entries;
pub mod entry;
pub mod error;
pub mod plan;
pub mod project;
pub mod routine;
pub mod schedule;
pub mod task;
pub mod time;

pub use calendar::{Calendar, Capacity, Day, DayOverride};
pub use config::Config;
pub use declaration::Declaration;
pub use engine::Engine;
pub use entries::{Addition, Entries, Fitted};
pub use entry::{Entry, EntryDecl};
pub use error::{ConfigError, CoreError, PlanError, ValidationError};
pub use plan::{Plan, TaskRecord};
pub use project::{Project, Roadmap, Subplan};
pub use routine::{Routine, Validity};
pub use schedule::{Schedule, Schedules};
pub use task::{Task, TaskId, TaskStatus, Tasks};
pub use time::{DateExt, Time};
