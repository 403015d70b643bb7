//! Planning units.
//!
//! A [`Task`] belongs to a project inside a roadmap and is identified by the
//! `roadmap.project.task` triple. During planning a task is moved between
//! dates and stamped with the date it currently sits on; it is never dropped.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::entry::Entry;
use crate::error::ValidationError;

/// `roadmap.project.task` identity of a task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    pub roadmap: String,
    pub project: String,
    pub task: String,
}

impl TaskId {
    pub fn new(
        roadmap: impl Into<String>,
        project: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            roadmap: roadmap.into(),
            project: project.into(),
            task: task.into(),
        }
    }

    /// Resolve a possibly relative reference (`task`, `project.task` or
    /// `roadmap.project.task`) against the declaring roadmap and project.
    pub fn resolve(reference: &str, roadmap: &str, project: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = reference.trim().split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ValidationError::InvalidTaskId(reference.to_string()));
        }
        match parts.as_slice() {
            [task] => Ok(Self::new(roadmap, project, *task)),
            [p, task] => Ok(Self::new(roadmap, *p, *task)),
            [r, p, task] => Ok(Self::new(*r, *p, *task)),
            _ => Err(ValidationError::InvalidTaskId(reference.to_string())),
        }
    }

    /// `roadmap.project` part of the identity.
    pub fn project_id(&self) -> String {
        format!("{}.{}", self.roadmap, self.project)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.roadmap, self.project, self.task)
    }
}

impl FromStr for TaskId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [r, p, t] if !r.is_empty() && !p.is_empty() && !t.is_empty() => {
                Ok(Self::new(*r, *p, *t))
            }
            _ => Err(ValidationError::InvalidTaskId(s.to_string())),
        }
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Completion status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Done,
}

/// A unit of planned work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub project_name: String,
    pub priority: f64,
    /// Minutes of work.
    pub duration: u32,
    #[serde(default)]
    pub status: TaskStatus,
    /// Tasks that must be planned on an earlier date.
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    /// Date the task currently sits on while a plan is being built.
    #[serde(skip)]
    pub temp_date: Option<NaiveDate>,
    /// First date the task was ever assigned to.
    #[serde(default)]
    pub original_date: Option<NaiveDate>,
    /// Block the task was booked into during allocation.
    #[serde(skip)]
    pub block: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>, config: &Config) -> Self {
        Self {
            project_name: id.project.clone(),
            id,
            name: name.into(),
            priority: config.defaults.priority,
            duration: config.defaults.duration,
            status: TaskStatus::Todo,
            dependencies: BTreeSet::new(),
            categories: BTreeSet::new(),
            deadline: None,
            notes: String::new(),
            temp_date: None,
            original_date: None,
            block: None,
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = minutes;
        self
    }

    pub fn with_dependency(mut self, dependency: TaskId) -> Self {
        self.dependencies.insert(dependency);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn with_deadline(mut self, deadline: NaiveDate) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Minutes still to be worked.
    pub fn remaining_duration(&self) -> u32 {
        if self.is_done() {
            0
        } else {
            self.duration
        }
    }

    /// Record the date the task now sits on.
    pub fn stamp(&mut self, date: NaiveDate) {
        self.temp_date = Some(date);
        self.original_date.get_or_insert(date);
    }

    /// Movable timeline entry for the day the task is planned on.
    pub fn to_entry(&self, config: &Config) -> Entry {
        let mut entry = Entry::floating(self.name.clone(), self.duration, self.priority, config);
        entry.categories = self.categories.clone();
        if let Some(block) = &self.block {
            entry.categories.insert(block.clone());
        }
        entry.notes = self.notes.clone();
        entry
    }
}

/// Ordered list of tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tasks(Vec<Task>);

impl Tasks {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, task: Task) {
        self.0.push(task);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Minutes of work left across all tasks.
    pub fn remaining_duration(&self) -> u32 {
        self.0.iter().map(Task::remaining_duration).sum()
    }

    /// Highest priority first; equal priorities keep their order.
    pub fn sort_by_priority(&mut self) {
        self.0.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    }

    /// Remove the lowest-priority task, assuming priority order.
    pub fn pop_lowest(&mut self) -> Option<Task> {
        self.0.pop()
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.0.extend(tasks);
    }
}

impl FromIterator<Task> for Tasks {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Tasks {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tasks {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
