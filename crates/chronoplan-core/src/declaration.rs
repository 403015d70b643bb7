//! Declared input of a planning run.
//!
//! A [`Declaration`] is the serde model of everything the user states up
//! front: roadmaps with their projects and tasks, routines, per-date day
//! overrides and one-off entries. It is read from TOML or JSON and turned
//! into the engine's types, with task ids and dependencies validated along
//! the way.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use crate::calendar::{Calendar, DayOverride};
use crate::config::Config;
use crate::entry::{Entry, EntryDecl};
use crate::error::{Result, ValidationError};
use crate::project::{Project, Roadmap};
use crate::routine::{Routine, Validity};
use crate::task::{Task, TaskId, TaskStatus};
use crate::time::Time;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(default)]
    pub roadmaps: Vec<RoadmapDecl>,
    #[serde(default)]
    pub routines: Vec<RoutineDecl>,
    #[serde(default)]
    pub calendar: Vec<DayDecl>,
    #[serde(default)]
    pub adhoc: Vec<AdhocDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadmapDecl {
    pub name: String,
    #[serde(default)]
    pub projects: Vec<ProjectDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDecl {
    pub name: String,
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub cluster_size: Option<usize>,
    #[serde(default)]
    pub tasks: Vec<TaskDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDecl {
    /// Task code, unique within its project.
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub status: TaskStatus,
    /// `task`, `project.task` or `roadmap.project.task`.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutineDecl {
    #[serde(flatten)]
    pub entry: EntryDecl,
    #[serde(default)]
    pub items: Vec<EntryDecl>,
    /// Restrict to these weekdays.
    #[serde(default)]
    pub weekdays: HashSet<Weekday>,
    /// Restrict to these dates.
    #[serde(default)]
    pub dates: BTreeSet<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDecl {
    pub date: NaiveDate,
    #[serde(default)]
    pub start: Option<Time>,
    #[serde(default)]
    pub end: Option<Time>,
    #[serde(default)]
    pub entries: Vec<EntryDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdhocDecl {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub entry: EntryDecl,
}

impl Declaration {
    /// Read a declaration, choosing the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(ValidationError::InvalidValue {
                field: "declaration".to_string(),
                message: format!(
                    "unsupported file extension {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                ),
            }
            .into()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check everything that [`Engine`](crate::Engine) will need.
    pub fn validate(&self, config: &Config) -> Result<()> {
        self.roadmaps(config)?;
        self.calendar(config)?;
        self.adhoc(config)?;
        Ok(())
    }

    /// Roadmaps with fully resolved tasks.
    ///
    /// # Errors
    /// Duplicate task ids, malformed ids and dependencies on tasks that are
    /// not declared.
    pub fn roadmaps(&self, config: &Config) -> Result<Vec<Roadmap>> {
        let mut known: BTreeSet<TaskId> = BTreeSet::new();
        for r in &self.roadmaps {
            for p in &r.projects {
                for t in &p.tasks {
                    if t.id.is_empty() || t.id.contains('.') {
                        return Err(ValidationError::InvalidTaskId(t.id.clone()).into());
                    }
                    let id = TaskId::new(&r.name, &p.name, &t.id);
                    if !known.insert(id.clone()) {
                        return Err(ValidationError::DuplicateTask(id).into());
                    }
                }
            }
        }

        let mut roadmaps = Vec::with_capacity(self.roadmaps.len());
        for r in &self.roadmaps {
            let mut roadmap = Roadmap::new(&r.name);
            for p in &r.projects {
                roadmap.projects.push(p.build(&r.name, &known, config)?);
            }
            roadmaps.push(roadmap);
        }
        Ok(roadmaps)
    }

    pub fn calendar(&self, config: &Config) -> Result<Calendar> {
        let mut overrides = BTreeMap::new();
        for day in &self.calendar {
            let entries = day
                .entries
                .iter()
                .map(|e| e.clone().build(config))
                .collect::<Result<Vec<_>, _>>()?;
            let day_override = DayOverride {
                start: day.start,
                end: day.end,
                entries,
            };
            if overrides.insert(day.date, day_override).is_some() {
                return Err(ValidationError::InvalidValue {
                    field: "calendar".to_string(),
                    message: format!("{} is declared more than once", day.date),
                }
                .into());
            }
        }
        let routines = self.routines.iter().map(RoutineDecl::build).collect();
        Ok(Calendar::new(overrides, routines))
    }

    /// One-off entries per date.
    pub fn adhoc(&self, config: &Config) -> Result<BTreeMap<NaiveDate, Vec<Entry>>> {
        let mut adhoc: BTreeMap<NaiveDate, Vec<Entry>> = BTreeMap::new();
        for decl in &self.adhoc {
            let entry = decl.entry.clone().build(config)?;
            adhoc.entry(decl.date).or_default().push(entry);
        }
        Ok(adhoc)
    }
}

impl ProjectDecl {
    fn build(&self, roadmap: &str, known: &BTreeSet<TaskId>, config: &Config) -> Result<Project> {
        let mut project = Project::new(roadmap, &self.name, config);
        project.priority = self.priority.unwrap_or(config.defaults.priority);
        project.start = self.start;
        project.end = self.end;
        project.interval = self.interval;
        if let Some(size) = self.cluster_size {
            project.cluster_size = size.max(1);
        }

        for decl in &self.tasks {
            let id = TaskId::new(roadmap, &self.name, &decl.id);
            let mut task = Task::new(id.clone(), decl.name.as_deref().unwrap_or(&decl.id), config)
                .with_priority(decl.priority.unwrap_or(project.priority))
                .with_duration(decl.duration.unwrap_or(config.defaults.duration))
                .with_status(decl.status);
            for reference in &decl.dependencies {
                let dependency = TaskId::resolve(reference, roadmap, &self.name)?;
                if !known.contains(&dependency) {
                    return Err(ValidationError::UnknownDependency {
                        task: id,
                        dependency: reference.clone(),
                    }
                    .into());
                }
                task = task.with_dependency(dependency);
            }
            task.categories = decl.categories.clone();
            task.deadline = decl.deadline;
            task.notes = decl.notes.clone();
            project.tasks.push(task);
        }
        Ok(project)
    }
}

impl RoutineDecl {
    fn build(&self) -> Routine {
        let validity = if !self.dates.is_empty() {
            Validity::Dates(self.dates.clone())
        } else if !self.weekdays.is_empty() {
            Validity::Weekdays(self.weekdays.clone())
        } else {
            Validity::Always
        };
        let mut routine = Routine::new(self.entry.clone()).with_validity(validity);
        routine.items = self.items.clone();
        routine
    }
}
