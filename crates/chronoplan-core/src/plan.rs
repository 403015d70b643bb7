//! Date-indexed task plan.
//!
//! The [`Plan`] owns every planned task in an arena keyed by [`TaskId`];
//! dates only hold ids. Tasks are put on a date with [`Plan::add_tasks`],
//! which keeps within the day's free minutes and block capacity and hands
//! back what does not fit. [`Plan::update_plan`] carries that rollover
//! forward day by day until everything has a date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::calendar::Calendar;
use crate::config::Config;
use crate::error::{CoreError, PlanError, Result, ValidationError};
use crate::task::{Task, TaskId, TaskStatus, Tasks};
use crate::time::DateExt;

/// Tasks laid out over dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "PlanFile", try_from = "PlanFile")]
pub struct Plan {
    tasks: BTreeMap<TaskId, Task>,
    plan_dict: BTreeMap<NaiveDate, Vec<TaskId>>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of planned tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.plan_dict.keys().copied()
    }

    /// Tasks on `date`, highest priority first.
    pub fn tasks_on(&self, date: NaiveDate) -> Vec<&Task> {
        self.plan_dict
            .get(&date)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Vec<&Task>)> + '_ {
        self.plan_dict.keys().map(|&date| (date, self.tasks_on(date)))
    }

    /// Date each task is assigned to.
    pub fn inverse(&self) -> BTreeMap<TaskId, NaiveDate> {
        self.plan_dict
            .iter()
            .flat_map(|(date, ids)| ids.iter().map(move |id| (id.clone(), *date)))
            .collect()
    }

    /// Put `incoming` on `date` next to the tasks already there.
    ///
    /// Tasks whose categories name a block with enough free minutes are
    /// booked into the smallest such block. The rest must fit the day's
    /// empty minutes; the lowest-priority ones are removed until they do
    /// and returned as rollover, highest priority first.
    pub fn add_tasks(
        &mut self,
        date: NaiveDate,
        incoming: Vec<Task>,
        calendar: &mut Calendar,
        config: &Config,
    ) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .plan_dict
            .remove(&date)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.tasks.remove(&id))
            .collect();
        tasks.extend(incoming);

        let capacity = calendar.capacity(date, config)?;
        let mut blocks = capacity.blocks;
        let mut booked = Vec::new();
        let mut loose = Tasks::new();
        for mut task in tasks {
            task.block = None;
            let minutes = task.remaining_duration();
            let block = blocks
                .iter()
                .filter(|(name, free)| task.categories.contains(*name) && **free >= minutes)
                .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                .map(|(name, _)| name.clone());
            match block {
                Some(name) => {
                    if let Some(free) = blocks.get_mut(&name) {
                        *free -= minutes;
                    }
                    task.block = Some(name);
                    booked.push(task);
                }
                None => loose.push(task),
            }
        }

        loose.sort_by_priority();
        let mut rollover = Vec::new();
        while loose.remaining_duration() > capacity.empty_minutes {
            match loose.pop_lowest() {
                Some(task) => rollover.push(task),
                None => break,
            }
        }
        rollover.reverse();

        loose.extend(booked);
        loose.sort_by_priority();
        let ids = self.plan_dict.entry(date).or_default();
        for mut task in loose {
            task.stamp(date);
            ids.push(task.id.clone());
            self.tasks.insert(task.id.clone(), task);
        }
        if ids.is_empty() {
            self.plan_dict.remove(&date);
        }

        if !rollover.is_empty() {
            debug!(%date, count = rollover.len(), "tasks roll over to the next day");
        }
        Ok(rollover)
    }

    /// Add `tasks` from `date` on, rolling what does not fit forward.
    ///
    /// # Errors
    /// [`PlanError::CapacityExceeded`] when tasks keep rolling over for more
    /// than `planning.max_rollover_days` days.
    pub fn update_plan(
        &mut self,
        date: NaiveDate,
        tasks: Vec<Task>,
        calendar: &mut Calendar,
        config: &Config,
    ) -> Result<()> {
        let mut pending = tasks;
        let mut current = date;
        let mut days = 0u32;
        loop {
            let rollover = self.add_tasks(current, pending, calendar, config)?;
            if rollover.is_empty() {
                return Ok(());
            }
            days += 1;
            if days > config.planning.max_rollover_days {
                return Err(PlanError::CapacityExceeded {
                    since: date,
                    days,
                    tasks: rollover.into_iter().map(|t| t.id).collect(),
                }
                .into());
            }
            current = current.plus_days(1);
            pending = rollover;
        }
    }

    /// Every task must sit strictly after the latest of its planned
    /// dependencies. Dependencies missing from the plan do not constrain.
    pub fn check_precedence(&self) -> std::result::Result<(), PlanError> {
        let dates = self.inverse();
        for (id, task) in &self.tasks {
            let Some(&task_date) = dates.get(id) else {
                continue;
            };
            let limiting = task
                .dependencies
                .iter()
                .filter_map(|dep| dates.get(dep).map(|&d| (dep, d)))
                .max_by_key(|&(_, d)| d);
            if let Some((dep, dep_date)) = limiting {
                if task_date < dep_date.plus_days(1) {
                    return Err(PlanError::PrecedenceViolation {
                        task: id.clone(),
                        task_date,
                        dependency: dep.clone(),
                        dependency_date: dep_date,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), tasks = self.len(), "plan saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Flat, persisted form of a planned task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub project_name: String,
    /// `roadmap.project`.
    pub project_id: String,
    pub task_id: TaskId,
    pub priority: f64,
    pub duration: u32,
    /// Comma-joined dependency ids.
    #[serde(default)]
    pub dependencies: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_date: Option<NaiveDate>,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            name: task.name.clone(),
            project_name: task.project_name.clone(),
            project_id: task.id.project_id(),
            task_id: task.id.clone(),
            priority: task.priority,
            duration: task.duration,
            dependencies: task
                .dependencies
                .iter()
                .map(TaskId::to_string)
                .collect::<Vec<_>>()
                .join(","),
            notes: task.notes.clone(),
            status: task.status,
            categories: task.categories.clone(),
            deadline: task.deadline,
            original_date: task.original_date,
        }
    }
}

impl TryFrom<TaskRecord> for Task {
    type Error = ValidationError;

    fn try_from(record: TaskRecord) -> std::result::Result<Self, Self::Error> {
        let dependencies = record
            .dependencies
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<std::result::Result<BTreeSet<TaskId>, _>>()?;
        Ok(Task {
            id: record.task_id,
            name: record.name,
            project_name: record.project_name,
            priority: record.priority,
            duration: record.duration,
            status: record.status,
            dependencies,
            categories: record.categories,
            deadline: record.deadline,
            notes: record.notes,
            temp_date: None,
            original_date: record.original_date,
            block: None,
        })
    }
}

/// On-disk shape of a [`Plan`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanFile(BTreeMap<NaiveDate, Vec<TaskRecord>>);

impl From<Plan> for PlanFile {
    fn from(plan: Plan) -> Self {
        PlanFile(
            plan.iter()
                .map(|(date, tasks)| (date, tasks.into_iter().map(TaskRecord::from).collect()))
                .collect(),
        )
    }
}

impl TryFrom<PlanFile> for Plan {
    type Error = CoreError;

    fn try_from(file: PlanFile) -> Result<Self> {
        let mut plan = Plan::new();
        for (date, records) in file.0 {
            for record in records {
                let mut task = Task::try_from(record)?;
                if plan.tasks.contains_key(&task.id) {
                    return Err(ValidationError::DuplicateTask(task.id).into());
                }
                task.temp_date = Some(date);
                plan.plan_dict.entry(date).or_default().push(task.id.clone());
                plan.tasks.insert(task.id.clone(), task);
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DayOverride;
    use crate::entry::EntryDecl;
    use crate::time::Time;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn task(code: &str, priority: f64, minutes: u32) -> Task {
        Task::new(TaskId::new("work", "site", code), code, &Config::default())
            .with_priority(priority)
            .with_duration(minutes)
    }

    /// Days with exactly `minutes` of free time, for the first days of March.
    fn tight_calendar(minutes: u32) -> Calendar {
        let start = Time::new(8, 0).unwrap();
        let overrides = (1..=31)
            .map(|day| {
                (
                    d(day),
                    DayOverride {
                        start: Some(start),
                        end: Some(start.plus_minutes(minutes)),
                        entries: Vec::new(),
                    },
                )
            })
            .collect();
        Calendar::new(overrides, Vec::new())
    }

    fn codes(plan: &Plan, date: NaiveDate) -> Vec<&str> {
        plan.tasks_on(date).iter().map(|t| t.id.task.as_str()).collect()
    }

    #[test]
    fn lowest_priority_rolls_over() {
        let config = Config::default();
        let mut calendar = tight_calendar(120);
        let mut plan = Plan::new();
        let rollover = plan
            .add_tasks(
                d(1),
                vec![task("a", 5.0, 60), task("b", 1.0, 60), task("c", 9.0, 60)],
                &mut calendar,
                &config,
            )
            .unwrap();
        assert_eq!(codes(&plan, d(1)), vec!["c", "a"]);
        assert_eq!(rollover.iter().map(|t| t.id.task.as_str()).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(plan.get(&TaskId::new("work", "site", "c")).unwrap().temp_date, Some(d(1)));
    }

    #[test]
    fn existing_tasks_are_merged_first() {
        let config = Config::default();
        let mut calendar = tight_calendar(120);
        let mut plan = Plan::new();
        plan.add_tasks(d(1), vec![task("a", 5.0, 60)], &mut calendar, &config).unwrap();
        let rollover = plan
            .add_tasks(d(1), vec![task("b", 5.0, 60), task("c", 5.0, 60)], &mut calendar, &config)
            .unwrap();
        assert_eq!(codes(&plan, d(1)), vec!["a", "b"]);
        assert_eq!(rollover.len(), 1);
    }

    #[test]
    fn update_plan_rolls_forward_until_done() {
        let config = Config::default();
        let mut calendar = tight_calendar(60);
        let mut plan = Plan::new();
        let tasks = vec![task("a", 3.0, 60), task("b", 2.0, 60), task("c", 1.0, 60)];
        plan.update_plan(d(1), tasks, &mut calendar, &config).unwrap();
        assert_eq!(codes(&plan, d(1)), vec!["a"]);
        assert_eq!(codes(&plan, d(2)), vec!["b"]);
        assert_eq!(codes(&plan, d(3)), vec!["c"]);
        assert_eq!(plan.len(), 3);
        let c = plan.get(&TaskId::new("work", "site", "c")).unwrap();
        assert_eq!(c.original_date, Some(d(3)));
    }

    #[test]
    fn oversized_task_exceeds_capacity() {
        let mut config = Config::default();
        config.planning.max_rollover_days = 3;
        let mut calendar = tight_calendar(60);
        let mut plan = Plan::new();
        let err = plan
            .update_plan(d(1), vec![task("huge", 1.0, 90)], &mut calendar, &config)
            .unwrap_err();
        match err {
            CoreError::Plan(PlanError::CapacityExceeded { since, days, tasks }) => {
                assert_eq!(since, d(1));
                assert_eq!(days, 4);
                assert_eq!(tasks, vec![TaskId::new("work", "site", "huge")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn matching_block_takes_tasks_off_free_time() {
        let config = Config::default();
        let host = EntryDecl::new("Deep work")
            .with_start(Time::new(9, 0).unwrap())
            .with_normaltime(90)
            .with_movable(false)
            .with_block("focus")
            .build(&config)
            .unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            d(1),
            DayOverride {
                start: Some(Time::new(9, 0).unwrap()),
                end: Some(Time::new(11, 30).unwrap()),
                entries: vec![host],
            },
        );
        let mut calendar = Calendar::new(overrides, Vec::new());
        let mut plan = Plan::new();
        let rollover = plan
            .add_tasks(
                d(1),
                vec![
                    task("write", 1.0, 60).with_category("focus"),
                    task("mail", 1.0, 60),
                    task("review", 1.0, 60).with_category("focus"),
                ],
                &mut calendar,
                &config,
            )
            .unwrap();
        // 90 block minutes take "write"; 60 free minutes take "mail".
        let write = plan.get(&TaskId::new("work", "site", "write")).unwrap();
        assert_eq!(write.block.as_deref(), Some("focus"));
        assert_eq!(codes(&plan, d(1)).len(), 2);
        assert_eq!(rollover.len(), 1);
        assert_eq!(rollover[0].id.task, "review");
    }

    #[test]
    fn precedence_violations_are_reported() {
        let config = Config::default();
        let mut calendar = tight_calendar(600);
        let mut plan = Plan::new();
        let first = task("first", 1.0, 30);
        let second = task("second", 1.0, 30).with_dependency(first.id.clone());
        plan.add_tasks(d(2), vec![second], &mut calendar, &config).unwrap();
        plan.add_tasks(d(1), vec![first.clone()], &mut calendar, &config).unwrap();
        assert!(plan.check_precedence().is_ok());

        let mut same_day = Plan::new();
        let second = task("second", 1.0, 30).with_dependency(first.id.clone());
        same_day
            .add_tasks(d(1), vec![first, second], &mut calendar, &config)
            .unwrap();
        let err = same_day.check_precedence().unwrap_err();
        assert!(matches!(err, PlanError::PrecedenceViolation { task_date, dependency_date, .. }
            if task_date == d(1) && dependency_date == d(1)));
    }

    #[test]
    fn unplanned_dependencies_do_not_constrain() {
        let config = Config::default();
        let mut calendar = tight_calendar(600);
        let mut plan = Plan::new();
        let t = task("solo", 1.0, 30).with_dependency(TaskId::new("x", "y", "z"));
        plan.add_tasks(d(1), vec![t], &mut calendar, &config).unwrap();
        assert!(plan.check_precedence().is_ok());
    }

    #[test]
    fn persists_as_date_keyed_records() {
        let config = Config::default();
        let mut calendar = tight_calendar(600);
        let mut plan = Plan::new();
        let first = task("first", 2.0, 30).with_category("desk");
        let second = task("second", 1.0, 45).with_dependency(first.id.clone());
        plan.add_tasks(d(1), vec![first], &mut calendar, &config).unwrap();
        plan.add_tasks(d(2), vec![second], &mut calendar, &config).unwrap();

        let json = serde_json::to_value(&plan).unwrap();
        let record = &json["2024-03-02"][0];
        assert_eq!(record["task_id"], "work.site.second");
        assert_eq!(record["project_id"], "work.site");
        assert_eq!(record["dependencies"], "work.site.first");
        assert_eq!(record["status"], "todo");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        plan.save(&path).unwrap();
        let loaded = Plan::load(&path).unwrap();
        assert_eq!(loaded.inverse(), plan.inverse());
        assert_eq!(
            loaded.get(&TaskId::new("work", "site", "second")).unwrap().dependencies,
            plan.get(&TaskId::new("work", "site", "second")).unwrap().dependencies
        );
    }
}
