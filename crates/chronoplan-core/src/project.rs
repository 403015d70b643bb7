//! Projects and roadmaps.
//!
//! A [`Project`] owns an ordered list of tasks and a date window. Its todo
//! tasks are grouped into clusters of `cluster_size`, and each cluster is
//! given a target date by [`Project::subplan`]: evenly spread up to the end
//! date, or stepped by a fixed interval. Deadlines and dependencies on tasks
//! that already have a date pull clusters earlier or push them later.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::PlanError;
use crate::task::{Task, TaskId, Tasks};
use crate::time::DateExt;

/// Candidate date per task id, as produced by [`Project::subplan`].
pub type Subplan = BTreeMap<NaiveDate, Vec<TaskId>>;

/// A group of related tasks planned over a date window.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub roadmap: String,
    pub name: String,
    pub tasks: Tasks,
    pub priority: f64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Days between consecutive clusters when there is no end date.
    pub interval: Option<u32>,
    pub cluster_size: usize,
}

/// How cluster offsets are spread over the window.
#[derive(Debug, Clone, Copy)]
enum Spacing {
    /// Evenly up to a fixed end date.
    Until(NaiveDate),
    /// A fixed number of days apart.
    Every(u32),
}

impl Spacing {
    /// Offset in days of cluster `j` out of `remaining`, counted from
    /// `window_start`.
    fn offset(self, window_start: NaiveDate, j: usize, remaining: usize) -> i64 {
        match self {
            Spacing::Until(end) => {
                let ndays = window_start.days_until(end).max(0) as f64;
                (j as f64 * ndays / remaining.max(1) as f64).round() as i64
            }
            Spacing::Every(interval) => j as i64 * interval as i64,
        }
    }
}

impl Project {
    pub fn new(roadmap: impl Into<String>, name: impl Into<String>, config: &Config) -> Self {
        Self {
            roadmap: roadmap.into(),
            name: name.into(),
            tasks: Tasks::new(),
            priority: config.defaults.priority,
            start: None,
            end: None,
            interval: None,
            cluster_size: config.planning.cluster_size,
        }
    }

    /// `roadmap.project` identity.
    pub fn id(&self) -> String {
        format!("{}.{}", self.roadmap, self.name)
    }

    /// Todo tasks in project order, split into groups of `cluster_size`.
    ///
    /// A task never shares a cluster with a task it depends on or that
    /// depends on it; the cluster is closed early instead.
    pub fn clusters(&self) -> Vec<Vec<&Task>> {
        self.clusters_of(self.cluster_size)
    }

    fn clusters_of(&self, size: usize) -> Vec<Vec<&Task>> {
        let size = size.max(1);
        let mut clusters = Vec::new();
        let mut current: Vec<&Task> = Vec::new();
        for task in self.tasks.iter().filter(|t| !t.is_done()) {
            let chained = current.iter().any(|other| {
                task.dependencies.contains(&other.id) || other.dependencies.contains(&task.id)
            });
            if current.len() == size || chained {
                clusters.push(std::mem::take(&mut current));
            }
            current.push(task);
        }
        if !current.is_empty() {
            clusters.push(current);
        }
        clusters
    }

    /// Start date, falling back to a stable offset from `plan_start`.
    pub fn start_date(&self, plan_start: NaiveDate, config: &Config) -> NaiveDate {
        self.start.unwrap_or_else(|| {
            plan_start.plus_days(stable_offset(
                &self.name,
                config.planning.default_start_spread_days,
            ))
        })
    }

    /// Assign each cluster a target date.
    ///
    /// `known` holds dates already given to tasks of other projects; they
    /// bound the earliest date of dependent clusters.
    ///
    /// # Errors
    /// [`PlanError::Configuration`] when the window cannot be derived and
    /// [`PlanError::ImpossibleSchedule`] when a cluster has no admissible
    /// date.
    pub fn subplan(
        &self,
        known: &BTreeMap<TaskId, NaiveDate>,
        plan_start: NaiveDate,
        config: &Config,
    ) -> Result<Subplan, PlanError> {
        let start = self.start_date(plan_start, config);
        let mut size = self.cluster_size.max(1);
        let mut clusters = self.clusters_of(size);
        if clusters.is_empty() {
            return Ok(Subplan::new());
        }

        let spacing = if clusters.len() == 1 {
            Spacing::Every(0)
        } else {
            match (self.end, self.interval) {
                (Some(end), _) if end < start => {
                    return Err(PlanError::configuration(
                        self.id(),
                        format!("end date {end} precedes start date {start}"),
                    ));
                }
                (Some(end), _) => {
                    let ndays = start.days_until(end) as usize;
                    let todo = self.tasks.iter().filter(|t| !t.is_done()).count();
                    while ndays < clusters.len() && size < todo {
                        size += 1;
                        clusters = self.clusters_of(size);
                    }
                    if size != self.cluster_size {
                        debug!(project = %self.id(), size, "cluster size raised to fit window");
                    }
                    Spacing::Until(end)
                }
                (None, Some(interval)) => Spacing::Every(interval),
                (None, None) => {
                    return Err(PlanError::configuration(
                        self.id(),
                        "neither an end date nor an interval is defined",
                    ));
                }
            }
        };

        self.tighten(&clusters, spacing, start, known, config)
    }

    /// Walk the clusters in order, restarting the window whenever a cluster
    /// must move earlier (deadline) or later (dependency).
    fn tighten(
        &self,
        clusters: &[Vec<&Task>],
        spacing: Spacing,
        start: NaiveDate,
        known: &BTreeMap<TaskId, NaiveDate>,
        config: &Config,
    ) -> Result<Subplan, PlanError> {
        let mut dates: BTreeMap<TaskId, NaiveDate> = BTreeMap::new();
        let mut subplan = Subplan::new();
        let mut committed: Option<NaiveDate> = None;
        let mut window_start = start;
        let mut first = 0;
        let mut replans = 0u32;
        let mut k = 0;

        while k < clusters.len() {
            let cluster = &clusters[k];
            let date = window_start.plus_days(spacing.offset(
                window_start,
                k - first,
                clusters.len() - first,
            ));
            let earliest = cluster
                .iter()
                .flat_map(|t| t.dependencies.iter())
                .filter_map(|dep| dates.get(dep).or_else(|| known.get(dep)))
                .max()
                .map(|d| d.plus_days(1));
            let latest = cluster
                .iter()
                .filter_map(|t| t.deadline)
                .chain(self.end)
                .min();

            if let (Some(latest), Some(committed)) = (latest, committed) {
                if latest < committed {
                    return Err(PlanError::impossible(format!(
                        "cluster {k} of {} must be planned by {latest}, \
                         but earlier clusters run until {committed}",
                        self.id()
                    )));
                }
            }
            if let (Some(earliest), Some(latest)) = (earliest, latest) {
                if earliest > latest {
                    return Err(PlanError::impossible(format!(
                        "cluster {k} of {} cannot start before {earliest} \
                         but must be planned by {latest}",
                        self.id()
                    )));
                }
            }

            let moved = match (latest, earliest) {
                (Some(latest), _) if latest < date => Some(latest),
                (_, Some(earliest)) if earliest > date => Some(earliest),
                _ => None,
            };
            if let Some(new_start) = moved {
                replans += 1;
                if replans > config.planning.max_replans {
                    return Err(PlanError::impossible(format!(
                        "{} still unresolved after {} re-plans",
                        self.id(),
                        config.planning.max_replans
                    )));
                }
                debug!(project = %self.id(), cluster = k, from = %date, to = %new_start, "re-planning remaining clusters");
                window_start = new_start;
                first = k;
                continue;
            }

            for task in cluster {
                dates.insert(task.id.clone(), date);
                subplan.entry(date).or_default().push(task.id.clone());
            }
            committed = Some(committed.map_or(date, |c| c.max(date)));
            k += 1;
        }

        Ok(subplan)
    }
}

/// Projects grouped under a common name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roadmap {
    pub name: String,
    pub projects: Vec<Project>,
}

impl Roadmap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            projects: Vec::new(),
        }
    }
}

/// Day offset in `0..spread` derived from the SHA-256 digest of `name`.
///
/// Stable across runs and platforms; `spread == 0` always yields 0.
pub fn stable_offset(name: &str, spread: u32) -> i64 {
    if spread == 0 {
        return 0;
    }
    let digest = Sha256::digest(name.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % spread as u64) as i64
}

/// Indices of `projects` in the order they should be planned.
///
/// A project comes after every project it has task dependencies on; ties
/// keep declaration order. Projects caught in a dependency cycle are
/// appended in declaration order.
pub fn planning_order(projects: &[&Project]) -> Vec<usize> {
    let owner: BTreeMap<&TaskId, usize> = projects
        .iter()
        .enumerate()
        .flat_map(|(i, p)| p.tasks.iter().map(move |t| (&t.id, i)))
        .collect();

    let mut needs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); projects.len()];
    let mut unlocks: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); projects.len()];
    for (i, project) in projects.iter().enumerate() {
        for dep in project.tasks.iter().flat_map(|t| t.dependencies.iter()) {
            if let Some(&j) = owner.get(dep) {
                if j != i {
                    needs[i].insert(j);
                    unlocks[j].insert(i);
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..projects.len())
        .filter(|&i| needs[i].is_empty())
        .collect();
    let mut order = Vec::with_capacity(projects.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &next in &unlocks[i] {
            needs[next].remove(&i);
            if needs[next].is_empty() {
                ready.insert(next);
            }
        }
    }

    if order.len() < projects.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let stuck: Vec<usize> = (0..projects.len()).filter(|i| !placed.contains(i)).collect();
        warn!(
            projects = ?stuck.iter().map(|&i| projects[i].id()).collect::<Vec<_>>(),
            "dependency cycle between projects, keeping declaration order"
        );
        order.extend(stuck);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn project(name: &str, tasks: usize) -> Project {
        let config = Config::default();
        let mut p = Project::new("home", name, &config);
        for i in 0..tasks {
            let id = TaskId::new("home", name, format!("t{i}"));
            p.tasks.push(Task::new(id, format!("task {i}"), &config));
        }
        p
    }

    fn dates(subplan: &Subplan) -> Vec<NaiveDate> {
        subplan
            .iter()
            .flat_map(|(date, ids)| std::iter::repeat(*date).take(ids.len()))
            .collect()
    }

    #[test]
    fn clusters_skip_done_tasks() {
        let mut p = project("attic", 5);
        p.cluster_size = 2;
        let done = p.tasks.clone().into_iter().enumerate().map(|(i, t)| {
            if i == 1 {
                t.with_status(crate::task::TaskStatus::Done)
            } else {
                t
            }
        });
        p.tasks = done.collect();
        let sizes: Vec<usize> = p.clusters().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn interval_spacing() {
        let mut p = project("attic", 5);
        p.start = Some(d(2024, 3, 4));
        p.interval = Some(7);
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(
            dates(&plan),
            vec![d(2024, 3, 4), d(2024, 3, 11), d(2024, 3, 18), d(2024, 3, 25), d(2024, 4, 1)]
        );
    }

    #[test]
    fn end_date_spreads_evenly() {
        let mut p = project("attic", 4);
        p.start = Some(d(2024, 3, 1));
        p.end = Some(d(2024, 3, 9));
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(
            dates(&plan),
            vec![d(2024, 3, 1), d(2024, 3, 3), d(2024, 3, 5), d(2024, 3, 7)]
        );
    }

    #[test]
    fn short_window_grows_clusters() {
        let mut p = project("attic", 6);
        p.start = Some(d(2024, 3, 1));
        p.end = Some(d(2024, 3, 3));
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        // Two days of window: six tasks end up in clusters of three.
        assert_eq!(plan.len(), 2);
        assert!(plan.values().all(|ids| ids.len() == 3));
        assert_eq!(plan.keys().next(), Some(&d(2024, 3, 1)));
    }

    #[test]
    fn zero_day_window_is_one_cluster() {
        let mut p = project("attic", 3);
        p.start = Some(d(2024, 3, 1));
        p.end = Some(d(2024, 3, 1));
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[&d(2024, 3, 1)].len(), 3);
    }

    #[test]
    fn missing_window_is_a_configuration_error() {
        let mut p = project("attic", 2);
        p.start = Some(d(2024, 3, 1));
        let err = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default());
        assert!(matches!(err, Err(PlanError::Configuration { .. })));

        p.end = Some(d(2024, 2, 1));
        let err = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default());
        assert!(matches!(err, Err(PlanError::Configuration { .. })));
    }

    #[test]
    fn single_cluster_needs_no_window() {
        let mut p = project("attic", 1);
        p.start = Some(d(2024, 3, 1));
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(dates(&plan), vec![d(2024, 3, 1)]);
        assert!(project("empty", 0)
            .subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn dependency_pushes_remaining_clusters_later() {
        let mut p = project("attic", 3);
        p.start = Some(d(2024, 3, 1));
        p.interval = Some(1);
        let outside = TaskId::new("home", "garage", "clear");
        p.tasks = p
            .tasks
            .clone()
            .into_iter()
            .enumerate()
            .map(|(i, t)| if i == 1 { t.with_dependency(outside.clone()) } else { t })
            .collect();
        let known = BTreeMap::from([(outside, d(2024, 3, 10))]);
        let plan = p.subplan(&known, d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(dates(&plan), vec![d(2024, 3, 1), d(2024, 3, 11), d(2024, 3, 12)]);
    }

    #[test]
    fn deadline_pulls_cluster_earlier() {
        let mut p = project("attic", 3);
        p.start = Some(d(2024, 3, 1));
        p.interval = Some(7);
        p.tasks = p
            .tasks
            .clone()
            .into_iter()
            .enumerate()
            .map(|(i, t)| if i == 1 { t.with_deadline(d(2024, 3, 4)) } else { t })
            .collect();
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(dates(&plan), vec![d(2024, 3, 1), d(2024, 3, 4), d(2024, 3, 11)]);
    }

    #[test]
    fn unsatisfiable_window_is_impossible() {
        let mut p = project("attic", 2);
        p.start = Some(d(2024, 3, 1));
        p.interval = Some(7);
        let outside = TaskId::new("home", "garage", "clear");
        p.tasks = p
            .tasks
            .clone()
            .into_iter()
            .map(|t| t.with_dependency(outside.clone()).with_deadline(d(2024, 3, 5)))
            .collect();
        let known = BTreeMap::from([(outside, d(2024, 3, 6))]);
        let err = p.subplan(&known, d(2024, 3, 1), &Config::default());
        assert!(matches!(err, Err(PlanError::ImpossibleSchedule { .. })));
    }

    #[test]
    fn default_start_is_stable() {
        assert_eq!(stable_offset("attic", 0), 0);
        let a = stable_offset("attic", 14);
        assert_eq!(a, stable_offset("attic", 14));
        assert!((0..14).contains(&a));

        let mut config = Config::default();
        config.planning.default_start_spread_days = 14;
        let p = project("attic", 1);
        assert_eq!(p.start_date(d(2024, 3, 1), &config), d(2024, 3, 1).plus_days(a));
    }

    #[test]
    fn planning_order_follows_dependencies() {
        let mut a = project("a", 1);
        let b = project("b", 1);
        let c = project("c", 1);
        let b_task = b.tasks.iter().next().unwrap().id.clone();
        a.tasks = a.tasks.clone().into_iter().map(|t| t.with_dependency(b_task.clone())).collect();
        assert_eq!(planning_order(&[&a, &b, &c]), vec![1, 0, 2]);
    }

    #[test]
    fn planning_order_survives_cycles() {
        let mut a = project("a", 1);
        let mut b = project("b", 1);
        let a_task = a.tasks.iter().next().unwrap().id.clone();
        let b_task = b.tasks.iter().next().unwrap().id.clone();
        a.tasks = a.tasks.clone().into_iter().map(|t| t.with_dependency(b_task.clone())).collect();
        b.tasks = b.tasks.clone().into_iter().map(|t| t.with_dependency(a_task.clone())).collect();
        let c = project("c", 1);
        assert_eq!(planning_order(&[&a, &b, &c]), vec![2, 0, 1]);
    }

    fn chain(name: &str, tasks: usize) -> Project {
        let mut p = project(name, tasks);
        p.tasks = p
            .tasks
            .clone()
            .into_iter()
            .enumerate()
            .map(|(i, t)| match i {
                0 => t,
                _ => t.with_dependency(TaskId::new("home", name, format!("t{}", i - 1))),
            })
            .collect();
        p
    }

    #[test]
    fn dependent_tasks_never_share_a_cluster() {
        let mut p = chain("garden", 3);
        p.cluster_size = 3;
        let sizes: Vec<usize> = p.clusters().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn short_window_keeps_chains_apart() {
        let mut p = chain("garden", 3);
        p.start = Some(d(2024, 3, 4));
        p.end = Some(d(2024, 3, 6));
        let plan = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default()).unwrap();
        assert_eq!(dates(&plan), vec![d(2024, 3, 4), d(2024, 3, 5), d(2024, 3, 6)]);
    }

    #[test]
    fn chain_longer_than_window_is_impossible() {
        let mut p = chain("garden", 3);
        p.start = Some(d(2024, 3, 4));
        p.end = Some(d(2024, 3, 5));
        let err = p.subplan(&BTreeMap::new(), d(2024, 3, 1), &Config::default());
        assert!(matches!(err, Err(PlanError::ImpossibleSchedule { .. })));
    }

    #[test]
    fn replans_are_bounded() {
        let mut p = project("attic", 3);
        p.start = Some(d(2024, 3, 1));
        p.interval = Some(1);
        let outside = TaskId::new("home", "garage", "clear");
        p.tasks = p
            .tasks
            .clone()
            .into_iter()
            .enumerate()
            .map(|(i, t)| if i == 1 { t.with_dependency(outside.clone()) } else { t })
            .collect();
        let known = BTreeMap::from([(outside, d(2024, 3, 10))]);

        let mut config = Config::default();
        config.planning.max_replans = 0;
        let err = p.subplan(&known, d(2024, 3, 1), &config);
        assert!(matches!(err, Err(PlanError::ImpossibleSchedule { .. })));

        config.planning.max_replans = 1;
        assert!(p.subplan(&known, d(2024, 3, 1), &config).is_ok());
    }
}
