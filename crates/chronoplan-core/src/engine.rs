//! Plan and schedule derivation.
//!
//! [`Engine`] ties the pieces together for one run: projects are subplanned
//! in dependency order and poured into the [`Plan`] with rollover, then every
//! planned date is laid out as a [`Schedule`]. Derivation is a pure function
//! of the declaration, the configuration and the plan start date.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::declaration::Declaration;
use crate::error::Result;
use crate::plan::Plan;
use crate::project::{planning_order, Project};
use crate::schedule::{Schedule, Schedules};
use crate::task::{Task, TaskId};
use crate::time::DateExt;

/// A planning run over a declaration snapshot.
#[derive(Debug, Clone)]
pub struct Engine {
    declaration: Declaration,
    config: Config,
    plan_start: NaiveDate,
}

impl Engine {
    pub fn new(declaration: Declaration, config: Config, plan_start: NaiveDate) -> Self {
        Self {
            declaration,
            config,
            plan_start,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plan_start(&self) -> NaiveDate {
        self.plan_start
    }

    /// Put every todo task on a date.
    ///
    /// # Errors
    /// Any validation error in the declaration, and every
    /// [`PlanError`](crate::PlanError) raised while subplanning, allocating
    /// or checking precedence.
    pub fn derive_plan(&self) -> Result<Plan> {
        let config = &self.config;
        let roadmaps = self.declaration.roadmaps(config)?;
        let mut calendar = self.declaration.calendar(config)?;

        let projects: Vec<&Project> = roadmaps.iter().flat_map(|r| r.projects.iter()).collect();
        let tasks: BTreeMap<&TaskId, &Task> = projects
            .iter()
            .flat_map(|p| p.tasks.iter())
            .map(|t| (&t.id, t))
            .collect();

        let mut plan = Plan::new();
        for index in planning_order(&projects) {
            let project = projects[index];
            let subplan = project.subplan(&plan.inverse(), self.plan_start, config)?;
            debug!(project = %project.id(), dates = subplan.len(), "subplan ready");
            for (date, ids) in subplan {
                let batch = ids
                    .iter()
                    .filter_map(|id| tasks.get(id).map(|&t| t.clone()))
                    .collect();
                plan.update_plan(date, batch, &mut calendar, config)?;
            }
        }

        plan.check_precedence()?;
        info!(tasks = plan.len(), days = plan.dates().count(), "plan derived");
        Ok(plan)
    }

    /// Derive the plan and lay it out day by day.
    pub fn derive_schedules(&self) -> Result<Schedules> {
        let plan = self.derive_plan()?;
        self.schedule(&plan)
    }

    /// Lay an existing plan out day by day.
    ///
    /// Covers every date from the first planned or ad-hoc date to the last.
    /// Movable entries that overflow a day are offered to the next one; the
    /// run continues past the last date while such entries remain, for at
    /// most `planning.max_rollover_days` days.
    pub fn schedule(&self, plan: &Plan) -> Result<Schedules> {
        let config = &self.config;
        let mut calendar = self.declaration.calendar(config)?;
        let adhoc = self.declaration.adhoc(config)?;

        let mut schedules = Schedules::new();
        let first = plan.dates().chain(adhoc.keys().copied()).min();
        let last = plan.dates().chain(adhoc.keys().copied()).max();
        let (Some(first), Some(last)) = (first, last) else {
            return Ok(schedules);
        };

        let mut carry = Vec::new();
        for date in first.iter_days() {
            if date > last {
                if carry.is_empty() {
                    break;
                }
                if last.days_until(date) > config.planning.max_rollover_days as i64 {
                    warn!(count = carry.len(), "entries still overflowing at the end of the run");
                    break;
                }
            }

            let mut schedule = Schedule::from_day(calendar.day(date, config)?);
            let mut incoming: Vec<_> = plan
                .tasks_on(date)
                .into_iter()
                .filter(|t| !t.is_done())
                .map(|t| t.to_entry(config))
                .collect();
            for entry in adhoc.get(&date).into_iter().flatten() {
                if entry.start.is_some() {
                    schedule.add_adhoc(entry.clone(), config);
                } else {
                    incoming.push(entry.clone());
                }
            }
            incoming.append(&mut carry);
            schedule.add_entries(incoming, config);

            carry = schedule.carryover();
            schedules.insert(schedule);
        }

        info!(days = schedules.len(), "schedules derived");
        Ok(schedules)
    }
}
