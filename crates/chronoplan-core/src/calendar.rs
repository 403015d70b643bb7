//! Days and the calendar of days.
//!
//! A [`Day`] is the fixed frame a date starts from before any task is put on
//! it: its declared entries, the routines valid on that date, and two
//! "Sleep" entries bounding the waking hours. Its free minutes and block
//! capacity drive how much work the plan puts on the date.

use chrono::NaiveDate;
use std::collections::{btree_map, BTreeMap};
use tracing::{debug, warn};

use crate::config::Config;
use crate::entries::Entries;
use crate::entry::{Entry, EntryDecl, SLEEP_NAME};
use crate::error::{PlanError, Result};
use crate::routine::Routine;
use crate::time::Time;

/// Per-date deviations from the configured day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayOverride {
    pub start: Option<Time>,
    pub end: Option<Time>,
    pub entries: Vec<Entry>,
}

/// Free time of a day, as seen by the planner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capacity {
    /// Minutes not taken by any entry.
    pub empty_minutes: u32,
    /// Free minutes per block name.
    pub blocks: BTreeMap<String, u32>,
}

/// One date's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Day {
    pub date: NaiveDate,
    pub start: Time,
    pub end: Time,
    pub entries: Entries,
    /// Declared entries that did not fit the day.
    pub overflow: Vec<Entry>,
}

impl Day {
    /// Build the frame of `date`.
    ///
    /// # Errors
    /// [`PlanError::ImpossibleSchedule`] when a synthesized sleep entry would
    /// overlap a declared one; validation errors from routine entries.
    pub fn build(
        date: NaiveDate,
        day_override: Option<&DayOverride>,
        routines: &[Routine],
        config: &Config,
    ) -> Result<Self> {
        let start = day_override.and_then(|o| o.start).unwrap_or(config.day.start);
        let end = day_override.and_then(|o| o.end).unwrap_or(config.day.end);

        let mut entries: Vec<Entry> = day_override.map(|o| o.entries.clone()).unwrap_or_default();
        entries.sort_by_key(|e| e.start.map_or(u32::MAX, Time::minutes));

        let first_is_sleep = entries.first().is_some_and(Entry::is_sleep);
        let last_is_sleep = entries
            .iter()
            .rev()
            .find(|e| e.start.is_some())
            .is_some_and(Entry::is_sleep);

        let mut sleep = Vec::new();
        if !first_is_sleep && start > Time::MIDNIGHT {
            sleep.push(sleep_entry(Time::MIDNIGHT, start, config.day.sleep_delta_morning, config)?);
        }
        if !last_is_sleep && end < Time::END_OF_DAY {
            sleep.push(sleep_entry(end, Time::END_OF_DAY, config.day.sleep_delta_evening, config)?);
        }
        for s in &sleep {
            if let Some(clash) = entries
                .iter()
                .find(|e| !e.is_placeholder() && s.span().is_some_and(|(a, b)| e.overlaps(a, b)))
            {
                return Err(PlanError::impossible(format!(
                    "sleep {}-{} on {date} overlaps \"{}\"",
                    s.start.unwrap_or(Time::MIDNIGHT),
                    s.end.unwrap_or(Time::END_OF_DAY),
                    clash.name
                ))
                .into());
            }
        }
        entries.extend(sleep);

        for routine in routines.iter().filter(|r| r.is_valid_on(date)) {
            debug!(%date, routine = routine.name(), "adding routine");
            entries.push(routine.to_entry(config)?);
        }

        let fitted = Entries::fit(entries, config);
        for entry in &fitted.overflow {
            warn!(%date, name = %entry.name, "declared entry does not fit the day");
        }
        Ok(Self {
            date,
            start,
            end,
            entries: fitted.entries,
            overflow: fitted.overflow,
        })
    }

    pub fn capacity(&self) -> Capacity {
        Capacity {
            empty_minutes: self.entries.empty_minutes(),
            blocks: self.entries.available_blocks(),
        }
    }
}

/// Immovable sleep over `start..end` that may flex by `delta` minutes.
fn sleep_entry(start: Time, end: Time, delta: u32, config: &Config) -> Result<Entry> {
    let minutes = start.minutes_until(end);
    let entry = EntryDecl::new(SLEEP_NAME)
        .with_start(start)
        .with_end(end)
        .with_movable(false)
        .with_mintime(minutes.saturating_sub(delta))
        .with_maxtime(minutes + delta)
        .build(config)?;
    Ok(entry)
}

/// Every date's frame, built on first use.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    pub overrides: BTreeMap<NaiveDate, DayOverride>,
    pub routines: Vec<Routine>,
    days: BTreeMap<NaiveDate, Day>,
}

impl Calendar {
    pub fn new(overrides: BTreeMap<NaiveDate, DayOverride>, routines: Vec<Routine>) -> Self {
        Self {
            overrides,
            routines,
            days: BTreeMap::new(),
        }
    }

    /// The frame of `date`; dates without an override get the configured
    /// day plus the routines valid on them.
    pub fn day(&mut self, date: NaiveDate, config: &Config) -> Result<&Day> {
        match self.days.entry(date) {
            btree_map::Entry::Occupied(slot) => Ok(slot.into_mut()),
            btree_map::Entry::Vacant(slot) => {
                let day = Day::build(date, self.overrides.get(&date), &self.routines, config)?;
                Ok(slot.insert(day))
            }
        }
    }

    pub fn capacity(&mut self, date: NaiveDate, config: &Config) -> Result<Capacity> {
        Ok(self.day(date, config)?.capacity())
    }
}
