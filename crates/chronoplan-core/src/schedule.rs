//! Per-day schedules.
//!
//! A [`Schedule`] starts from a day's frame and receives the day's work:
//! ad-hoc entries pinned at their own start, then planned tasks and the
//! previous day's leftovers, which are nested into matching blocks where
//! possible and fitted into the free time otherwise.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::calendar::Day;
use crate::config::Config;
use crate::entries::{Addition, Entries};
use crate::entry::Entry;
use crate::error::Result;

/// One day's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub date: NaiveDate,
    pub entries: Entries,
    /// Entries that could not be placed on this date.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overflow: Vec<Entry>,
    /// Leading overflow entries that came with the day's frame.
    #[serde(default, skip_serializing_if = "is_zero")]
    frame_overflow: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Schedule {
    /// A free day: nothing but a placeholder.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Entries::new(),
            overflow: Vec::new(),
            frame_overflow: 0,
        }
    }

    pub fn from_day(day: &Day) -> Self {
        Self {
            date: day.date,
            entries: day.entries.clone(),
            overflow: day.overflow.clone(),
            frame_overflow: day.overflow.len(),
        }
    }

    /// Add a one-off entry at its declared time.
    ///
    /// Returns `false` when the entry was rejected; it then lands in the
    /// overflow. Entries displaced by it land there as well.
    pub fn add_adhoc(&mut self, entry: Entry, config: &Config) -> bool {
        match self.entries.add(entry, config) {
            Addition::Placed { displaced } => {
                self.overflow.extend(displaced);
                true
            }
            Addition::Rejected(entry) => {
                debug!(date = %self.date, name = %entry.name, "ad-hoc entry rejected");
                self.overflow.push(entry);
                false
            }
        }
    }

    /// Fit `incoming` into the day.
    ///
    /// Each entry is first offered to the block hosts matching its
    /// categories; what no block takes, and what a block pushes out, is
    /// fitted into the free time with the rest of the movable entries.
    pub fn add_entries(&mut self, incoming: Vec<Entry>, config: &Config) {
        let mut pool = Vec::new();
        let timeline = self.entries.as_mut_slice();
        for entry in incoming {
            match choose_host(timeline, &entry) {
                Some(i) => {
                    debug!(date = %self.date, name = %entry.name, host = %timeline[i].name, "nested into block");
                    pool.extend(timeline[i].add_subentry(entry));
                }
                None => pool.push(entry),
            }
        }

        let fitted = Entries::fit(self.entries.significant().cloned().chain(pool), config);
        if !fitted.overflow.is_empty() {
            debug!(date = %self.date, count = fitted.overflow.len(), "entries overflow the day");
        }
        self.entries = fitted.entries;
        self.overflow.extend(fitted.overflow);
    }

    /// Movable entries that overflowed while filling the day, unplaced so
    /// they can be tried again on a later date. Overflow of the day's own
    /// frame stays with the day.
    pub fn carryover(&self) -> Vec<Entry> {
        self.overflow
            .iter()
            .skip(self.frame_overflow)
            .filter(|e| e.ismovable)
            .map(|e| {
                let mut entry = e.clone();
                entry.start = None;
                entry.end = None;
                entry.pinned = false;
                entry
            })
            .collect()
    }
}

/// Index of the block host for `entry`: the one with the least free
/// capacity that still fits it, otherwise the one with the most.
fn choose_host(timeline: &[Entry], entry: &Entry) -> Option<usize> {
    let hosts: Vec<(usize, u32)> = timeline
        .iter()
        .enumerate()
        .filter(|(_, host)| !host.is_placeholder() && host.hosts(entry))
        .map(|(i, host)| (i, host.available()))
        .collect();
    hosts
        .iter()
        .filter(|&&(_, free)| free >= entry.normaltime)
        .min_by_key(|&&(i, free)| (free, i))
        .or_else(|| hosts.iter().max_by_key(|&&(i, free)| (free, std::cmp::Reverse(i))))
        .map(|&(i, _)| i)
}

/// Schedules keyed by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Schedule>", from = "Vec<Schedule>")]
pub struct Schedules(BTreeMap<NaiveDate, Schedule>);

impl Schedules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schedule: Schedule) {
        self.0.insert(schedule.date, schedule);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Schedule> {
        self.0.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schedule> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), days = self.len(), "schedules saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl From<Vec<Schedule>> for Schedules {
    fn from(list: Vec<Schedule>) -> Self {
        Self(list.into_iter().map(|s| (s.date, s)).collect())
    }
}

impl From<Schedules> for Vec<Schedule> {
    fn from(schedules: Schedules) -> Self {
        schedules.0.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DayOverride;
    use crate::entry::EntryDecl;
    use crate::time::Time;

    fn t(h: u32, m: u32) -> Time {
        Time::new(h, m).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn host(name: &str, start: Time, minutes: u32, block: &str, config: &Config) -> Entry {
        EntryDecl::new(name)
            .with_start(start)
            .with_normaltime(minutes)
            .with_movable(false)
            .with_block(block)
            .build(config)
            .unwrap()
    }

    fn work(name: &str, minutes: u32, priority: f64, category: &str, config: &Config) -> Entry {
        EntryDecl::new(name)
            .with_normaltime(minutes)
            .with_priority(priority)
            .with_category(category)
            .build(config)
            .unwrap()
    }

    fn schedule_with(entries: Vec<Entry>, config: &Config) -> Schedule {
        let mut schedule = Schedule::new(date());
        schedule.entries = Entries::fit(entries, config).entries;
        schedule
    }

    #[test]
    fn entries_nest_into_the_tightest_fitting_block() {
        let config = Config::default();
        let mut schedule = schedule_with(
            vec![
                host("Morning focus", t(9, 0), 120, "focus", &config),
                host("Afternoon focus", t(14, 0), 60, "focus", &config),
            ],
            &config,
        );
        schedule.add_entries(vec![work("Draft", 45, 5.0, "focus", &config)], &config);

        assert!(schedule.entries.is_partitioned());
        let afternoon = schedule
            .entries
            .iter()
            .find(|e| e.name == "Afternoon focus")
            .unwrap();
        assert_eq!(afternoon.subentries.len(), 1);
        assert_eq!(afternoon.subentries[0].start, Some(t(14, 0)));
        assert_eq!(afternoon.available(), 15);
    }

    #[test]
    fn full_block_pushes_lowest_priority_into_free_time() {
        let config = Config::default();
        let mut schedule = schedule_with(vec![host("Focus", t(9, 0), 60, "focus", &config)], &config);
        schedule.add_entries(
            vec![
                work("Important", 40, 9.0, "focus", &config),
                work("Minor", 40, 1.0, "focus", &config),
            ],
            &config,
        );

        let focus = schedule.entries.iter().find(|e| e.name == "Focus").unwrap();
        assert_eq!(focus.subentries.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["Important"]);
        let minor = schedule.entries.iter().find(|e| e.name == "Minor").unwrap();
        assert!(minor.start.is_some());
        assert!(schedule.entries.is_partitioned());
        assert!(schedule.overflow.is_empty());
    }

    #[test]
    fn unmatched_entries_fill_free_time() {
        let config = Config::default();
        let mut schedule = schedule_with(vec![host("Focus", t(9, 0), 60, "focus", &config)], &config);
        schedule.add_entries(vec![work("Errands", 30, 5.0, "outside", &config)], &config);
        let errands = schedule.entries.iter().find(|e| e.name == "Errands").unwrap();
        assert_eq!(errands.start, Some(Time::MIDNIGHT));
    }

    #[test]
    fn rejected_adhoc_entry_overflows() {
        let config = Config::default();
        let mut schedule = schedule_with(
            vec![EntryDecl::new("Meeting")
                .with_start(t(10, 0))
                .with_end(t(11, 0))
                .with_movable(false)
                .build(&config)
                .unwrap()],
            &config,
        );
        let clash = EntryDecl::new("Dentist")
            .with_start(t(10, 30))
            .with_normaltime(30)
            .with_movable(false)
            .build(&config)
            .unwrap();
        assert!(!schedule.add_adhoc(clash, &config));
        assert_eq!(schedule.overflow.len(), 1);

        let fine = EntryDecl::new("Dentist")
            .with_start(t(12, 0))
            .with_normaltime(30)
            .with_movable(false)
            .build(&config)
            .unwrap();
        assert!(schedule.add_adhoc(fine, &config));
        assert!(schedule.entries.is_partitioned());
    }

    #[test]
    fn carryover_keeps_only_movable_entries() {
        let config = Config::default();
        let mut schedule = Schedule::new(date());
        schedule.overflow.push(work("Later", 30, 1.0, "x", &config));
        schedule.overflow.push(
            EntryDecl::new("Fixed")
                .with_normaltime(30)
                .with_movable(false)
                .build(&config)
                .unwrap(),
        );
        let names: Vec<_> = schedule.carryover().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Later"]);
    }

    #[test]
    fn schedules_persist_as_a_list() {
        let config = Config::default();
        let mut schedules = Schedules::new();
        let mut schedule = Schedule::new(date());
        schedule.add_entries(vec![work("Read", 60, 5.0, "x", &config)], &config);
        schedules.insert(schedule);

        let json = serde_json::to_value(&schedules).unwrap();
        assert_eq!(json[0]["date"], "2024-03-04");
        assert_eq!(json[0]["entries"][0]["name"], "Read");
        assert_eq!(json[0]["entries"][0]["start"], "00:00");
        assert!(json[0].get("overflow").is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        schedules.save(&path).unwrap();
        assert_eq!(Schedules::load(&path).unwrap(), schedules);
    }

    #[test]
    fn frame_overflow_stays_put_after_reload() {
        let config = Config::default();
        let chores = EntryDecl::new("Chores").with_normaltime(2400).build(&config).unwrap();
        let day_override = DayOverride {
            entries: vec![chores],
            ..DayOverride::default()
        };
        let day = Day::build(date(), Some(&day_override), &[], &config).unwrap();
        let mut schedule = Schedule::from_day(&day);
        schedule.add_entries(vec![work("Marathon", 2400, 1.0, "x", &config)], &config);
        let names = |s: &Schedule| -> Vec<String> { s.carryover().into_iter().map(|e| e.name).collect() };
        assert_eq!(schedule.overflow.len(), 2);
        assert_eq!(names(&schedule), vec!["Marathon"]);

        let mut schedules = Schedules::new();
        schedules.insert(schedule);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        schedules.save(&path).unwrap();
        let loaded = Schedules::load(&path).unwrap();
        assert_eq!(loaded, schedules);
        assert_eq!(names(loaded.get(date()).unwrap()), vec!["Marathon"]);
    }
}
