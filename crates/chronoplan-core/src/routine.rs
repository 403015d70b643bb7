//! Recurring entries.
//!
//! A [`Routine`] is an entry template with ordered items (which become its
//! subentries) and a [`Validity`] rule deciding on which dates it applies.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::entry::{Entry, EntryDecl};
use crate::error::ValidationError;

/// Dates on which a routine applies.
#[derive(Clone, Default)]
pub enum Validity {
    #[default]
    Always,
    Dates(BTreeSet<NaiveDate>),
    Weekdays(HashSet<Weekday>),
    Predicate(Arc<dyn Fn(NaiveDate) -> bool + Send + Sync>),
}

impl Validity {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        match self {
            Validity::Always => true,
            Validity::Dates(dates) => dates.contains(&date),
            Validity::Weekdays(days) => days.contains(&date.weekday()),
            Validity::Predicate(f) => f(date),
        }
    }
}

impl fmt::Debug for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Always => f.write_str("Always"),
            Validity::Dates(dates) => f.debug_tuple("Dates").field(dates).finish(),
            Validity::Weekdays(days) => f.debug_tuple("Weekdays").field(days).finish(),
            Validity::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A recurring entry with ordered items.
#[derive(Debug, Clone)]
pub struct Routine {
    /// Attributes of the routine entry itself; `subentries` are ignored.
    pub entry: EntryDecl,
    pub items: Vec<EntryDecl>,
    pub validity: Validity,
}

impl Routine {
    pub fn new(entry: EntryDecl) -> Self {
        Self {
            entry,
            items: Vec::new(),
            validity: Validity::Always,
        }
    }

    pub fn with_item(mut self, item: EntryDecl) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.validity.is_valid_on(date)
    }

    /// The routine as a timeline entry, its items nested in declared order.
    ///
    /// Without an explicit duration the routine lasts as long as its items.
    pub fn to_entry(&self, config: &Config) -> Result<Entry, ValidationError> {
        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut item = item.clone();
                item.order.get_or_insert(i as f64);
                Entry::from_decl(item, config)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut decl = self.entry.clone();
        decl.subentries.clear();
        let has_duration = decl.normaltime.is_some()
            || decl.idealtime.is_some()
            || decl.mintime.is_some()
            || decl.maxtime.is_some()
            || (decl.start.is_some() && decl.end.is_some());
        if !has_duration && !items.is_empty() {
            decl.normaltime = Some(items.iter().map(|i| i.normaltime).sum());
        }

        let mut entry = Entry::from_decl(decl, config)?;
        entry.subentries.extend(items);
        for dropped in entry.fit_subentries() {
            debug!(routine = %entry.name, item = %dropped.name, "routine item does not fit");
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Time;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn validity_rules() {
        let monday = d(2024, 3, 4);
        let tuesday = d(2024, 3, 5);
        assert!(Validity::Always.is_valid_on(monday));

        let weekdays = Validity::Weekdays(HashSet::from([Weekday::Mon]));
        assert!(weekdays.is_valid_on(monday));
        assert!(!weekdays.is_valid_on(tuesday));

        let dates = Validity::Dates(BTreeSet::from([tuesday]));
        assert!(dates.is_valid_on(tuesday));
        assert!(!dates.is_valid_on(monday));

        let even = Validity::Predicate(Arc::new(|date: NaiveDate| date.day() % 2 == 0));
        assert!(even.is_valid_on(monday));
        assert!(!even.is_valid_on(tuesday));
        assert_eq!(format!("{even:?}"), "Predicate(..)");
    }

    #[test]
    fn items_become_ordered_subentries() {
        let config = Config::default();
        let routine = Routine::new(EntryDecl::new("Morning").with_start(Time::new(7, 0).unwrap()))
            .with_item(EntryDecl::new("Stretch").with_normaltime(10).with_priority(1.0))
            .with_item(EntryDecl::new("Coffee").with_normaltime(15).with_priority(50.0));
        let entry = routine.to_entry(&config).unwrap();

        assert_eq!(entry.normaltime, 25);
        assert_eq!(entry.end, Some(Time::new(7, 25).unwrap()));
        let subs: Vec<_> = entry
            .subentries
            .iter()
            .map(|s| (s.name.as_str(), s.start.unwrap().to_string()))
            .collect();
        assert_eq!(subs, vec![("Stretch", "07:00".to_string()), ("Coffee", "07:10".to_string())]);
    }

    #[test]
    fn explicit_duration_wins_over_items() {
        let config = Config::default();
        let routine = Routine::new(EntryDecl::new("Evening").with_normaltime(20))
            .with_item(EntryDecl::new("Read").with_normaltime(30).with_priority(1.0))
            .with_item(EntryDecl::new("Journal").with_normaltime(15).with_priority(5.0));
        let entry = routine.to_entry(&config).unwrap();
        assert_eq!(entry.normaltime, 20);
        // Unplaced entries measure their normal duration; "Read" no longer fits.
        let names: Vec<_> = entry.subentries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Journal"]);
    }
}
