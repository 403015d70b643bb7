//! Timeline entries.
//!
//! An [`Entry`] is one named span on a day's 00:00-24:00 timeline. Entries
//! carry four duration bounds (`mintime <= normaltime <= maxtime`, with
//! `idealtime` in between) so that movable ones can be compressed or
//! stretched when the day is fitted. An entry that offers `blocks` can host
//! other entries whose `categories` match, as nested subentries.
//!
//! Entries are declared through [`EntryDecl`], where every attribute is
//! optional and missing durations are derived from the ones present using
//! the factors in [`TimeFactors`](crate::config::TimeFactors).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::config::Config;
use crate::error::ValidationError;
use crate::time::Time;

/// Name given to synthesized gap placeholders.
pub const EMPTY_NAME: &str = "Empty";

/// Name of the entries bounding a day.
pub const SLEEP_NAME: &str = "Sleep";

/// Priority carried by structural placeholders.
pub const PLACEHOLDER_PRIORITY: f64 = -1.0;

/// Declared form of an entry; every attribute is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryDecl {
    pub name: String,
    #[serde(default)]
    pub start: Option<Time>,
    #[serde(default)]
    pub end: Option<Time>,
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub ismovable: Option<bool>,
    #[serde(default)]
    pub normaltime: Option<u32>,
    #[serde(default)]
    pub idealtime: Option<u32>,
    #[serde(default)]
    pub mintime: Option<u32>,
    #[serde(default)]
    pub maxtime: Option<u32>,
    #[serde(default)]
    pub blocks: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub order: Option<f64>,
    #[serde(default)]
    pub alignend: bool,
    #[serde(default)]
    pub subentries: Vec<EntryDecl>,
}

impl EntryDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_start(mut self, start: Time) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: Time) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_movable(mut self, movable: bool) -> Self {
        self.ismovable = Some(movable);
        self
    }

    pub fn with_normaltime(mut self, minutes: u32) -> Self {
        self.normaltime = Some(minutes);
        self
    }

    pub fn with_idealtime(mut self, minutes: u32) -> Self {
        self.idealtime = Some(minutes);
        self
    }

    pub fn with_mintime(mut self, minutes: u32) -> Self {
        self.mintime = Some(minutes);
        self
    }

    pub fn with_maxtime(mut self, minutes: u32) -> Self {
        self.maxtime = Some(minutes);
        self
    }

    pub fn with_block(mut self, block: impl Into<String>) -> Self {
        self.blocks.insert(block.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_alignend(mut self, alignend: bool) -> Self {
        self.alignend = alignend;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Resolve into an [`Entry`] using the configured defaults.
    pub fn build(self, config: &Config) -> Result<Entry, ValidationError> {
        Entry::from_decl(self, config)
    }
}

/// A named span on a day's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub start: Option<Time>,
    pub end: Option<Time>,
    pub priority: f64,
    pub ismovable: bool,
    pub normaltime: u32,
    pub idealtime: u32,
    pub mintime: u32,
    pub maxtime: u32,
    #[serde(default)]
    pub blocks: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub order: f64,
    #[serde(default)]
    pub alignend: bool,
    #[serde(default)]
    pub subentries: Vec<Entry>,
    /// Held at its start when the day is re-fitted, even if movable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
}

fn scale(minutes: u32, factor: f64) -> u32 {
    let factor = if factor > 0.0 { factor } else { 1.0 };
    (minutes as f64 * factor).round().max(0.0) as u32
}

impl Entry {
    /// Resolve a declaration.
    ///
    /// The normal duration comes from, in order: an explicit `normaltime`,
    /// the span between `start` and `end`, `idealtime`, `mintime`, `maxtime`
    /// (each scaled back by its factor), and finally the default duration.
    ///
    /// # Errors
    /// Returns an error if `end` precedes `start`.
    pub fn from_decl(decl: EntryDecl, config: &Config) -> Result<Self, ValidationError> {
        let factors = &config.times;
        let span = match (decl.start, decl.end) {
            (Some(start), Some(end)) if end < start => {
                return Err(ValidationError::InvalidTimeRange { start, end });
            }
            (Some(start), Some(end)) => Some(start.minutes_until(end)),
            _ => None,
        };

        let normaltime = decl
            .normaltime
            .or(span)
            .or(decl.idealtime.map(|t| scale(t, 1.0 / factors.ideal_factor)))
            .or(decl.mintime.map(|t| scale(t, 1.0 / factors.min_factor)))
            .or(decl.maxtime.map(|t| scale(t, 1.0 / factors.max_factor)))
            .unwrap_or(config.defaults.duration);

        let ismovable = decl.ismovable.unwrap_or(true);
        let bounds = Bounds::derive(&decl, normaltime, ismovable, config);

        let (start, end) = match (decl.start, decl.end) {
            (Some(start), None) => (Some(start), Some(start.plus_minutes(normaltime))),
            (None, Some(end)) => (Some(end.minus_minutes(normaltime)), Some(end)),
            other => other,
        };

        let subentries = decl
            .subentries
            .into_iter()
            .map(|sub| Entry::from_decl(sub, config))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entry = Self {
            name: decl.name,
            start,
            end,
            priority: decl.priority.unwrap_or(config.defaults.priority),
            ismovable,
            normaltime,
            idealtime: bounds.ideal,
            mintime: bounds.min,
            maxtime: bounds.max,
            blocks: decl.blocks,
            categories: decl.categories,
            notes: decl.notes,
            order: decl.order.unwrap_or(config.defaults.order),
            alignend: decl.alignend,
            subentries,
            pinned: false,
        };
        entry.layout_subentries();
        Ok(entry)
    }

    /// An unplaced movable entry sized from its normal duration.
    pub fn floating(
        name: impl Into<String>,
        normaltime: u32,
        priority: f64,
        config: &Config,
    ) -> Self {
        let bounds = Bounds::derive(&EntryDecl::default(), normaltime, true, config);
        Self {
            name: name.into(),
            start: None,
            end: None,
            priority,
            ismovable: true,
            normaltime,
            idealtime: bounds.ideal,
            mintime: bounds.min,
            maxtime: bounds.max,
            blocks: BTreeSet::new(),
            categories: BTreeSet::new(),
            notes: String::new(),
            order: config.defaults.order,
            alignend: false,
            subentries: Vec::new(),
            pinned: false,
        }
    }

    /// A gap placeholder covering `start..end`.
    pub fn empty(start: Time, end: Time) -> Self {
        let minutes = start.minutes_until(end);
        Self {
            name: EMPTY_NAME.to_string(),
            start: Some(start),
            end: Some(end.max(start)),
            priority: PLACEHOLDER_PRIORITY,
            ismovable: true,
            normaltime: minutes,
            idealtime: minutes,
            mintime: 0,
            maxtime: minutes,
            blocks: BTreeSet::new(),
            categories: BTreeSet::new(),
            notes: String::new(),
            order: 0.0,
            alignend: false,
            subentries: Vec::new(),
            pinned: false,
        }
    }

    /// Structural placeholders never count towards load or overlaps.
    pub fn is_placeholder(&self) -> bool {
        self.priority < 0.0
    }

    pub fn is_empty_gap(&self) -> bool {
        self.is_placeholder() && self.name == EMPTY_NAME
    }

    pub fn is_sleep(&self) -> bool {
        self.name == SLEEP_NAME
    }

    pub fn span(&self) -> Option<(Time, Time)> {
        Some((self.start?, self.end?))
    }

    /// Placed length, or the normal duration while unplaced.
    pub fn duration(&self) -> u32 {
        match self.span() {
            Some((start, end)) => start.minutes_until(end),
            None => self.normaltime,
        }
    }

    /// Whether the placed span intersects `start..end`.
    pub fn overlaps(&self, start: Time, end: Time) -> bool {
        match self.span() {
            Some((s, e)) => s < end && start < e,
            None => false,
        }
    }

    /// Put the entry at `start` for `minutes`, re-flowing any subentries.
    pub fn place(&mut self, start: Time, minutes: u32) {
        self.start = Some(start);
        self.end = Some(start.plus_minutes(minutes));
        self.layout_subentries();
    }

    /// Shrink to `minutes`, keeping the end when `alignend` is set and the
    /// start otherwise.
    pub fn compress_to(&mut self, minutes: u32) {
        if let Some((start, end)) = self.span() {
            if self.alignend {
                self.start = Some(end.minus_minutes(minutes).max(start));
            } else {
                self.end = Some(start.plus_minutes(minutes).min(end));
            }
            self.layout_subentries();
        }
    }

    /// Minutes taken by subentries.
    pub fn subentry_minutes(&self) -> u32 {
        self.subentries.iter().map(|s| s.normaltime).sum()
    }

    /// Unreserved capacity of a block host; zero for entries without blocks.
    pub fn available(&self) -> u32 {
        if self.blocks.is_empty() {
            0
        } else {
            self.duration().saturating_sub(self.subentry_minutes())
        }
    }

    /// Whether `other` may be nested into this entry.
    pub fn hosts(&self, other: &Entry) -> bool {
        !self.blocks.is_disjoint(&other.categories)
    }

    /// Nest `sub` into this entry.
    ///
    /// When the subentries no longer fit, the lowest-priority ones are
    /// removed and returned as excess.
    pub fn add_subentry(&mut self, sub: Entry) -> Vec<Entry> {
        self.subentries.push(sub);
        self.fit_subentries()
    }

    /// Drop lowest-priority subentries until they fit the host's duration,
    /// then lay the rest out from the host's start.
    pub fn fit_subentries(&mut self) -> Vec<Entry> {
        let capacity = self.duration();
        let mut total = self.subentry_minutes();
        let mut excess = Vec::new();
        if total > capacity {
            self.subentries
                .sort_by(|a, b| b.priority.total_cmp(&a.priority));
            while total > capacity {
                let Some(mut popped) = self.subentries.pop() else {
                    break;
                };
                total -= popped.normaltime;
                popped.start = None;
                popped.end = None;
                excess.push(popped);
            }
        }
        self.layout_subentries();
        excess
    }

    fn layout_subentries(&mut self) {
        self.subentries.sort_by(placement_order);
        let mut cursor = self.start;
        for sub in &mut self.subentries {
            match cursor {
                Some(at) => {
                    sub.place(at, sub.normaltime);
                    cursor = sub.end;
                }
                None => {
                    sub.start = None;
                    sub.end = None;
                }
            }
        }
    }
}

/// Duration bounds around a normal duration.
struct Bounds {
    min: u32,
    ideal: u32,
    max: u32,
}

impl Bounds {
    /// Explicit bounds win; the rest are scaled from `normaltime`.
    /// Immovable entries cannot be compressed, so their minimum defaults to
    /// the normal duration.
    fn derive(decl: &EntryDecl, normaltime: u32, ismovable: bool, config: &Config) -> Self {
        let factors = &config.times;
        let min = decl
            .mintime
            .unwrap_or_else(|| {
                if ismovable {
                    scale(normaltime, factors.min_factor)
                } else {
                    normaltime
                }
            })
            .min(normaltime);
        let max = decl
            .maxtime
            .unwrap_or_else(|| scale(normaltime, factors.max_factor))
            .max(normaltime);
        let ideal = decl
            .idealtime
            .unwrap_or_else(|| scale(normaltime, factors.ideal_factor))
            .clamp(min, max);
        Self { min, ideal, max }
    }
}

/// `(order ascending, priority descending)`.
pub fn placement_order(a: &Entry, b: &Entry) -> Ordering {
    a.order
        .total_cmp(&b.order)
        .then_with(|| b.priority.total_cmp(&a.priority))
}
