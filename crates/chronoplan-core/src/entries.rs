//! A day's timeline as an ordered, gap-free sequence of entries.
//!
//! A well-formed [`Entries`] is *partitioned*: sorted by start, every entry
//! ends where the next begins, and together they cover 00:00-24:00 exactly.
//! Free time is represented by "Empty" placeholders so the invariant holds at
//! all times.
//!
//! Fitting a set of entries onto the timeline is done by [`Entries::zip`]:
//! immovable ("fixed") entries keep their spans, movable ("flex") ones are
//! interleaved into the gaps at their minimum duration, and each run of flex
//! entries is then stretched into the room left before the next fixed entry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

use crate::config::{CompressionConfig, Config};
use crate::entry::{placement_order, Entry};
use crate::time::{Time, MINUTES_PER_DAY};

/// Result of fitting entries onto a day.
#[derive(Debug, Clone)]
pub struct Fitted {
    pub entries: Entries,
    /// Entries that found no room.
    pub overflow: Vec<Entry>,
}

/// Outcome of [`Entries::add`].
#[derive(Debug, Clone)]
pub enum Addition {
    /// The entry is on the timeline; `displaced` lost their place to it.
    Placed { displaced: Vec<Entry> },
    /// The timeline was left untouched.
    Rejected(Entry),
}

/// Ordered timeline of a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entries(Vec<Entry>);

impl Default for Entries {
    fn default() -> Self {
        Self::new()
    }
}

impl Entries {
    /// A free day: one placeholder from 00:00 to 24:00.
    pub fn new() -> Self {
        Self(vec![Entry::empty(Time::MIDNIGHT, Time::END_OF_DAY)])
    }

    /// Wrap entries as they are, without checking the partition.
    pub fn from_vec(entries: Vec<Entry>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.0
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Entry] {
        &mut self.0
    }

    /// Whether the entries exactly and contiguously cover the day.
    pub fn is_partitioned(&self) -> bool {
        let mut cursor = Time::MIDNIGHT;
        for entry in &self.0 {
            match entry.span() {
                Some((start, end)) if start == cursor && end >= start => cursor = end,
                _ => return false,
            }
        }
        cursor == Time::END_OF_DAY
    }

    /// Entries that are not structural placeholders.
    pub fn significant(&self) -> impl Iterator<Item = &Entry> {
        self.0.iter().filter(|e| !e.is_placeholder())
    }

    /// Significant entries intersecting `start..end`.
    pub fn overlapping(&self, start: Time, end: Time) -> Vec<&Entry> {
        self.significant()
            .filter(|e| e.overlaps(start, end))
            .collect()
    }

    /// Minutes covered by "Empty" placeholders.
    pub fn empty_minutes(&self) -> u32 {
        self.0
            .iter()
            .filter(|e| e.is_empty_gap())
            .map(Entry::duration)
            .sum()
    }

    /// Sum of the minimum durations of all significant entries.
    pub fn total_mintime(&self) -> u32 {
        self.significant().map(|e| e.mintime).sum()
    }

    /// Free minutes per block name across all block hosts.
    pub fn available_blocks(&self) -> BTreeMap<String, u32> {
        let mut blocks = BTreeMap::new();
        for entry in self.significant() {
            for block in &entry.blocks {
                *blocks.entry(block.clone()).or_insert(0) += entry.available();
            }
        }
        blocks
    }

    /// Whether `entry` may join the timeline.
    ///
    /// An entry with a start must not overlap any immovable or pinned entry:
    /// movable entries are checked over their minimum span only, since they
    /// can be compressed. In every case the combined minimum durations must
    /// fit in a day.
    pub fn can_be_added(&self, entry: &Entry) -> bool {
        if self.total_mintime() + entry.mintime > MINUTES_PER_DAY {
            return false;
        }
        let Some(start) = entry.start else {
            return true;
        };
        let span_end = if entry.ismovable {
            start.plus_minutes(entry.mintime)
        } else {
            entry.end.unwrap_or_else(|| start.plus_minutes(entry.normaltime))
        };
        self.overlapping(start, span_end)
            .iter()
            .all(|other| other.ismovable && !other.pinned)
    }

    /// Add a single entry and re-fit the day around it.
    ///
    /// An entry with a start is pinned there (a movable one may be clipped to
    /// the next immovable entry); one without is placed like any other
    /// movable entry. Existing movable entries are re-flowed, and those that
    /// no longer fit are returned as displaced.
    pub fn add(&mut self, mut entry: Entry, config: &Config) -> Addition {
        if !self.can_be_added(&entry) {
            debug!(name = %entry.name, "entry rejected from timeline");
            return Addition::Rejected(entry);
        }

        let (mut flex, mut fixed) = split_flex_fixed(self.significant().cloned());
        if entry.start.is_some() {
            entry.pinned = true;
            fixed.push(entry);
        } else {
            flex.push(entry);
        }
        let fitted = Self::zip(flex, fixed, config);
        *self = fitted.entries;
        Addition::Placed {
            displaced: fitted.overflow,
        }
    }

    /// Fit arbitrary entries onto an otherwise free day.
    pub fn fit(entries: impl IntoIterator<Item = Entry>, config: &Config) -> Fitted {
        let (flex, fixed) =
            split_flex_fixed(entries.into_iter().filter(|e| !e.is_placeholder()));
        Self::zip(flex, fixed, config)
    }

    /// Interleave movable and immovable entries into a partitioned day.
    ///
    /// `fixed` entries keep their spans; a fixed entry that starts before the
    /// previous one ends is trimmed, and dropped into the overflow if nothing
    /// of it remains. `flex` entries are taken in `(order, -priority)` order
    /// and placed whenever their `mintime` fits before the next fixed entry.
    pub fn zip(mut flex: Vec<Entry>, mut fixed: Vec<Entry>, config: &Config) -> Fitted {
        fixed.sort_by_key(start_key);
        flex.sort_by_key(start_key);
        flex.sort_by(placement_order);

        let mut flex: VecDeque<Entry> = flex.into();
        let mut fixed: VecDeque<Entry> = fixed.into();
        let mut placed: Vec<Entry> = Vec::new();
        let mut overflow = Vec::new();
        let mut run: Vec<Entry> = Vec::new();
        let mut run_start = Time::MIDNIGHT;
        let mut cursor = Time::MIDNIGHT;

        loop {
            let take_flex = match (flex.front(), fixed.front()) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(head), Some(next)) => {
                    let gap = cursor.minutes_until(next.start.unwrap_or(cursor));
                    head.mintime <= gap
                }
            };

            if take_flex {
                let Some(entry) = flex.pop_front() else { break };
                if fixed.is_empty() && cursor.minutes_until(Time::END_OF_DAY) < entry.mintime {
                    debug!(name = %entry.name, "no room left in the day");
                    overflow.push(unplaced(entry));
                    continue;
                }
                cursor = cursor.plus_minutes(entry.mintime);
                run.push(entry);
                continue;
            }

            let Some(mut entry) = fixed.pop_front() else { break };
            let Some((start, end)) = entry.span() else {
                flex.push_back(entry);
                continue;
            };
            if end <= cursor && !(start == end && start == cursor) {
                warn!(name = %entry.name, %start, %end, "fixed entry is covered by an earlier one");
                overflow.push(unplaced(entry));
                continue;
            }
            if start < cursor {
                entry.start = Some(cursor);
            }
            let start = entry.start.unwrap_or(cursor);
            if entry.ismovable {
                if let Some(next_start) = fixed.front().and_then(|next| next.start) {
                    if next_start < end {
                        entry.end = Some(next_start.max(start));
                    }
                }
                if entry.duration() == 0 && entry.normaltime > 0 {
                    debug!(name = %entry.name, "pinned entry squeezed out");
                    overflow.push(unplaced(entry));
                    continue;
                }
            }
            close_run(&mut placed, &mut overflow, std::mem::take(&mut run), run_start, start, &config.compression);
            overflow.extend(entry.fit_subentries());
            cursor = entry.end.unwrap_or(start);
            run_start = cursor;
            placed.push(entry);
        }

        close_run(&mut placed, &mut overflow, run, run_start, Time::END_OF_DAY, &config.compression);
        Fitted {
            entries: Entries(placed),
            overflow,
        }
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Immovable and pinned entries with a start are fixed; everything else is
/// flex.
fn split_flex_fixed(entries: impl Iterator<Item = Entry>) -> (Vec<Entry>, Vec<Entry>) {
    entries.partition(|e| (e.ismovable && !e.pinned) || e.start.is_none())
}

fn start_key(entry: &Entry) -> u32 {
    entry.start.map_or(u32::MAX, Time::minutes)
}

fn unplaced(mut entry: Entry) -> Entry {
    entry.start = None;
    entry.end = None;
    entry.pinned = false;
    entry
}

/// Lay out a run of flex entries over `start..limit`, stretching them into
/// the free minutes and backfilling what is left with a placeholder.
fn close_run(
    placed: &mut Vec<Entry>,
    overflow: &mut Vec<Entry>,
    run: Vec<Entry>,
    start: Time,
    limit: Time,
    compression: &CompressionConfig,
) {
    let available = start.minutes_until(limit);
    let mut durations: Vec<u32> = run.iter().map(|e| e.mintime).collect();
    let mut slack = available.saturating_sub(durations.iter().sum());
    slack = stretch(&run, &mut durations, slack, |e| e.normaltime, compression);
    slack = stretch(&run, &mut durations, slack, |e| e.idealtime, compression);

    let gap_at = run.iter().position(|e| e.alignend).unwrap_or(run.len());
    let mut cursor = start;
    for (i, (mut entry, minutes)) in run.into_iter().zip(durations).enumerate() {
        if i == gap_at && slack > 0 {
            placed.push(Entry::empty(cursor, cursor.plus_minutes(slack)));
            cursor = cursor.plus_minutes(slack);
        }
        entry.place(cursor, minutes);
        overflow.extend(entry.fit_subentries());
        cursor = cursor.plus_minutes(minutes);
        placed.push(entry);
    }
    if cursor < limit {
        placed.push(Entry::empty(cursor, limit));
    }
}

/// Share `slack` minutes among the entries, raising each towards `target`
/// in proportion to its compression weight. Returns the minutes left over.
fn stretch(
    run: &[Entry],
    durations: &mut [u32],
    mut slack: u32,
    target: impl Fn(&Entry) -> u32,
    compression: &CompressionConfig,
) -> u32 {
    loop {
        let active: Vec<usize> = (0..run.len())
            .filter(|&i| durations[i] < target(&run[i]).min(run[i].maxtime))
            .collect();
        if slack == 0 || active.is_empty() {
            return slack;
        }

        let weights: Vec<f64> = active
            .iter()
            .map(|&i| compression.weight(run[i].priority))
            .collect();
        let total: f64 = weights.iter().sum();
        let share_of = |k: usize| {
            if total > 0.0 {
                weights[k] / total
            } else {
                1.0 / active.len() as f64
            }
        };

        let mut given = 0;
        for (k, &i) in active.iter().enumerate() {
            let room = target(&run[i]).min(run[i].maxtime) - durations[i];
            let share = ((slack as f64) * share_of(k)).floor() as u32;
            let grant = share.min(room);
            durations[i] += grant;
            given += grant;
        }

        if given == 0 {
            // Shares rounded down to nothing; hand out single minutes,
            // heaviest entries first.
            let mut by_weight: Vec<usize> = (0..active.len()).collect();
            by_weight.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));
            for k in by_weight {
                if given == slack {
                    break;
                }
                durations[active[k]] += 1;
                given += 1;
            }
        }
        slack -= given;
    }
}
