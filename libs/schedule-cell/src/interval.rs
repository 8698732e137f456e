//! Half-open wall-clock intervals and sorted interval sets.
//!
//! Working hours, breaks, appointments and unavailability blocks are all
//! `[start, end)` spans on the provider's local clock. Free time for a day is
//! computed as `working hours - breaks - appointments - blocks` with
//! [`IntervalSet::subtract`].

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Interval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Interval {
    /// `None` when the span is empty or reversed.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies entirely inside `self`.
    pub fn covers(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Parts of `self` left after removing `other` (zero, one or two pieces).
    fn minus(&self, other: &Interval) -> impl Iterator<Item = Interval> {
        let (left, right) = if self.overlaps(other) {
            (
                Interval::new(self.start, other.start.min(self.end)),
                Interval::new(other.end.max(self.start), self.end),
            )
        } else {
            (Some(*self), None)
        };
        left.into_iter().chain(right)
    }
}

/// Sorted, pairwise disjoint, non-adjacent intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(interval: Interval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }

    /// Adds `interval`, merging it with every member it overlaps or touches.
    pub fn insert(&mut self, interval: Interval) {
        let mut merged = interval;
        let mut kept = Vec::with_capacity(self.intervals.len() + 1);

        for existing in self.intervals.drain(..) {
            if existing.end < merged.start || merged.end < existing.start {
                kept.push(existing);
            } else {
                merged = Interval {
                    start: existing.start.min(merged.start),
                    end: existing.end.max(merged.end),
                };
            }
        }

        let position = kept.partition_point(|candidate| candidate.start < merged.start);
        kept.insert(position, merged);
        self.intervals = kept;
    }

    pub fn union(mut self, other: &IntervalSet) -> Self {
        for interval in other.iter() {
            self.insert(*interval);
        }
        self
    }

    /// Removes `interval` from every member, splitting members it cuts through.
    pub fn subtract(&mut self, interval: &Interval) {
        self.intervals = self
            .intervals
            .iter()
            .flat_map(|member| member.minus(interval))
            .collect();
    }

    pub fn subtract_all<'a>(&mut self, intervals: impl IntoIterator<Item = &'a Interval>) {
        for interval in intervals {
            self.subtract(interval);
        }
    }

    /// True when `[start, end)` fits inside a single member.
    pub fn fits(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        match Interval::new(start, end) {
            Some(candidate) => self.intervals.iter().any(|member| member.covers(&candidate)),
            None => false,
        }
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.intervals
            .iter()
            .any(|member| member.start <= instant && instant < member.end)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn total_duration(&self) -> Duration {
        self.intervals
            .iter()
            .fold(Duration::zero(), |total, member| total + member.duration())
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        let mut set = IntervalSet::new();
        for interval in iter {
            set.insert(interval);
        }
        set
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
