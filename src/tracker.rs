//! Ordered multiset of current per-subsystem temperatures.
//!
//! The tracker holds one occurrence per subsystem with a known reading;
//! equal values reported by different subsystems are distinct occurrences.
//! The greatest value is cached so `max()` is O(1), while insert and
//! remove stay O(log n) on a count-keyed ordered map.

use std::collections::BTreeMap;

use crate::temperature::Temperature;

/// Ordered multiset of temperatures with O(1) max retrieval.
///
/// The monitor mutates its tracker only from the poll thread, so the type
/// carries no locking of its own.
#[derive(Debug, Default)]
pub struct TempTracker {
    counts: BTreeMap<Temperature, u32>,
    len: usize,
    max: Option<Temperature>,
}

impl TempTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of `value`.
    pub fn insert(&mut self, value: Temperature) {
        *self.counts.entry(value).or_insert(0) += 1;
        self.len += 1;
        if self.max.map_or(true, |max| value > max) {
            self.max = Some(value);
        }
    }

    /// Removes exactly one occurrence equal to `value`.
    ///
    /// Returns `false` and leaves the tracker unchanged when no occurrence
    /// is present. Removing one of several equal occurrences keeps the
    /// rest in place.
    pub fn remove(&mut self, value: Temperature) -> bool {
        let Some(count) = self.counts.get_mut(&value) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(&value);
        }
        self.len -= 1;
        // The cache only moves when the last occurrence of the max leaves.
        if self.max == Some(value) && !self.counts.contains_key(&value) {
            self.max = self.counts.last_key_value().map(|(temp, _)| *temp);
        }
        true
    }

    /// The greatest tracked value, or `None` while the tracker is empty.
    #[must_use]
    pub fn max(&self) -> Option<Temperature> {
        self.max
    }

    /// Number of tracked occurrences (one per subsystem with a reading).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no subsystem has reported a valid temperature yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct temperature values currently tracked.
    #[must_use]
    pub fn distinct_values(&self) -> usize {
        self.counts.len()
    }
}
