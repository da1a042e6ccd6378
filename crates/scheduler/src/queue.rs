//! Ordered, fixed-length queue of work units with a processing cursor.
//!
//! The queue is replaced wholesale on regeneration; individual units are only
//! ever mutated in place by the scheduler, through the `*_current` methods
//! that act on the unit under the cursor.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

use crate::types::{UnitStatus, WorkUnit};

#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    units: Vec<WorkUnit>,
    cursor: usize,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue of `count` pending units with durations drawn uniformly
    /// from `range_ms` (inclusive, milliseconds).
    pub fn generate<R: Rng>(count: usize, range_ms: RangeInclusive<u64>, rng: &mut R) -> Self {
        let units = (0..count)
            .map(|id| WorkUnit::new(id, Duration::from_millis(rng.gen_range(range_ms.clone()))))
            .collect();
        Self { units, cursor: 0 }
    }

    /// Build a queue with explicit unit durations, in order.
    pub fn from_durations(durations: impl IntoIterator<Item = Duration>) -> Self {
        let units = durations
            .into_iter()
            .enumerate()
            .map(|(id, d)| WorkUnit::new(id, d))
            .collect();
        Self { units, cursor: 0 }
    }

    /// Drop every unit and rewind the cursor.
    pub fn clear(&mut self) {
        self.units.clear();
        self.cursor = 0;
    }

    pub fn unit_at(&self, index: usize) -> Option<&WorkUnit> {
        self.units.get(index)
    }

    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Index of the next unit to process.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once the cursor has passed the last unit.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.units.len()
    }

    /// The unit under the cursor, if any remain.
    pub fn current(&self) -> Option<&WorkUnit> {
        self.units.get(self.cursor)
    }

    /// Mark the unit under the cursor as processing and return its duration.
    pub(crate) fn begin_current(&mut self, at: Duration) -> Option<Duration> {
        let unit = self.units.get_mut(self.cursor)?;
        unit.status = UnitStatus::Processing;
        unit.started_at = Some(at);
        Some(unit.estimated_duration)
    }

    /// Mark the unit under the cursor as completed and advance past it.
    pub(crate) fn complete_current(&mut self, at: Duration) -> Option<usize> {
        let index = self.cursor;
        let unit = self.units.get_mut(index)?;
        unit.status = UnitStatus::Completed;
        unit.completed_at = Some(at);
        self.cursor += 1;
        Some(index)
    }

    pub(crate) fn mark_current_interrupted(&mut self) {
        if let Some(unit) = self.units.get_mut(self.cursor) {
            unit.status = UnitStatus::Interrupted;
        }
    }

    pub(crate) fn reset_current(&mut self) {
        if let Some(unit) = self.units.get_mut(self.cursor) {
            if unit.status == UnitStatus::Interrupted {
                unit.status = UnitStatus::Pending;
            }
        }
    }
}
