use chrono::NaiveDateTime;

use crate::time::saturating_shift;

/// Half-open intervals `[a_start, a_end)` and `[b_start, b_end)` conflict.
/// Touching endpoints do not.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}

/// A wall-clock or UTC range, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// Widened by `minutes` on both sides, clamped to the representable range.
    pub fn padded(&self, minutes: i64) -> TimeRange {
        let pad = minutes.max(0);
        TimeRange::new(saturating_shift(self.start, -pad), saturating_shift(self.end, pad))
    }
}
