use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` of absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Touching edges (`self.end == other.start`) do not overlap, so
    /// back-to-back bookings abut.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub fn any_overlap(target: &Interval, candidates: &[Interval]) -> bool {
    candidates.iter().any(|c| target.overlaps(c))
}

/// The same half-open predicate in the minute-of-day domain, used for
/// break-window checks.
pub fn minutes_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}
