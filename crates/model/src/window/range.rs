use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Half-open time interval `[start, end)` requested from a source.
///
/// `start == None` means the request carries no lower bound (full backfill).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn bounded(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        SyncWindow {
            start: Some(start),
            end,
        }
    }

    pub fn unbounded(end: DateTime<Utc>) -> Self {
        SyncWindow { start: None, end }
    }

    /// Calendar days `d` with `start <= d < end`, for APIs queried one day
    /// at a time. A backfill window starts at `floor`.
    pub fn days(&self, floor: NaiveDate) -> Vec<NaiveDate> {
        let first = self.start.map(|s| s.date_naive()).unwrap_or(floor);
        let last = self.end.date_naive();
        let mut days = Vec::new();
        let mut day = first;
        while day < last {
            days.push(day);
            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => break,
            }
        }
        days
    }

    /// First and last calendar day covered, for naming outputs.
    pub fn day_span(&self, floor: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let days = self.days(floor);
        Some((*days.first()?, *days.last()?))
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{}, {})", start.to_rfc3339(), self.end.to_rfc3339()),
            None => write!(f, "[-inf, {})", self.end.to_rfc3339()),
        }
    }
}
