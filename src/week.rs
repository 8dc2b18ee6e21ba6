//! Calendar-week bucketing.
//!
//! Every component that needs week alignment goes through [`WeekWindow`],
//! so no two components can disagree about which week a timestamp belongs to.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Monday-anchored, inclusive 7-day date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// The week containing `date`: start is the Monday on or before it,
    /// end is start + 6 days. Total over all valid dates.
    pub fn containing(date: NaiveDate) -> Self {
        let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    /// The window immediately before this one.
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - Duration::days(7),
            end: self.end - Duration::days(7),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Inclusive lower bound of the window as a UTC timestamp (start day, 00:00:00).
    pub fn start_datetime(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Inclusive upper bound of the window as a UTC timestamp (end day, 23:59:59).
    pub fn end_datetime(&self) -> DateTime<Utc> {
        let next_midnight = self.end.and_time(NaiveTime::MIN) + Duration::days(1);
        Utc.from_utc_datetime(&(next_midnight - Duration::seconds(1)))
    }
}
