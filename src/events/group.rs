use super::Event;
use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Key of one calendar-month bucket, in local wall-clock terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> MonthKey {
        MonthKey { year, month }
    }

    /// The month a timestamp falls into on the local wall clock.
    pub fn of(timestamp: DateTime<Utc>) -> MonthKey {
        let local = timestamp.with_timezone(&Local);

        MonthKey {
            year: local.year(),
            month: local.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match NaiveDate::from_ymd_opt(self.year, self.month, 1) {
            Some(date) => date.format("%B %Y").fmt(f),
            None => write!(f, "{:04}-{:02}", self.year, self.month),
        }
    }
}

impl Serialize for MonthKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Type alias for events grouped by the calendar month of their start.
pub type EventsByMonth = IndexMap<MonthKey, Vec<Event>>;

/// Builds an index of event month to list of events. This is used to avoid
/// having complicated logic for displaying events by month in HTML
/// templates.
///
/// Events are sorted by ascending start first (stable, so ties keep their
/// input order) and buckets appear in the order of their first event,
/// which after sorting is ascending chronological order.
pub fn by_month(mut events: Vec<Event>) -> EventsByMonth {
    events.sort_by_key(|event| event.start);

    let mut groups = EventsByMonth::new();

    for event in events {
        groups
            .entry(MonthKey::of(event.start))
            .or_default()
            .push(event);
    }

    groups
}
