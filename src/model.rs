//! Domain types shared by the uptime engine and the report pipeline

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timezone applied to stores without a timezone record
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Chicago;

/// Store identifiers are opaque strings (UUIDs in the shipped dataset)
pub type StoreId = String;

/// Reported store status at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn is_active(self) -> bool {
        matches!(self, Status::Active)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Inactive => write!(f, "inactive"),
        }
    }
}

/// A single status poll for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(status: Status, timestamp: DateTime<Utc>) -> Self {
        Self { status, timestamp }
    }
}

/// One weekly business-hours entry in store-local time.
///
/// `day_of_week` uses Monday = 0 through Sunday = 6. When `close` is at or
/// before `open` the entry runs past midnight and closes on the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleEntry {
    pub day_of_week: u8,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl ScheduleEntry {
    pub fn new(day_of_week: u8, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            day_of_week,
            open,
            close,
        }
    }

    pub fn is_overnight(&self) -> bool {
        self.close <= self.open
    }
}

/// A store's weekly schedule
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    /// Open around the clock, every day.
    ///
    /// Each entry runs midnight to midnight, so consecutive days tile time
    /// without gaps.
    pub fn always_open() -> Self {
        let midnight = NaiveTime::MIN;
        Self {
            entries: (0..7)
                .map(|day| ScheduleEntry::new(day, midnight, midnight))
                .collect(),
        }
    }

    /// The store's own entries, or the 24/7 default when it has none
    pub fn or_always_open(self) -> Self {
        if self.entries.is_empty() {
            Self::always_open()
        } else {
            self
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_day(&self, day_of_week: u8) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.day_of_week == day_of_week)
    }
}

impl From<Vec<ScheduleEntry>> for Schedule {
    fn from(entries: Vec<ScheduleEntry>) -> Self {
        Self::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("active".parse::<Status>(), Ok(Status::Active));
        assert_eq!("inactive".parse::<Status>(), Ok(Status::Inactive));
        assert_eq!(" Active ".parse::<Status>(), Ok(Status::Active));
        assert!("open".parse::<Status>().is_err());
        assert!("".parse::<Status>().is_err());
    }

    #[test]
    fn test_status_display_round_trips() {
        for status in [Status::Active, Status::Inactive] {
            assert_eq!(status.to_string().parse::<Status>(), Ok(status));
        }
    }

    #[test]
    fn test_always_open_covers_every_day() {
        let schedule = Schedule::always_open();
        assert_eq!(schedule.entries().len(), 7);
        for day in 0..7 {
            let entries: Vec<_> = schedule.for_day(day).collect();
            assert_eq!(entries.len(), 1);
            assert!(entries[0].is_overnight(), "midnight-to-midnight wraps");
        }
    }

    #[test]
    fn test_or_always_open_keeps_real_entries() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        let schedule = Schedule::new(vec![ScheduleEntry::new(2, nine, five)]).or_always_open();
        assert_eq!(schedule.entries().len(), 1);
        assert!(!schedule.entries()[0].is_overnight());

        assert_eq!(Schedule::default().or_always_open(), Schedule::always_open());
    }

    #[test]
    fn test_for_day_filters() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        let schedule = Schedule::new(vec![
            ScheduleEntry::new(0, nine, noon),
            ScheduleEntry::new(0, noon, five),
            ScheduleEntry::new(3, nine, five),
        ]);
        assert_eq!(schedule.for_day(0).count(), 2);
        assert_eq!(schedule.for_day(3).count(), 1);
        assert_eq!(schedule.for_day(6).count(), 0);
    }
}
