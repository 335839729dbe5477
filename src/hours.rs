/// Business hours resolution
/// Turns a weekly local schedule into concrete business intervals overlapping a UTC range

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::model::{Schedule, ScheduleEntry};

/// A business-hours span clipped to the requested range.
///
/// `start`/`end` are the clipped bounds; `opens_at`/`closes_at` are the full
/// business period the span was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessInterval {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub opens_at: DateTime<Tz>,
    pub closes_at: DateTime<Tz>,
}

impl BusinessInterval {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Pin a local wall-clock time to an instant in `tz`.
///
/// Times skipped by a DST jump use the offset in force before the jump;
/// repeated times pick the earlier instant.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // A day earlier is safely before the jump in every zone
            let before = naive - Duration::days(1);
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}

/// Business intervals overlapping `[range_start, range_end]`, ascending and
/// disjoint.
///
/// An empty schedule means the store is open 24/7. Entries that overlap,
/// repeat or run into each other across midnight are merged, and
/// `opens_at`/`closes_at` describe the merged span.
pub fn resolve(
    schedule: &Schedule,
    tz: Tz,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Vec<BusinessInterval> {
    if range_end <= range_start {
        return Vec::new();
    }

    let fallback;
    let schedule = if schedule.is_empty() {
        fallback = Schedule::always_open();
        &fallback
    } else {
        schedule
    };

    let local_start = range_start.with_timezone(&tz);
    let local_end = range_end.with_timezone(&tz);

    // Start a day early so overnight entries from the previous evening count
    let first_date = local_start.date_naive();
    let first_date = first_date.pred_opt().unwrap_or(first_date);
    let last_date = local_end.date_naive();

    let mut periods: Vec<(DateTime<Tz>, DateTime<Tz>)> = first_date
        .iter_days()
        .take_while(|date| *date <= last_date)
        .flat_map(move |date| {
            let day_of_week = date.weekday().num_days_from_monday() as u8;
            schedule
                .for_day(day_of_week)
                .map(move |entry| business_period(entry, date, tz))
        })
        .filter(|(opens_at, closes_at)| opens_at < closes_at)
        .collect();
    periods.sort_by_key(|(opens_at, _)| *opens_at);

    merge_periods(periods)
        .into_iter()
        .filter_map(|(opens_at, closes_at)| {
            let start = opens_at.max(local_start);
            let end = closes_at.min(local_end);
            (start < end).then_some(BusinessInterval {
                start,
                end,
                opens_at,
                closes_at,
            })
        })
        .collect()
}

/// Union of sorted periods. Overlapping or touching periods become one
/// continuous span, so no instant is counted twice.
fn merge_periods(periods: Vec<(DateTime<Tz>, DateTime<Tz>)>) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    let mut merged: Vec<(DateTime<Tz>, DateTime<Tz>)> = Vec::with_capacity(periods.len());
    for (opens_at, closes_at) in periods {
        match merged.last_mut() {
            Some(last) if opens_at <= last.1 => last.1 = last.1.max(closes_at),
            _ => merged.push((opens_at, closes_at)),
        }
    }
    merged
}

/// Full business period for one schedule entry on one local date
fn business_period(entry: &ScheduleEntry, date: NaiveDate, tz: Tz) -> (DateTime<Tz>, DateTime<Tz>) {
    let opens_at = localize(tz, date.and_time(entry.open));
    let close_date = if entry.is_overnight() {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    };
    let closes_at = localize(tz, close_date.and_time(entry.close));
    (opens_at, closes_at)
}

/// Total business time across a set of intervals
pub fn total_duration(intervals: &[BusinessInterval]) -> Duration {
    intervals
        .iter()
        .fold(Duration::zero(), |acc, interval| acc + interval.duration())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::NaiveTime;
    use proptest::prelude::*;

    const ZONES: [Tz; 6] = [
        chrono_tz::America::Chicago,
        chrono_tz::America::New_York,
        chrono_tz::America::Los_Angeles,
        chrono_tz::Europe::London,
        chrono_tz::Asia::Kolkata,
        chrono_tz::Australia::Sydney,
    ];

    fn range_strategy() -> impl Strategy<Value = (Tz, DateTime<Utc>, DateTime<Utc>)> {
        (0usize..ZONES.len(), 0i64..(365 * 86_400), 1i64..(7 * 86_400)).prop_map(
            |(zone, offset, length)| {
                let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
                let start = base + Duration::seconds(offset);
                (ZONES[zone], start, start + Duration::seconds(length))
            },
        )
    }

    fn entry_strategy() -> impl Strategy<Value = ScheduleEntry> {
        (0u8..7, 0u32..86_400, 0u32..86_400).prop_map(|(day, open, close)| {
            ScheduleEntry::new(
                day,
                NaiveTime::from_num_seconds_from_midnight_opt(open, 0).unwrap(),
                NaiveTime::from_num_seconds_from_midnight_opt(close, 0).unwrap(),
            )
        })
    }

    proptest! {
        /// A 24/7 store is in business for the whole range, whatever the zone
        #[test]
        fn empty_schedule_covers_whole_range((tz, start, end) in range_strategy()) {
            let intervals = resolve(&Schedule::default(), tz, start, end);
            prop_assert_eq!(total_duration(&intervals), end - start);
        }

        /// Intervals are non-empty, inside the range and ascending
        #[test]
        fn intervals_well_formed(
            (tz, start, end) in range_strategy(),
            entries in proptest::collection::vec(entry_strategy(), 0..10)
        ) {
            let intervals = resolve(&Schedule::new(entries), tz, start, end);
            for interval in &intervals {
                prop_assert!(interval.start < interval.end);
                prop_assert!(interval.start.with_timezone(&Utc) >= start);
                prop_assert!(interval.end.with_timezone(&Utc) <= end);
                prop_assert!(interval.opens_at <= interval.start);
            }
            for pair in intervals.windows(2) {
                prop_assert!(pair[0].end < pair[1].start, "intervals overlap or touch");
            }
        }

        /// Business time never exceeds the range, however entries overlap
        #[test]
        fn total_bounded_by_range(
            (tz, start, end) in range_strategy(),
            entries in proptest::collection::vec(entry_strategy(), 0..10)
        ) {
            // Repeat every entry so duplicates are always present
            let doubled: Vec<ScheduleEntry> = entries.iter().chain(entries.iter()).copied().collect();
            let intervals = resolve(&Schedule::new(doubled), tz, start, end);
            prop_assert!(total_duration(&intervals) <= end - start);
            prop_assert_eq!(
                total_duration(&intervals),
                total_duration(&resolve(&Schedule::new(entries), tz, start, end))
            );
        }
    }
}
