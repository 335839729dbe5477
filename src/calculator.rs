//! Per-store uptime over one trailing window

use chrono::{DateTime, Utc};

use crate::error::ReportError;
use crate::extrapolate::{extrapolate, Uptime};
use crate::hours::{self, BusinessInterval};
use crate::model::{Observation, DEFAULT_TIMEZONE};
use crate::store::ReferenceData;

pub struct UptimeCalculator<'a> {
    data: &'a dyn ReferenceData,
}

impl<'a> UptimeCalculator<'a> {
    pub fn new(data: &'a dyn ReferenceData) -> Self {
        Self { data }
    }

    /// Uptime/downtime for `store_id` inside business hours of `[start, end]`.
    ///
    /// A store with no business hours in the window gets `(0, 0)`.
    pub fn compute(
        &self,
        store_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Uptime, ReportError> {
        let tz = self.data.timezone(store_id)?.unwrap_or(DEFAULT_TIMEZONE);
        let schedule = self.data.schedule(store_id)?.or_always_open();

        let intervals = hours::resolve(&schedule, tz, start, end);
        let Some(earliest_open) = intervals
            .iter()
            .map(|interval| interval.opens_at.with_timezone(&Utc))
            .min()
        else {
            return Ok(Uptime::default());
        };

        // Fetch from the earliest opening so each interval can see the
        // status its business period was already in
        let mut observations = self.data.observations(store_id, earliest_open.min(start), end)?;
        observations.sort_by_key(|o| o.timestamp);

        let mut total = Uptime::default();
        for interval in &intervals {
            total += uptime_in_interval(&observations, interval);
        }
        Ok(total)
    }
}

/// Run the extrapolation for one interval.
///
/// `observations` must be sorted. The latest sample taken earlier in the same
/// business period is carried in as if observed at the clipped start.
fn uptime_in_interval(observations: &[Observation], interval: &BusinessInterval) -> Uptime {
    let start = interval.start.with_timezone(&Utc);
    let end = interval.end.with_timezone(&Utc);
    let opens_at = interval.opens_at.with_timezone(&Utc);

    let lo = observations.partition_point(|o| o.timestamp < start);
    let hi = observations.partition_point(|o| o.timestamp <= end);
    let inside = observations.get(lo..hi).unwrap_or_default();

    let carried = observations[..lo]
        .last()
        .filter(|o| o.timestamp >= opens_at)
        .map(|o| Observation::new(o.status, start));

    match carried {
        Some(seed) => {
            let mut seeded = Vec::with_capacity(inside.len() + 1);
            seeded.push(seed);
            seeded.extend_from_slice(inside);
            extrapolate(&seeded, start, end)
        }
        None => extrapolate(inside, start, end),
    }
}
