//! Carry-forward extrapolation of uptime from sparse observations
//!
//! Observations are point samples. Time before the first sample takes the
//! first sample's status, time after every sample keeps that sample's status
//! until the next one. An interval with no samples counts as downtime.

use chrono::{DateTime, Utc};

use crate::model::Observation;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Uptime and downtime, in minutes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Uptime {
    pub uptime_minutes: f64,
    pub downtime_minutes: f64,
}

impl Uptime {
    pub fn total_minutes(&self) -> f64 {
        self.uptime_minutes + self.downtime_minutes
    }
}

impl std::ops::AddAssign for Uptime {
    fn add_assign(&mut self, other: Self) {
        self.uptime_minutes += other.uptime_minutes;
        self.downtime_minutes += other.downtime_minutes;
    }
}

/// Extrapolate uptime over `[start, end]`.
///
/// `observations` must be sorted ascending and lie inside the interval.
/// Samples outside it are clamped to the bounds. The two figures always sum
/// to the interval length.
pub fn extrapolate(observations: &[Observation], start: DateTime<Utc>, end: DateTime<Utc>) -> Uptime {
    let total_ms = (end - start).num_milliseconds().max(0);

    let Some(first) = observations.first() else {
        return Uptime {
            uptime_minutes: 0.0,
            downtime_minutes: total_ms as f64 / MILLIS_PER_MINUTE,
        };
    };

    let mut up_ms: i64 = 0;
    let mut down_ms: i64 = 0;
    let mut cursor = start;
    // The stretch before the first sample carries its status backwards
    let mut carried = first.status;

    for observation in observations {
        let at = observation.timestamp.clamp(cursor, end.max(cursor));
        let segment = (at - cursor).num_milliseconds();
        if carried.is_active() {
            up_ms += segment;
        } else {
            down_ms += segment;
        }
        cursor = at;
        carried = observation.status;
    }

    let tail = (end - cursor).num_milliseconds().max(0);
    if carried.is_active() {
        up_ms += tail;
    } else {
        down_ms += tail;
    }

    Uptime {
        uptime_minutes: up_ms as f64 / MILLIS_PER_MINUTE,
        downtime_minutes: down_ms as f64 / MILLIS_PER_MINUTE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 25, 15, 0, 0).unwrap()
    }

    fn obs(status: Status, minutes: i64) -> Observation {
        Observation::new(status, base() + Duration::minutes(minutes))
    }

    #[test]
    fn test_no_observations_is_all_downtime() {
        let result = extrapolate(&[], base(), base() + Duration::minutes(60));
        assert_eq!(result.uptime_minutes, 0.0);
        assert_eq!(result.downtime_minutes, 60.0);
    }

    #[test]
    fn test_single_observation_at_midpoint_covers_both_sides() {
        let end = base() + Duration::minutes(60);

        let result = extrapolate(&[obs(Status::Active, 30)], base(), end);
        assert_eq!(result.uptime_minutes, 60.0);
        assert_eq!(result.downtime_minutes, 0.0);

        let result = extrapolate(&[obs(Status::Inactive, 30)], base(), end);
        assert_eq!(result.uptime_minutes, 0.0);
        assert_eq!(result.downtime_minutes, 60.0);
    }

    #[test]
    fn test_carry_forward_between_samples() {
        // active @ 10, inactive @ 25, active @ 40 over one hour
        let observations = [
            obs(Status::Active, 10),
            obs(Status::Inactive, 25),
            obs(Status::Active, 40),
        ];
        let result = extrapolate(&observations, base(), base() + Duration::minutes(60));

        // 0-10 carried back active, 10-25 active, 25-40 inactive, 40-60 active
        assert_eq!(result.uptime_minutes, 45.0);
        assert_eq!(result.downtime_minutes, 15.0);
    }

    #[test]
    fn test_samples_on_bounds() {
        let observations = [obs(Status::Inactive, 0), obs(Status::Active, 60)];
        let result = extrapolate(&observations, base(), base() + Duration::minutes(60));
        assert_eq!(result.uptime_minutes, 0.0);
        assert_eq!(result.downtime_minutes, 60.0);
    }

    #[test]
    fn test_duplicate_timestamps_add_nothing() {
        let observations = [
            obs(Status::Active, 20),
            obs(Status::Inactive, 20),
            obs(Status::Inactive, 50),
        ];
        let result = extrapolate(&observations, base(), base() + Duration::minutes(60));
        assert_eq!(result.uptime_minutes, 20.0);
        assert_eq!(result.downtime_minutes, 40.0);
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let observations = [obs(Status::Active, -30), obs(Status::Inactive, 90)];
        let result = extrapolate(&observations, base(), base() + Duration::minutes(60));
        assert_eq!(result.total_minutes(), 60.0);
        assert_eq!(result.uptime_minutes, 60.0);
    }

    #[test]
    fn test_fractional_minutes() {
        let observations = [Observation::new(Status::Active, base() + Duration::seconds(90))];
        let result = extrapolate(&observations, base(), base() + Duration::seconds(150));
        assert_eq!(result.uptime_minutes, 2.5);
    }

    #[test]
    fn test_empty_interval() {
        let result = extrapolate(&[obs(Status::Active, 0)], base(), base());
        assert_eq!(result, Uptime::default());
    }

    #[test]
    fn test_add_assign() {
        let mut total = Uptime::default();
        total += Uptime {
            uptime_minutes: 10.0,
            downtime_minutes: 5.0,
        };
        total += Uptime {
            uptime_minutes: 2.5,
            downtime_minutes: 0.5,
        };
        assert_eq!(total.uptime_minutes, 12.5);
        assert_eq!(total.downtime_minutes, 5.5);
        assert_eq!(total.total_minutes(), 18.0);
    }
}
