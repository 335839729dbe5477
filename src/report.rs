//! Report assembly
//!
//! Computes every store over the three trailing windows and renders the
//! results as CSV and JSON.

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calculator::UptimeCalculator;
use crate::error::ReportError;
use crate::extrapolate::Uptime;
use crate::store::ReferenceData;

pub const CSV_HEADER: [&str; 7] = [
    "store_id",
    "uptime_last_hour(in minutes)",
    "uptime_last_day(in hours)",
    "uptime_last_week(in hours)",
    "downtime_last_hour(in minutes)",
    "downtime_last_day(in hours)",
    "downtime_last_week(in hours)",
];

/// The three lookback periods a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    LastHour,
    LastDay,
    LastWeek,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::LastHour, Window::LastDay, Window::LastWeek];

    pub fn length(self) -> Duration {
        match self {
            Window::LastHour => Duration::hours(1),
            Window::LastDay => Duration::days(1),
            Window::LastWeek => Duration::weeks(1),
        }
    }

    /// Smallest denominator used for the uptime percentage, in minutes.
    ///
    /// Stops a sliver of business time from producing wild percentages.
    pub fn percentage_floor_minutes(self) -> f64 {
        match self {
            Window::LastHour => 1.0,
            Window::LastDay | Window::LastWeek => 60.0,
        }
    }

    /// Convert minutes into the unit the window reports in
    pub fn in_report_units(self, minutes: f64) -> f64 {
        match self {
            Window::LastHour => minutes,
            Window::LastDay | Window::LastWeek => minutes / 60.0,
        }
    }

    pub fn uptime_percentage(self, uptime: &Uptime) -> f64 {
        let denominator = uptime.total_minutes().max(self.percentage_floor_minutes());
        round_to(uptime.uptime_minutes / denominator * 100.0, 1)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Window bounds anchored to the latest observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindows {
    pub current_time: DateTime<Utc>,
}

impl ReportWindows {
    pub fn new(current_time: DateTime<Utc>) -> Self {
        Self { current_time }
    }

    pub fn bounds(&self, window: Window) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.current_time - window.length(), self.current_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimePercentage {
    pub last_hour: f64,
    pub last_day: f64,
    pub last_week: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalBusinessTime {
    pub last_hour_minutes: f64,
    pub last_day_hours: f64,
    pub last_week_hours: f64,
}

/// One store's row in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReport {
    pub store_id: String,
    pub uptime_last_hour_minutes: f64,
    pub uptime_last_day_hours: f64,
    pub uptime_last_week_hours: f64,
    pub downtime_last_hour_minutes: f64,
    pub downtime_last_day_hours: f64,
    pub downtime_last_week_hours: f64,
    pub uptime_percentage: UptimePercentage,
    pub total_business_time: TotalBusinessTime,
}

impl StoreReport {
    pub fn from_windows(store_id: String, hour: &Uptime, day: &Uptime, week: &Uptime) -> Self {
        let units = |window: Window, minutes: f64| round_to(window.in_report_units(minutes), 2);

        Self {
            store_id,
            uptime_last_hour_minutes: units(Window::LastHour, hour.uptime_minutes),
            uptime_last_day_hours: units(Window::LastDay, day.uptime_minutes),
            uptime_last_week_hours: units(Window::LastWeek, week.uptime_minutes),
            downtime_last_hour_minutes: units(Window::LastHour, hour.downtime_minutes),
            downtime_last_day_hours: units(Window::LastDay, day.downtime_minutes),
            downtime_last_week_hours: units(Window::LastWeek, week.downtime_minutes),
            uptime_percentage: UptimePercentage {
                last_hour: Window::LastHour.uptime_percentage(hour),
                last_day: Window::LastDay.uptime_percentage(day),
                last_week: Window::LastWeek.uptime_percentage(week),
            },
            total_business_time: TotalBusinessTime {
                last_hour_minutes: units(Window::LastHour, hour.total_minutes()),
                last_day_hours: units(Window::LastDay, day.total_minutes()),
                last_week_hours: units(Window::LastWeek, week.total_minutes()),
            },
        }
    }

    /// Mean of the three window percentages
    pub fn average_uptime(&self) -> f64 {
        let p = &self.uptime_percentage;
        (p.last_hour + p.last_day + p.last_week) / 3.0
    }

    fn csv_row(&self) -> String {
        let numbers = [
            self.uptime_last_hour_minutes,
            self.uptime_last_day_hours,
            self.uptime_last_week_hours,
            self.downtime_last_hour_minutes,
            self.downtime_last_day_hours,
            self.downtime_last_week_hours,
        ];
        let mut row = csv_field(&self.store_id);
        for value in numbers {
            row.push(',');
            row.push_str(&format!("{:.2}", value));
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePeriods {
    pub last_hour: (DateTime<Utc>, DateTime<Utc>),
    pub last_day: (DateTime<Utc>, DateTime<Utc>),
    pub last_week: (DateTime<Utc>, DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_stores: usize,
    pub time_periods: TimePeriods,
}

/// Structured form of a finished report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_metadata: ReportMetadata,
    pub stores: Vec<StoreReport>,
}

impl Report {
    pub fn to_csv(&self) -> String {
        let mut csv = CSV_HEADER.join(",");
        csv.push('\n');
        for store in &self.stores {
            csv.push_str(&store.csv_row());
            csv.push('\n');
        }
        csv
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReportError::Encoding(e.to_string()))
    }
}

/// Both encodings of a finished report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPayload {
    pub csv: String,
    pub json: String,
}

/// Quote a CSV field when it needs it
fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub struct ReportAggregator<'a> {
    data: &'a dyn ReferenceData,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(data: &'a dyn ReferenceData) -> Self {
        Self { data }
    }

    /// Compute the structured report for every known store
    pub fn report(&self) -> Result<Report, ReportError> {
        let current_time = self
            .data
            .latest_observation_time()?
            .ok_or(ReportError::DataUnavailable)?;
        let windows = ReportWindows::new(current_time);

        let store_ids = self.data.store_ids()?;
        info!(
            "Computing uptime for {} stores as of {}",
            store_ids.len(),
            current_time
        );

        let calculator = UptimeCalculator::new(self.data);
        let stores = store_ids
            .into_par_iter()
            .map(|store_id| {
                let [hour, day, week] = Window::ALL.map(|window| {
                    let (start, end) = windows.bounds(window);
                    calculator.compute(&store_id, start, end)
                });
                let report = StoreReport::from_windows(store_id, &hour?, &day?, &week?);
                debug!("Store {} average uptime {:.1}%", report.store_id, report.average_uptime());
                Ok(report)
            })
            .collect::<Result<Vec<_>, ReportError>>()?;

        Ok(Report {
            report_metadata: ReportMetadata {
                generated_at: current_time,
                total_stores: stores.len(),
                time_periods: TimePeriods {
                    last_hour: windows.bounds(Window::LastHour),
                    last_day: windows.bounds(Window::LastDay),
                    last_week: windows.bounds(Window::LastWeek),
                },
            },
            stores,
        })
    }

    /// Compute the report and render both encodings
    pub fn build(&self) -> Result<ReportPayload, ReportError> {
        let report = self.report()?;
        Ok(ReportPayload {
            csv: report.to_csv(),
            json: report.to_json()?,
        })
    }
}
