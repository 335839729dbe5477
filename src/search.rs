//! Browsing a finished report: listings, per-store details and summary
//! statistics with performance tiers.

use serde::{Deserialize, Serialize};

use crate::report::{round_to, Report, ReportMetadata, StoreReport};

/// Performance bucket for a store's average uptime percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformanceTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl PerformanceTier {
    pub fn from_average(average: f64) -> Self {
        if average >= 95.0 {
            PerformanceTier::Excellent
        } else if average >= 90.0 {
            PerformanceTier::Good
        } else if average >= 80.0 {
            PerformanceTier::Fair
        } else if average >= 70.0 {
            PerformanceTier::Poor
        } else {
            PerformanceTier::Critical
        }
    }
}

/// Optional filters for [`search`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchFilter {
    pub store_id: Option<String>,
    /// Minimum average uptime percentage
    pub min_uptime: Option<f64>,
}

impl SearchFilter {
    fn matches(&self, store: &StoreReport) -> bool {
        if let Some(id) = &self.store_id {
            if &store.store_id != id {
                return false;
            }
        }
        match self.min_uptime {
            Some(min) => store.average_uptime() >= min,
            None => true,
        }
    }
}

/// Stores in report order that pass `filter`
pub fn search<'r>(report: &'r Report, filter: &SearchFilter) -> Vec<&'r StoreReport> {
    report
        .stores
        .iter()
        .filter(|store| filter.matches(store))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantEntry {
    pub store_id: String,
    pub uptime_last_hour: f64,
    pub uptime_last_day: f64,
    pub uptime_last_week: f64,
    pub average_uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantListing {
    pub report_id: String,
    pub total_restaurants: usize,
    pub restaurants: Vec<RestaurantEntry>,
}

/// Percentages of the stores passing `filter`
pub fn restaurants(report_id: &str, report: &Report, filter: &SearchFilter) -> RestaurantListing {
    let restaurants: Vec<RestaurantEntry> = search(report, filter)
        .into_iter()
        .map(|store| RestaurantEntry {
            store_id: store.store_id.clone(),
            uptime_last_hour: store.uptime_percentage.last_hour,
            uptime_last_day: store.uptime_percentage.last_day,
            uptime_last_week: store.uptime_percentage.last_week,
            average_uptime: round_to(store.average_uptime(), 1),
        })
        .collect();

    RestaurantListing {
        report_id: report_id.to_string(),
        total_restaurants: restaurants.len(),
        restaurants,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourFigures {
    pub uptime_minutes: f64,
    pub downtime_minutes: f64,
    pub total_minutes: f64,
    pub uptime_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursFigures {
    pub uptime_hours: f64,
    pub downtime_hours: f64,
    pub total_hours: f64,
    pub uptime_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UptimeData {
    pub last_hour: HourFigures,
    pub last_day: HoursFigures,
    pub last_week: HoursFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailSummary {
    pub average_uptime_percentage: f64,
    pub performance_status: PerformanceTier,
    pub total_business_hours_week: f64,
}

/// Everything known about one store in one report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreDetails {
    pub report_id: String,
    pub store_id: String,
    pub uptime_data: UptimeData,
    pub summary: DetailSummary,
    pub raw_data: StoreReport,
}

/// Details for `store_id`, `None` when the report does not contain it
pub fn store_details(report_id: &str, report: &Report, store_id: &str) -> Option<StoreDetails> {
    let filter = SearchFilter {
        store_id: Some(store_id.to_string()),
        min_uptime: None,
    };
    let store = search(report, &filter).into_iter().next()?;
    let pct = &store.uptime_percentage;
    let total = &store.total_business_time;

    Some(StoreDetails {
        report_id: report_id.to_string(),
        store_id: store.store_id.clone(),
        uptime_data: UptimeData {
            last_hour: HourFigures {
                uptime_minutes: store.uptime_last_hour_minutes,
                downtime_minutes: store.downtime_last_hour_minutes,
                total_minutes: total.last_hour_minutes,
                uptime_percentage: pct.last_hour,
            },
            last_day: HoursFigures {
                uptime_hours: store.uptime_last_day_hours,
                downtime_hours: store.downtime_last_day_hours,
                total_hours: total.last_day_hours,
                uptime_percentage: pct.last_day,
            },
            last_week: HoursFigures {
                uptime_hours: store.uptime_last_week_hours,
                downtime_hours: store.downtime_last_week_hours,
                total_hours: total.last_week_hours,
                uptime_percentage: pct.last_week,
            },
        },
        summary: DetailSummary {
            average_uptime_percentage: round_to(store.average_uptime(), 1),
            performance_status: PerformanceTier::from_average(store.average_uptime()),
            total_business_hours_week: total.last_week_hours,
        },
        raw_data: store.clone(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TierShare {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceDistribution {
    pub excellent: TierShare,
    pub good: TierShare,
    pub fair: TierShare,
    pub poor: TierShare,
    pub critical: TierShare,
}

impl PerformanceDistribution {
    fn share_mut(&mut self, tier: PerformanceTier) -> &mut TierShare {
        match tier {
            PerformanceTier::Excellent => &mut self.excellent,
            PerformanceTier::Good => &mut self.good,
            PerformanceTier::Fair => &mut self.fair,
            PerformanceTier::Poor => &mut self.poor,
            PerformanceTier::Critical => &mut self.critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub total_stores: usize,
    pub average_uptime_percentage: f64,
    pub min_uptime_percentage: f64,
    pub max_uptime_percentage: f64,
    pub performance_distribution: PerformanceDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub report_id: String,
    pub report_metadata: ReportMetadata,
    pub summary_statistics: SummaryStatistics,
}

/// Aggregate statistics over every store, `None` for a report without stores
pub fn summarize(report_id: &str, report: &Report) -> Option<ReportSummary> {
    let averages: Vec<f64> = report.stores.iter().map(StoreReport::average_uptime).collect();
    if averages.is_empty() {
        return None;
    }

    let total = averages.len();
    let mut distribution = PerformanceDistribution::default();
    for &average in &averages {
        distribution.share_mut(PerformanceTier::from_average(average)).count += 1;
    }
    for tier in [
        PerformanceTier::Excellent,
        PerformanceTier::Good,
        PerformanceTier::Fair,
        PerformanceTier::Poor,
        PerformanceTier::Critical,
    ] {
        let share = distribution.share_mut(tier);
        share.percentage = round_to(share.count as f64 / total as f64 * 100.0, 1);
    }

    let min = averages.iter().copied().fold(f64::INFINITY, f64::min);
    let max = averages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = averages.iter().sum::<f64>() / total as f64;

    Some(ReportSummary {
        report_id: report_id.to_string(),
        report_metadata: report.report_metadata.clone(),
        summary_statistics: SummaryStatistics {
            total_stores: total,
            average_uptime_percentage: round_to(mean, 1),
            min_uptime_percentage: round_to(min, 1),
            max_uptime_percentage: round_to(max, 1),
            performance_distribution: distribution,
        },
    })
}
