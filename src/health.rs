/// Report run metrics
/// Counters behind the /health and /metrics endpoints

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Snapshot of the report counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    /// Number of reports that completed
    pub reports_completed: u64,
    /// Number of reports that failed
    pub reports_failed: u64,
    /// Timestamp of the last finished report (Unix epoch seconds)
    pub last_report_time: u64,
    /// Whether the last finished report succeeded
    pub last_report_ok: bool,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            reports_completed: 0,
            reports_failed: 0,
            last_report_time: 0,
            last_report_ok: true, // Assume healthy until proven otherwise
        }
    }
}

/// Shared counters updated by report workers
#[derive(Debug)]
pub struct ReportMetrics {
    reports_completed: AtomicU64,
    reports_failed: AtomicU64,
    last_report_time: AtomicU64,
    last_report_ok: AtomicBool,
}

impl Default for ReportMetrics {
    fn default() -> Self {
        Self {
            reports_completed: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            last_report_time: AtomicU64::new(0),
            last_report_ok: AtomicBool::new(true),
        }
    }
}

impl ReportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.reports_completed.fetch_add(1, Ordering::Relaxed);
        self.touch(true);
    }

    pub fn record_failure(&self) {
        self.reports_failed.fetch_add(1, Ordering::Relaxed);
        self.touch(false);
    }

    fn touch(&self, ok: bool) {
        let now = Utc::now().timestamp().max(0) as u64;
        self.last_report_time.store(now, Ordering::Relaxed);
        self.last_report_ok.store(ok, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            reports_completed: self.reports_completed.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            last_report_time: self.last_report_time.load(Ordering::Relaxed),
            last_report_ok: self.last_report_ok.load(Ordering::Relaxed),
        }
    }
}

/// Prometheus text exposition of the counters
pub fn render_metrics(status: &HealthStatus) -> String {
    format!(
        "# HELP storewatch_reports_total Total number of finished reports\n\
         # TYPE storewatch_reports_total counter\n\
         storewatch_reports_total{{result=\"complete\"}} {}\n\
         storewatch_reports_total{{result=\"failed\"}} {}\n\
         # HELP storewatch_last_report_timestamp Unix timestamp of the last finished report\n\
         # TYPE storewatch_last_report_timestamp gauge\n\
         storewatch_last_report_timestamp {}\n\
         # HELP storewatch_last_report_ok Whether the last report completed (1) or failed (0)\n\
         # TYPE storewatch_last_report_ok gauge\n\
         storewatch_last_report_ok {}\n",
        status.reports_completed,
        status.reports_failed,
        status.last_report_time,
        if status.last_report_ok { 1 } else { 0 }
    )
}
