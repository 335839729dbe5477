//! Report job lifecycle
//!
//! A job is created `Running`, its report is computed on a blocking worker,
//! and it moves exactly once to `Complete` or `Failed`. Status polls are pure
//! reads and may run concurrently with the worker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ReportError;
use crate::health::ReportMetrics;
use crate::ingest::{self, IngestSummary};
use crate::report::{Report, ReportAggregator, ReportPayload};
use crate::store::{JobStore, ReferenceData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }

    /// Running is the only state that may still change
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Running, JobState::Complete) | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "Running"),
            JobState::Complete => write!(f, "Complete"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}

/// Persisted report job record
#[derive(Debug, Clone, PartialEq)]
pub struct ReportJob {
    pub report_id: String,
    pub status: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub csv_data: Option<String>,
    pub json_data: Option<String>,
    pub error_message: Option<String>,
}

impl ReportJob {
    pub fn running(report_id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            report_id,
            status: JobState::Running,
            created_at,
            completed_at: None,
            csv_data: None,
            json_data: None,
            error_message: None,
        }
    }
}

/// How a report run ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Complete(ReportPayload),
    Failed(String),
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Complete(_) => JobState::Complete,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// What a poller sees
#[derive(Debug, Clone, PartialEq)]
pub enum ReportStatus {
    NotFound,
    Running,
    Complete(ReportPayload),
    Failed(String),
}

/// Listing entry for `/reports`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub report_id: String,
    pub status: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub has_data: bool,
}

impl From<&ReportJob> for JobSummary {
    fn from(job: &ReportJob) -> Self {
        Self {
            report_id: job.report_id.clone(),
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            has_data: job.status == JobState::Complete && job.json_data.is_some(),
        }
    }
}

/// Creates, runs and reports on report jobs
///
/// Reference data sits behind a swappable handle. Each run takes a snapshot
/// when it starts, so a reload never changes a report already in flight.
#[derive(Clone)]
pub struct ReportJobManager {
    jobs: Arc<dyn JobStore>,
    data: Arc<RwLock<Arc<dyn ReferenceData>>>,
    metrics: Arc<ReportMetrics>,
    data_dir: Option<PathBuf>,
}

impl ReportJobManager {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        data: Arc<dyn ReferenceData>,
        metrics: Arc<ReportMetrics>,
    ) -> Self {
        Self {
            jobs,
            data: Arc::new(RwLock::new(data)),
            metrics,
            data_dir: None,
        }
    }

    /// Directory the CSV inputs are reloaded from
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Current reference data snapshot
    pub fn data(&self) -> Arc<dyn ReferenceData> {
        let current = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Swap in new reference data for every run started from now on
    pub fn replace_data(&self, data: Arc<dyn ReferenceData>) {
        let mut current = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *current = data;
    }

    pub fn metrics(&self) -> &ReportMetrics {
        &self.metrics
    }

    /// Re-read the CSV inputs in the background and swap them in once loaded.
    ///
    /// Returns `None` when no data directory is configured. A failed load
    /// leaves the current data in place.
    pub fn reload(&self) -> Option<JoinHandle<anyhow::Result<IngestSummary>>> {
        let dir = self.data_dir.clone()?;
        let manager = self.clone();

        Some(tokio::spawn(async move {
            info!("Reloading input data from {}", dir.display());
            let loaded = tokio::task::spawn_blocking(move || ingest::load_dir(&dir))
                .await
                .map_err(|e| anyhow::anyhow!("Ingest worker failed: {}", e))
                .and_then(|result| result);

            match loaded {
                Ok((store, summary)) => {
                    manager.replace_data(Arc::new(store));
                    info!("Input data reloaded");
                    Ok(summary)
                }
                Err(e) => {
                    error!("Failed to reload input data: {:#}", e);
                    Err(e)
                }
            }
        }))
    }

    /// Register a new running job and return its id
    pub fn create(&self) -> Result<String, ReportError> {
        let report_id = Uuid::new_v4().to_string();
        self.jobs
            .insert(ReportJob::running(report_id.clone(), Utc::now()))?;
        info!("Created report {}", report_id);
        Ok(report_id)
    }

    /// Run the report for `report_id` in the background.
    ///
    /// Must be called from inside a tokio runtime. The handle resolves once
    /// the job record holds its terminal state; dropping it does not cancel
    /// the run.
    pub fn start(&self, report_id: &str) -> JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let data = self.data();
        let metrics = Arc::clone(&self.metrics);
        let report_id = report_id.to_string();

        tokio::spawn(async move {
            let run =
                tokio::task::spawn_blocking(move || ReportAggregator::new(data.as_ref()).build())
                    .await;

            let outcome = match run {
                Ok(Ok(payload)) => JobOutcome::Complete(payload),
                Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "worker cancelled".to_string()
                    };
                    JobOutcome::Failed(ReportError::WorkerPanic(reason).to_string())
                }
            };

            match &outcome {
                JobOutcome::Complete(_) => {
                    info!("Report {} complete", report_id);
                    metrics.record_success();
                }
                JobOutcome::Failed(message) => {
                    warn!("Report {} failed: {}", report_id, message);
                    metrics.record_failure();
                }
            }

            if let Err(e) = jobs.finish(&report_id, outcome, Utc::now()) {
                error!("Failed to record outcome of report {}: {}", report_id, e);
            }
        })
    }

    /// Create a job and start it
    pub fn trigger(&self) -> Result<String, ReportError> {
        let report_id = self.create()?;
        self.start(&report_id);
        Ok(report_id)
    }

    /// Current state of a report. Never mutates anything.
    pub fn status(&self, report_id: &str) -> Result<ReportStatus, ReportError> {
        let Some(job) = self.jobs.get(report_id)? else {
            return Ok(ReportStatus::NotFound);
        };

        match job.status {
            JobState::Running => Ok(ReportStatus::Running),
            JobState::Complete => match (job.csv_data, job.json_data) {
                (Some(csv), Some(json)) => Ok(ReportStatus::Complete(ReportPayload { csv, json })),
                _ => Err(ReportError::InvalidState {
                    report_id: report_id.to_string(),
                    reason: "complete report has no payload".to_string(),
                }),
            },
            JobState::Failed => Ok(ReportStatus::Failed(
                job.error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    /// Every job, newest first
    pub fn list(&self) -> Result<Vec<JobSummary>, ReportError> {
        Ok(self.jobs.list()?.iter().map(JobSummary::from).collect())
    }

    /// Parsed report of a completed job
    pub fn completed_report(&self, report_id: &str) -> Result<Report, ReportError> {
        let job = self
            .jobs
            .get(report_id)?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))?;

        if job.status != JobState::Complete {
            return Err(ReportError::NotReady {
                report_id: report_id.to_string(),
                status: job.status.to_string().to_lowercase(),
            });
        }

        let json = job.json_data.ok_or_else(|| ReportError::InvalidState {
            report_id: report_id.to_string(),
            reason: "no JSON data available".to_string(),
        })?;

        serde_json::from_str(&json).map_err(|e| ReportError::InvalidState {
            report_id: report_id.to_string(),
            reason: format!("invalid JSON data: {}", e),
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Observation, Schedule, Status};
    use crate::store::{DataStats, MemoryJobStore, MemoryStore};
    use chrono::{Duration, TimeZone};
    use chrono_tz::Tz;
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 25, 18, 0, 0).unwrap()
    }

    fn sample_data() -> Arc<dyn ReferenceData> {
        let mut builder = MemoryStore::builder();
        builder
            .timezone("s1", Some(chrono_tz::America::Chicago))
            .observation("s1", Observation::new(Status::Active, now() - Duration::minutes(45)))
            .observation("s1", Observation::new(Status::Inactive, now() - Duration::minutes(15)))
            .observation("s1", Observation::new(Status::Inactive, now()));
        Arc::new(builder.build())
    }

    fn manager_with(data: Arc<dyn ReferenceData>) -> (ReportJobManager, Arc<MemoryJobStore>) {
        let jobs = Arc::new(MemoryJobStore::new());
        let manager = ReportJobManager::new(jobs.clone(), data, Arc::new(ReportMetrics::new()));
        (manager, jobs)
    }

    /// Reference data whose latest-observation lookup runs a closure
    struct ScriptedData<F: Fn() -> Result<Option<DateTime<Utc>>, ReportError> + Send + Sync> {
        latest: F,
    }

    fn scripted<F>(latest: F) -> Arc<ScriptedData<F>>
    where
        F: Fn() -> Result<Option<DateTime<Utc>>, ReportError> + Send + Sync,
    {
        Arc::new(ScriptedData { latest })
    }

    impl<F> ReferenceData for ScriptedData<F>
    where
        F: Fn() -> Result<Option<DateTime<Utc>>, ReportError> + Send + Sync,
    {
        fn timezone(&self, _: &str) -> Result<Option<Tz>, ReportError> {
            Ok(None)
        }
        fn schedule(&self, _: &str) -> Result<Schedule, ReportError> {
            Ok(Schedule::default())
        }
        fn observations(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<Observation>, ReportError> {
            Ok(Vec::new())
        }
        fn store_ids(&self) -> Result<Vec<String>, ReportError> {
            Ok(vec!["s1".to_string()])
        }
        fn latest_observation_time(&self) -> Result<Option<DateTime<Utc>>, ReportError> {
            (self.latest)()
        }
        fn stats(&self) -> Result<DataStats, ReportError> {
            Err(ReportError::Datastore("not supported".to_string()))
        }
    }

    #[tokio::test]
    async fn test_trigger_completes() {
        let (manager, _) = manager_with(sample_data());
        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();

        let ReportStatus::Complete(payload) = manager.status(&report_id).unwrap() else {
            panic!("report should be complete");
        };
        assert!(payload.csv.starts_with("store_id,"));
        assert!(payload.csv.contains("s1,45.00,"));
        assert_eq!(manager.metrics().status().reports_completed, 1);
    }

    #[tokio::test]
    async fn test_polling_is_idempotent() {
        let (manager, _) = manager_with(sample_data());
        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();

        let first = manager.status(&report_id).unwrap();
        let second = manager.status(&report_id).unwrap();
        assert_eq!(first, second);
        assert!(matches!(first, ReportStatus::Complete(_)));
    }

    #[tokio::test]
    async fn test_unknown_report_is_not_found() {
        let (manager, _) = manager_with(sample_data());
        assert_eq!(manager.status("missing").unwrap(), ReportStatus::NotFound);
        assert!(matches!(
            manager.completed_report("missing"),
            Err(ReportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_dataset_fails_job() {
        let (manager, _) = manager_with(Arc::new(MemoryStore::default()));
        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();

        assert_eq!(
            manager.status(&report_id).unwrap(),
            ReportStatus::Failed("No status data found".to_string())
        );
        assert_eq!(manager.metrics().status().reports_failed, 1);
    }

    #[tokio::test]
    async fn test_datastore_error_fails_job() {
        let data = scripted(|| Err(ReportError::Datastore("connection reset".to_string())));
        let (manager, _) = manager_with(data);
        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();

        let ReportStatus::Failed(message) = manager.status(&report_id).unwrap() else {
            panic!("report should have failed");
        };
        assert!(message.contains("connection reset"), "{}", message);
    }

    #[tokio::test]
    async fn test_panic_in_aggregation_fails_job() {
        let data = scripted(|| panic!("corrupt index"));
        let (manager, jobs) = manager_with(data);
        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();

        let ReportStatus::Failed(message) = manager.status(&report_id).unwrap() else {
            panic!("report should have failed");
        };
        assert!(message.contains("corrupt index"), "{}", message);
        assert!(jobs.get(&report_id).unwrap().unwrap().completed_at.is_some());
    }

    #[tokio::test]
    async fn test_running_until_worker_finishes() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let data = scripted(move || {
            gate.lock().unwrap().recv().ok();
            Ok(Some(now()))
        });
        let (manager, _) = manager_with(data);

        let report_id = manager.create().unwrap();
        let handle = manager.start(&report_id);
        assert_eq!(manager.status(&report_id).unwrap(), ReportStatus::Running);
        assert!(matches!(
            manager.completed_report(&report_id),
            Err(ReportError::NotReady { .. })
        ));

        release.send(()).unwrap();
        handle.await.unwrap();

        let status = manager.status(&report_id).unwrap();
        assert!(matches!(status, ReportStatus::Complete(_)));
        for _ in 0..5 {
            assert_eq!(manager.status(&report_id).unwrap(), status);
        }
    }

    #[tokio::test]
    async fn test_complete_without_payload_is_invalid_state() {
        let (manager, jobs) = manager_with(sample_data());
        let mut job = ReportJob::running("broken".to_string(), now());
        job.status = JobState::Complete;
        jobs.insert(job).unwrap();

        assert!(matches!(
            manager.status("broken"),
            Err(ReportError::InvalidState { .. })
        ));
        assert!(matches!(
            manager.completed_report("broken"),
            Err(ReportError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_completed_report_parses_json() {
        let (manager, _) = manager_with(sample_data());
        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();

        let report = manager.completed_report(&report_id).unwrap();
        assert_eq!(report.stores.len(), 1);
        assert_eq!(report.stores[0].uptime_last_hour_minutes, 45.0);
    }

    #[tokio::test]
    async fn test_list_reports() {
        let (manager, _) = manager_with(sample_data());
        let done = manager.create().unwrap();
        manager.start(&done).await.unwrap();
        let pending = manager.create().unwrap();

        let listed = manager.list().unwrap();
        assert_eq!(listed.len(), 2);
        let done_entry = listed.iter().find(|j| j.report_id == done).unwrap();
        assert!(done_entry.has_data);
        let pending_entry = listed.iter().find(|j| j.report_id == pending).unwrap();
        assert_eq!(pending_entry.status, JobState::Running);
        assert!(!pending_entry.has_data);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (manager, _) = manager_with(sample_data());
        let a = manager.create().unwrap();
        let b = manager.create().unwrap();
        assert_ne!(a, b);
    }

    fn write_inputs(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("storewatch-jobs-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(ingest::TIMEZONES_FILE),
            "store_id,timezone_str\nfresh,America/Denver\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(ingest::MENU_HOURS_FILE),
            "store_id,dayOfWeek,start_time_local,end_time_local\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(ingest::STORE_STATUS_FILE),
            "store_id,status,timestamp_utc\nfresh,active,2023-01-25 18:00:00 UTC\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reload_swaps_reference_data() {
        let dir = write_inputs("reload");
        let (manager, _) = manager_with(sample_data());
        let manager = manager.with_data_dir(&dir);

        let summary = manager.reload().unwrap().await.unwrap().unwrap();
        assert_eq!(summary.timezones.loaded, 1);
        assert_eq!(manager.data().store_ids().unwrap(), vec!["fresh".to_string()]);

        let report_id = manager.create().unwrap();
        manager.start(&report_id).await.unwrap();
        let report = manager.completed_report(&report_id).unwrap();
        assert_eq!(report.stores[0].store_id, "fresh");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_data() {
        let (manager, _) = manager_with(sample_data());
        assert!(manager.reload().is_none());

        let manager = manager.with_data_dir("/nonexistent/storewatch/input");
        assert!(manager.reload().unwrap().await.unwrap().is_err());
        assert_eq!(manager.data().store_ids().unwrap(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_running_report_keeps_its_snapshot() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let data = scripted(move || {
            gate.lock().unwrap().recv().ok();
            Ok(Some(now()))
        });
        let (manager, _) = manager_with(data);

        let report_id = manager.create().unwrap();
        let handle = manager.start(&report_id);
        // Data with no observations would fail any run that saw it
        manager.replace_data(Arc::new(MemoryStore::default()));
        release.send(()).unwrap();
        handle.await.unwrap();

        assert!(matches!(
            manager.status(&report_id).unwrap(),
            ReportStatus::Complete(_)
        ));
    }

    #[test]
    fn test_transitions() {
        assert!(JobState::Running.can_transition_to(JobState::Complete));
        assert!(JobState::Running.can_transition_to(JobState::Failed));
        assert!(!JobState::Running.can_transition_to(JobState::Running));
        for terminal in [JobState::Complete, JobState::Failed] {
            assert!(terminal.is_terminal());
            for next in [JobState::Running, JobState::Complete, JobState::Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
