//! Data access seams: reference data lookups and report job persistence
//!
//! The report pipeline only sees these traits. The in-memory implementations
//! back the binary and the tests.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::ReportError;
use crate::jobs::{JobOutcome, JobState, ReportJob};
use crate::model::{Observation, Schedule, ScheduleEntry, StoreId};

/// Read-only access to store timezones, schedules and observations
pub trait ReferenceData: Send + Sync {
    /// Timezone for a store, `None` when unknown
    fn timezone(&self, store_id: &str) -> Result<Option<Tz>, ReportError>;

    /// Weekly schedule, empty when the store has none
    fn schedule(&self, store_id: &str) -> Result<Schedule, ReportError>;

    /// Observations with `from <= timestamp <= to`, in any order
    fn observations(
        &self,
        store_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, ReportError>;

    /// Every store listed in the timezone reference data
    fn store_ids(&self) -> Result<Vec<StoreId>, ReportError>;

    /// Latest observation timestamp across all stores
    fn latest_observation_time(&self) -> Result<Option<DateTime<Utc>>, ReportError>;

    fn stats(&self) -> Result<DataStats, ReportError>;
}

/// Row counts for the reference tables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStats {
    pub store_timezones: usize,
    pub store_hours: usize,
    pub store_status: usize,
    pub latest_status_timestamp: Option<DateTime<Utc>>,
}

/// Reference data held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// `None` marks a listed store whose timezone name could not be used
    timezones: BTreeMap<StoreId, Option<Tz>>,
    schedules: HashMap<StoreId, Vec<ScheduleEntry>>,
    /// Sorted ascending by timestamp per store
    observations: HashMap<StoreId, Vec<Observation>>,
    latest: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }
}

impl ReferenceData for MemoryStore {
    fn timezone(&self, store_id: &str) -> Result<Option<Tz>, ReportError> {
        Ok(self.timezones.get(store_id).copied().flatten())
    }

    fn schedule(&self, store_id: &str) -> Result<Schedule, ReportError> {
        Ok(self
            .schedules
            .get(store_id)
            .map(|entries| Schedule::new(entries.clone()))
            .unwrap_or_default())
    }

    fn observations(
        &self,
        store_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, ReportError> {
        let Some(all) = self.observations.get(store_id) else {
            return Ok(Vec::new());
        };
        let lo = all.partition_point(|o| o.timestamp < from);
        let hi = all.partition_point(|o| o.timestamp <= to);
        Ok(all.get(lo..hi).map(<[Observation]>::to_vec).unwrap_or_default())
    }

    fn store_ids(&self) -> Result<Vec<StoreId>, ReportError> {
        Ok(self.timezones.keys().cloned().collect())
    }

    fn latest_observation_time(&self) -> Result<Option<DateTime<Utc>>, ReportError> {
        Ok(self.latest)
    }

    fn stats(&self) -> Result<DataStats, ReportError> {
        Ok(DataStats {
            store_timezones: self.timezones.len(),
            store_hours: self.schedules.values().map(Vec::len).sum(),
            store_status: self.observations.values().map(Vec::len).sum(),
            latest_status_timestamp: self.latest,
        })
    }
}

/// Collects rows in any order, sorts once on `build`
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    store: MemoryStore,
}

impl MemoryStoreBuilder {
    pub fn timezone(&mut self, store_id: impl Into<StoreId>, tz: Option<Tz>) -> &mut Self {
        self.store.timezones.insert(store_id.into(), tz);
        self
    }

    pub fn schedule_entry(&mut self, store_id: impl Into<StoreId>, entry: ScheduleEntry) -> &mut Self {
        self.store
            .schedules
            .entry(store_id.into())
            .or_default()
            .push(entry);
        self
    }

    pub fn observation(&mut self, store_id: impl Into<StoreId>, observation: Observation) -> &mut Self {
        self.store.latest = self.store.latest.max(Some(observation.timestamp));
        self.store
            .observations
            .entry(store_id.into())
            .or_default()
            .push(observation);
        self
    }

    pub fn build(self) -> MemoryStore {
        let mut store = self.store;
        for observations in store.observations.values_mut() {
            observations.sort_by_key(|o| o.timestamp);
        }
        store
    }
}

/// Persistence for report jobs
pub trait JobStore: Send + Sync {
    fn insert(&self, job: ReportJob) -> Result<(), ReportError>;

    fn get(&self, report_id: &str) -> Result<Option<ReportJob>, ReportError>;

    /// Move a running job to its terminal state. Fails if the job is unknown
    /// or already finished.
    fn finish(
        &self,
        report_id: &str,
        outcome: JobOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ReportError>;

    /// All jobs, newest first
    fn list(&self) -> Result<Vec<ReportJob>, ReportError>;
}

/// Jobs kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, ReportJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> ReportError {
        ReportError::Datastore("job table lock poisoned".to_string())
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: ReportJob) -> Result<(), ReportError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        if jobs.contains_key(&job.report_id) {
            return Err(ReportError::Datastore(format!(
                "report {} already exists",
                job.report_id
            )));
        }
        jobs.insert(job.report_id.clone(), job);
        Ok(())
    }

    fn get(&self, report_id: &str) -> Result<Option<ReportJob>, ReportError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        Ok(jobs.get(report_id).cloned())
    }

    fn finish(
        &self,
        report_id: &str,
        outcome: JobOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ReportError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        let job = jobs
            .get_mut(report_id)
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))?;

        let next = outcome.state();
        if !job.status.can_transition_to(next) {
            return Err(ReportError::InvalidState {
                report_id: report_id.to_string(),
                reason: format!("cannot move from {} to {}", job.status, next),
            });
        }

        job.status = next;
        job.completed_at = Some(completed_at);
        match outcome {
            JobOutcome::Complete(payload) => {
                job.csv_data = Some(payload.csv);
                job.json_data = Some(payload.json);
            }
            JobOutcome::Failed(message) => job.error_message = Some(message),
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<ReportJob>, ReportError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let mut all: Vec<ReportJob> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
