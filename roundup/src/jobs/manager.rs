//! Thread-safe in-memory job registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use roundup_shared::{RoundupError, RoundupResult};
use uuid::Uuid;

use crate::savings::schema::{JobStatusResponse, ReturnsRequest, ReturnsResponse};
use crate::savings::{Instrument, process_returns};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub instrument: Instrument,
    pub status: JobStatus,
    pub result: Option<ReturnsResponse>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn new(instrument: Instrument) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            instrument,
            status: JobStatus::Processing,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn to_response(&self) -> JobStatusResponse {
        JobStatusResponse {
            job_id: self.id.clone(),
            status: self.status.as_str().to_string(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Registry of submitted jobs, cheap to clone.
///
/// Finished jobs are kept for `retention` after they finish so clients can
/// still poll them; older ones are dropped on the next submission. Jobs still
/// processing are never evicted.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<RwLock<HashMap<String, JobRecord>>>,
    retention: Duration,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &self.inner.read().len())
            .field("retention", &self.retention)
            .finish()
    }
}

impl JobManager {
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Register a job and start computing it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: ReturnsRequest, instrument: Instrument) -> JobRecord {
        let record = self.register(instrument);
        let id = record.id.clone();
        let manager = self.clone();

        tokio::spawn(async move {
            let outcome =
                tokio::task::spawn_blocking(move || process_returns(&request, instrument)).await;
            let outcome = outcome.map_err(|e| {
                if e.is_panic() {
                    "returns computation panicked".to_string()
                } else {
                    e.to_string()
                }
            });
            if let Err(e) = manager.finish(&id, outcome) {
                tracing::warn!(job_id = %id, error = %e, "job vanished before completion");
            }
        });

        record
    }

    /// Create a `processing` entry without starting any work.
    pub fn register(&self, instrument: Instrument) -> JobRecord {
        let record = JobRecord::new(instrument);
        let mut jobs = self.inner.write();
        self.evict_expired(&mut jobs);
        jobs.insert(record.id.clone(), record.clone());

        tracing::debug!(
            job_id = %record.id,
            instrument = instrument.as_str(),
            "Registered returns job"
        );
        record
    }

    /// Store the outcome of a job.
    pub fn finish(&self, id: &str, outcome: Result<ReturnsResponse, String>) -> RoundupResult<()> {
        let mut jobs = self.inner.write();
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| RoundupError::NotFound(format!("job {id}")))?;

        match outcome {
            Ok(result) => {
                record.status = JobStatus::Completed;
                record.result = Some(result);
            }
            Err(error) => {
                tracing::warn!(job_id = %id, error = %error, "Returns job failed");
                record.status = JobStatus::Failed;
                record.error = Some(error);
            }
        }
        let finished_at = Utc::now();
        record.finished_at = Some(finished_at);

        tracing::debug!(
            job_id = %id,
            instrument = record.instrument.as_str(),
            status = record.status.as_str(),
            elapsed_ms = (finished_at - record.submitted_at).num_milliseconds(),
            "Finished returns job"
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.inner.read().get(id).cloned()
    }

    fn evict_expired(&self, jobs: &mut HashMap<String, JobRecord>) {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return;
        };
        let cutoff = Utc::now() - retention;
        let before = jobs.len();
        jobs.retain(|_, job| job.finished_at.is_none_or(|at| at > cutoff));
        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted finished jobs past retention");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::savings::schema::{KPeriod, Transaction};

    fn request() -> ReturnsRequest {
        ReturnsRequest {
            age: 30,
            wage: 50_000.0,
            inflation: 0.05,
            q: vec![],
            p: vec![],
            k: vec![KPeriod {
                start: "2023-01-01 00:00:00".into(),
                end: "2023-12-31 23:59:59".into(),
            }],
            transactions: vec![Transaction {
                date: "2023-02-28 15:49:20".into(),
                amount: 375.0,
                ceiling: 400.0,
                remanent: 25.0,
            }],
        }
    }

    #[test]
    fn test_register_is_processing() {
        let manager = JobManager::new(Duration::from_secs(60));
        let record = manager.register(Instrument::Nps);

        let stored = manager.get(&record.id).unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(stored.result.is_none());
        assert_eq!(stored.to_response().status, "processing");
    }

    #[test]
    fn test_finish_unknown_job() {
        let manager = JobManager::new(Duration::from_secs(60));
        let result = manager.finish("missing", Err("x".into()));
        assert!(matches!(result, Err(RoundupError::NotFound(_))));
    }

    #[test]
    fn test_failed_job_keeps_error() {
        let manager = JobManager::new(Duration::from_secs(60));
        let record = manager.register(Instrument::IndexFund);
        manager.finish(&record.id, Err("bad input".into())).unwrap();

        let response = manager.get(&record.id).unwrap().to_response();
        assert_eq!(response.status, "failed");
        assert_eq!(response.error.as_deref(), Some("bad input"));
        assert!(response.result.is_none());
    }

    #[test]
    fn test_finished_jobs_evicted_after_retention() {
        let manager = JobManager::new(Duration::ZERO);
        let done = manager.register(Instrument::Nps);
        manager
            .finish(&done.id, Err("done".into()))
            .unwrap();
        let pending = manager.register(Instrument::Nps);

        // registering `pending` evicted `done`; processing jobs survive
        assert!(manager.get(&done.id).is_none());
        manager.register(Instrument::Nps);
        assert!(manager.get(&pending.id).is_some());
        assert_eq!(manager.inner.read().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_completes() {
        let manager = JobManager::new(Duration::from_secs(60));
        let record = manager.submit(request(), Instrument::Nps);
        assert_eq!(record.status, JobStatus::Processing);

        let mut finished = None;
        for _ in 0..100 {
            let job = manager.get(&record.id).unwrap();
            if job.status.is_finished() {
                finished = Some(job);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let job = finished.expect("job did not finish");
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.unwrap();
        assert_eq!(result.savings_by_dates[0].amount, 25.0);
        assert!(job.finished_at.is_some());
    }
}
