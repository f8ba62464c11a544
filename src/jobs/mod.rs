//! In-memory registry of bulk LMS jobs.
//!
//! Jobs are created by the LMS endpoints, advanced by their worker task and read by
//! the status endpoint. Finished jobs stay queryable for a retention window, after
//! which the reaper drops them.

mod worker;

pub use worker::{generate_username, run_lms_job};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::models::{GroupId, JobId, JobStatus, LmsOperation};

/// How often the reaper looks for expired jobs.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub group_id: GroupId,
    pub progress: u8,
    pub errors: Vec<String>,
    pub done: bool,
}

impl JobSnapshot {
    pub fn status(&self) -> JobStatus {
        JobStatus {
            progress: self.progress,
            errors: self.errors.clone(),
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    group_id: GroupId,
    progress: u8,
    errors: Vec<String>,
    finished_at: Option<Instant>,
}

/// Shared job table.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job and return its id.
    pub async fn create(&self, group_id: GroupId, operation: LmsOperation) -> JobId {
        let id = uuid::Uuid::new_v4().to_string();
        let entry = JobEntry {
            group_id,
            progress: 0,
            errors: Vec::new(),
            finished_at: None,
        };

        self.jobs.write().await.insert(id.clone(), entry);
        tracing::info!(job_id = %id, group_id, %operation, "Job created");
        id
    }

    pub async fn get(&self, id: &str) -> Option<JobSnapshot> {
        self.jobs.read().await.get(id).map(|job| JobSnapshot {
            group_id: job.group_id,
            progress: job.progress,
            errors: job.errors.clone(),
            done: job.finished_at.is_some(),
        })
    }

    /// Record progress, clamped to 100.
    pub async fn set_progress(&self, id: &str, progress: u8) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.progress = progress.min(100);
            tracing::debug!(job_id = %id, progress = job.progress, "Job progress");
        }
    }

    pub async fn push_error(&self, id: &str, message: String) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            tracing::info!(job_id = %id, error = %message, "Job error");
            job.errors.push(message);
        }
    }

    /// Mark a job finished at 100% progress.
    pub async fn finish(&self, id: &str) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.progress = 100;
            job.finished_at = Some(Instant::now());
            tracing::info!(job_id = %id, errors = job.errors.len(), "Job finished");
        }
    }

    /// Drop finished jobs older than `retention`. Returns how many were removed.
    pub async fn reap(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();

        jobs.retain(|id, job| match job.finished_at {
            Some(finished) if now.duration_since(finished) > retention => {
                tracing::info!(job_id = %id, "Job deleted");
                false
            }
            _ => true,
        });

        before - jobs.len()
    }

    /// Run `reap` periodically in the background.
    pub fn spawn_reaper(&self, retention: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                ticker.tick().await;
                let removed = registry.reap(retention).await;
                if removed > 0 {
                    let remaining = registry.len().await;
                    tracing::debug!(removed, remaining, "Reaped finished jobs");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
