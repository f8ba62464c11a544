//! Client-side coordinator for bulk LMS jobs.
//!
//! A job is submitted for a [`Selection`] of one group's targets, then polled at a fixed
//! interval until the server reports 100%. Progress and state changes flow into the
//! caller's [`GroupSession`]. Only one job per group may be in flight per coordinator;
//! the claim is released when the [`JobHandle`] is dropped, which also happens when a
//! poll future is dropped part way through.

mod error;
mod scheduler;
mod session;

pub use error::JobError;
pub use scheduler::{Scheduler, TokioScheduler};
pub use session::{GroupSession, JobObserver, JobState, NoopObserver, Selection};

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::client::{ClientError, HttpLmsClient, LmsApi, PollResult};
use crate::config::ClientConfig;
use crate::models::{GroupId, JobId, LmsOperation};

/// Delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

type BusyGroups = Arc<Mutex<HashSet<GroupId>>>;

/// Marks a group busy until dropped.
#[derive(Debug)]
struct InFlightGuard {
    busy: BusyGroups,
    group_id: GroupId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.group_id);
    }
}

/// A submitted job. Holds the group's in-flight claim.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    group_id: GroupId,
    operation: LmsOperation,
    _claim: InFlightGuard,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn operation(&self) -> LmsOperation {
        self.operation
    }
}

/// Final report of a job that reached 100%.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub operation: LmsOperation,
    /// Per-target failures, in the order the server reported them
    pub errors: Vec<String>,
}

impl JobResult {
    pub fn summary(&self) -> JobSummary {
        if self.errors.is_empty() {
            JobSummary::Success
        } else {
            JobSummary::Partial {
                count: self.errors.len(),
                message: self.errors.join("\n"),
            }
        }
    }
}

/// What to tell the user once a job completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSummary {
    Success,
    Partial { count: usize, message: String },
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSummary::Success => write!(f, "Operation completed successfully"),
            JobSummary::Partial { count, message } => {
                write!(f, "Operation completed with {} error(s):\n{}", count, message)
            }
        }
    }
}

/// Submits bulk LMS jobs and polls them to completion.
pub struct JobCoordinator<A, S = TokioScheduler> {
    api: Arc<A>,
    scheduler: S,
    poll_interval: Duration,
    busy: BusyGroups,
}

impl<A, S: Clone> Clone for JobCoordinator<A, S> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            scheduler: self.scheduler.clone(),
            poll_interval: self.poll_interval,
            busy: Arc::clone(&self.busy),
        }
    }
}

impl<A, S> fmt::Debug for JobCoordinator<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl<A: LmsApi> JobCoordinator<A, TokioScheduler> {
    pub fn new(api: A) -> Self {
        Self::with_scheduler(api, TokioScheduler)
    }
}

impl JobCoordinator<HttpLmsClient, TokioScheduler> {
    /// Coordinator for the configured server, polling at the configured interval.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(HttpLmsClient::new(config)?).with_poll_interval(config.poll_interval))
    }
}

impl<A: LmsApi, S: Scheduler> JobCoordinator<A, S> {
    pub fn with_scheduler(api: A, scheduler: S) -> Self {
        Self {
            api: Arc::new(api),
            scheduler,
            poll_interval: DEFAULT_POLL_INTERVAL,
            busy: Arc::default(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Whether a job for `group_id` is currently in flight.
    pub fn is_in_flight(&self, group_id: GroupId) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&group_id)
    }

    pub async fn submit_create(
        &self,
        session: &mut GroupSession,
        selection: &Selection,
    ) -> Result<JobHandle, JobError> {
        self.submit(session, LmsOperation::Create, selection).await
    }

    pub async fn submit_delete(
        &self,
        session: &mut GroupSession,
        selection: &Selection,
    ) -> Result<JobHandle, JobError> {
        self.submit(session, LmsOperation::Delete, selection).await
    }

    /// Ask the server to start a bulk job.
    ///
    /// Nothing is sent for an empty selection, a selection for another group, or a
    /// group that already has a job in flight.
    pub async fn submit(
        &self,
        session: &mut GroupSession,
        operation: LmsOperation,
        selection: &Selection,
    ) -> Result<JobHandle, JobError> {
        if selection.is_empty() {
            return Err(JobError::EmptySelection);
        }
        if selection.group_id() != session.group_id() {
            return Err(JobError::SessionMismatch {
                session: session.group_id(),
                selection: selection.group_id(),
            });
        }

        let group_id = selection.group_id();
        let claim = self.claim(group_id)?;
        session.transition(JobState::Submitting);

        match self
            .api
            .submit(operation, group_id, selection.target_ids())
            .await
        {
            Ok(job_id) => {
                tracing::info!(
                    group_id,
                    %operation,
                    job_id = %job_id,
                    targets = selection.target_ids().len(),
                    "LMS job submitted"
                );
                session.transition(JobState::Polling(job_id.clone()));
                Ok(JobHandle {
                    job_id,
                    group_id,
                    operation,
                    _claim: claim,
                })
            }
            Err(err) => {
                tracing::warn!(group_id, %operation, error = %err, "LMS job submission failed");
                session.transition(JobState::Idle);
                Err(JobError::Submission(err.message()))
            }
        }
    }

    /// Poll a submitted job until it completes or a poll fails.
    ///
    /// The session ends `Idle` either way and the group's claim is released.
    pub async fn poll_until_complete(
        &self,
        session: &mut GroupSession,
        handle: JobHandle,
    ) -> Result<JobResult, JobError> {
        let outcome = self.poll_loop(session, &handle).await;

        session.transition(match outcome {
            Ok(_) => JobState::Done,
            Err(_) => JobState::Failed,
        });
        session.transition(JobState::Idle);
        drop(handle);

        outcome
    }

    /// Submit then poll to completion.
    pub async fn run(
        &self,
        session: &mut GroupSession,
        operation: LmsOperation,
        selection: &Selection,
    ) -> Result<JobResult, JobError> {
        let handle = self.submit(session, operation, selection).await?;
        self.poll_until_complete(session, handle).await
    }

    async fn poll_loop(
        &self,
        session: &mut GroupSession,
        handle: &JobHandle,
    ) -> Result<JobResult, JobError> {
        loop {
            let status = self
                .api
                .job_status(handle.group_id, &handle.job_id)
                .await
                .map_err(|err| {
                    tracing::warn!(job_id = %handle.job_id, error = %err, "LMS job poll failed");
                    JobError::PollTransport(err.message())
                })?;

            match status {
                PollResult::InProgress(progress) => {
                    let shown = session.report_progress(progress);
                    tracing::debug!(job_id = %handle.job_id, progress = shown, "LMS job progress");
                    self.scheduler.sleep(self.poll_interval).await;
                }
                PollResult::Done(errors) => {
                    session.report_progress(100);
                    tracing::info!(
                        job_id = %handle.job_id,
                        errors = errors.len(),
                        "LMS job complete"
                    );
                    return Ok(JobResult {
                        job_id: handle.job_id.clone(),
                        operation: handle.operation,
                        errors,
                    });
                }
                PollResult::Rejected(message) => {
                    tracing::warn!(job_id = %handle.job_id, %message, "LMS job rejected by server");
                    return Err(JobError::JobRejected(message));
                }
            }
        }
    }

    fn claim(&self, group_id: GroupId) -> Result<InFlightGuard, JobError> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(group_id) {
            return Err(JobError::AlreadyInFlight(group_id));
        }
        Ok(InFlightGuard {
            busy: Arc::clone(&self.busy),
            group_id,
        })
    }
}
