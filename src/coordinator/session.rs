//! Per-group UI state driven by the coordinator.

use std::collections::HashSet;

use crate::models::{Group, GroupId, JobId, TargetId};

use super::JobError;

/// Lifecycle of one submitted job as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Submitting,
    Polling(JobId),
    Done,
    Failed,
}

/// Receives state changes and progress updates, e.g. to redraw a dialog.
pub trait JobObserver: Send {
    fn on_state(&mut self, _state: &JobState) {}

    fn on_progress(&mut self, _percent: u8) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// State holder for the LMS dialog of one group.
///
/// Owned by the UI controller and lent to the coordinator for each call, so the
/// coordinator never reaches for an ambient "current group".
pub struct GroupSession {
    group_id: GroupId,
    state: JobState,
    progress: Option<u8>,
    needs_refresh: bool,
    observer: Box<dyn JobObserver>,
}

impl std::fmt::Debug for GroupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSession")
            .field("group_id", &self.group_id)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("needs_refresh", &self.needs_refresh)
            .finish_non_exhaustive()
    }
}

impl GroupSession {
    pub fn new(group_id: GroupId) -> Self {
        Self::with_observer(group_id, NoopObserver)
    }

    pub fn with_observer(group_id: GroupId, observer: impl JobObserver + 'static) -> Self {
        Self {
            group_id,
            state: JobState::Idle,
            progress: None,
            needs_refresh: false,
            observer: Box::new(observer),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// True while controls that start a job should stay disabled.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, JobState::Submitting | JobState::Polling(_))
    }

    /// Last percentage shown to the user, if a job has reported any.
    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    /// Set after a job ends; LMS flags of the group's targets may have changed.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    pub fn mark_refreshed(&mut self) {
        self.needs_refresh = false;
    }

    /// Return to `Idle`, e.g. after dropping a poll future.
    pub fn reset(&mut self) {
        self.progress = None;
        if self.state != JobState::Idle {
            self.transition(JobState::Idle);
        }
    }

    pub(crate) fn transition(&mut self, state: JobState) {
        tracing::debug!(group_id = self.group_id, ?state, "LMS job state");
        if matches!(state, JobState::Submitting) {
            self.progress = None;
        }
        if matches!(state, JobState::Done | JobState::Failed) {
            self.needs_refresh = true;
        }
        self.state = state;
        self.observer.on_state(&self.state);
    }

    /// Show an observed percentage. The displayed value never goes backwards.
    pub(crate) fn report_progress(&mut self, observed: u8) -> u8 {
        let shown = self.progress.map_or(observed, |p| p.max(observed)).min(100);
        self.progress = Some(shown);
        self.observer.on_progress(shown);
        shown
    }
}

/// Target ids chosen for one bulk operation on one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    group_id: GroupId,
    target_ids: Vec<TargetId>,
}

impl Selection {
    /// Select ids without checking membership. Duplicates are dropped, order kept.
    pub fn new(group_id: GroupId, ids: impl IntoIterator<Item = TargetId>) -> Self {
        let mut seen = HashSet::new();
        let target_ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self {
            group_id,
            target_ids,
        }
    }

    /// Select ids that must all be members of `group`.
    pub fn from_group(
        group: &Group,
        ids: impl IntoIterator<Item = TargetId>,
    ) -> Result<Self, JobError> {
        let selection = Self::new(group.id, ids);
        let foreign = group.foreign_targets(&selection.target_ids);
        if !foreign.is_empty() {
            return Err(JobError::ForeignTargets(foreign));
        }
        Ok(selection)
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn target_ids(&self) -> &[TargetId] {
        &self.target_ids
    }

    pub fn is_empty(&self) -> bool {
        self.target_ids.is_empty()
    }
}
