//! LMS account bulk job endpoints.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{owned_group, success, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::jobs::run_lms_job;
use crate::models::{GroupId, JobId, JobStatus, LmsOperation, LmsSelectionRequest, Target};
use crate::AppState;

/// POST /api/groups/{id}/lms-accounts - Start provisioning LMS accounts.
pub async fn create_lms_accounts(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(group_id): Path<GroupId>,
    Json(request): Json<LmsSelectionRequest>,
) -> ApiResult<JobId> {
    start_job(&state, &caller, group_id, LmsOperation::Create, request).await
}

/// DELETE /api/groups/{id}/lms-accounts - Start removing LMS accounts.
pub async fn delete_lms_accounts(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(group_id): Path<GroupId>,
    Json(request): Json<LmsSelectionRequest>,
) -> ApiResult<JobId> {
    start_job(&state, &caller, group_id, LmsOperation::Delete, request).await
}

/// GET /api/groups/{id}/lms-accounts/jobs/{job_id} - Report job progress.
pub async fn get_lms_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((group_id, job_id)): Path<(GroupId, JobId)>,
) -> ApiResult<JobStatus> {
    owned_group(&state, &caller, group_id).await?;

    match state.jobs.get(&job_id).await {
        Some(job) if job.group_id == group_id => success(job.status()),
        _ => Err(AppError::BadRequest("Wrong job id".to_string())),
    }
}

async fn start_job(
    state: &AppState,
    caller: &Caller,
    group_id: GroupId,
    operation: LmsOperation,
    request: LmsSelectionRequest,
) -> ApiResult<JobId> {
    let group = owned_group(state, caller, group_id).await?;

    let mut seen = HashSet::new();
    let ids: Vec<_> = request
        .target_ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();

    if ids.is_empty() {
        return Err(AppError::Validation("No users selected".to_string()));
    }

    if !group.has_targets(&ids) {
        return Err(AppError::BadRequest(
            "One or more target ids belong to a different user group".to_string(),
        ));
    }

    let targets: Vec<Target> = ids
        .iter()
        .filter_map(|id| group.target(*id).cloned())
        .collect();

    let job_id = state.jobs.create(group_id, operation).await;
    tokio::spawn(run_lms_job(
        state.repo.clone(),
        state.jobs.clone(),
        job_id.clone(),
        operation,
        targets,
    ));

    success(job_id)
}
