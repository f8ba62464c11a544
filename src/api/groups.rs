//! Group API endpoints.
//!
//! Groups are scoped to the calling user: listing shows only their groups and every
//! other route refuses groups owned by someone else.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{owned_group, success, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{is_valid_email, Group, GroupId, GroupRequest};
use crate::AppState;

/// GET /api/groups - List the caller's groups.
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<Group>> {
    success(state.repo.list_groups(&caller.owner).await?)
}

/// GET /api/groups/{id} - Get a single group.
pub async fn get_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<GroupId>,
) -> ApiResult<Group> {
    success(owned_group(&state, &caller, id).await?)
}

/// POST /api/groups - Create a new group owned by the caller.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<GroupRequest>,
) -> ApiResult<Group> {
    validate_group(&request)?;
    success(state.repo.create_group(&caller.owner, &request).await?)
}

/// PUT /api/groups/{id} - Replace a group's name and targets.
pub async fn update_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<GroupId>,
    Json(request): Json<GroupRequest>,
) -> ApiResult<Group> {
    owned_group(&state, &caller, id).await?;
    validate_group(&request)?;
    success(state.repo.update_group(id, &request).await?)
}

/// DELETE /api/groups/{id} - Delete a group.
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<GroupId>,
) -> ApiResult<()> {
    owned_group(&state, &caller, id).await?;
    state.repo.delete_group(id).await?;
    success(())
}

fn validate_group(request: &GroupRequest) -> Result<(), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Group name not specified".to_string()));
    }
    if request.targets.is_empty() {
        return Err(AppError::Validation("No targets specified".to_string()));
    }
    if let Some(bad) = request
        .targets
        .iter()
        .find(|t| !is_valid_email(t.email.trim()))
    {
        return Err(AppError::Validation(format!(
            "Invalid email address {:?}",
            bad.email
        )));
    }
    Ok(())
}
