//! REST API module.
//!
//! Contains the group and LMS job routes and handlers used by the dashboard.

mod groups;
mod lms;

pub use groups::*;
pub use lms::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{Group, GroupId};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Load a group the caller owns: 404 when it does not exist, 403 when another user owns it.
async fn owned_group(state: &AppState, caller: &Caller, id: GroupId) -> Result<Group, AppError> {
    let group = state
        .repo
        .get_group(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
    caller.authorize(&group)?;
    Ok(group)
}
