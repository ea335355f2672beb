use axum::extract::{Extension, State};

use crate::app::AppState;
use crate::backend::Caller;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::models::Profile;
use crate::validation::{ProfileUpdateInput, ValidatedJson};

use super::{read_failed, write_failed};

/// GET /api/profile - The caller's own profile
pub async fn get(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> ApiResult<Profile> {
    let profile = state
        .backend
        .store
        .select_profile(&caller)
        .await
        .map_err(read_failed)?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    Ok(ApiResponse::success(profile))
}

/// PUT /api/profile - Create or replace the caller's profile
pub async fn put(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ValidatedJson(input): ValidatedJson<ProfileUpdateInput>,
) -> ApiResult<Profile> {
    let profile = state
        .backend
        .store
        .upsert_profile(&caller, input.into_update())
        .await
        .map_err(write_failed)?;

    Ok(ApiResponse::success(profile))
}
