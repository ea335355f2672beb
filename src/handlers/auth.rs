use axum::{
    extract::{Extension, State},
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::backend::{BackendError, Caller};
use crate::error::ApiError;
use crate::middleware::session::clear_session_cookies;
use crate::middleware::{ApiResponse, ApiResult};
use crate::models::{Session, SessionUser};
use crate::validation::{LoginInput, SignUpInput, ValidatedJson};

/// POST /api/auth/login - Exchange credentials for a session
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "access_token": "eyJhbGciOiJIUzI1NiI...",
///     "refresh_token": "eyJhbGciOiJIUzI1NiI...",
///     "expires_at": 1735689600,
///     "user": { "id": "uuid", "email": "user@example.com" }
///   }
/// }
/// ```
pub async fn login(State(state): State<AppState>, ValidatedJson(input): ValidatedJson<LoginInput>) -> ApiResult<Session> {
    let email = input.email.unwrap_or_default();
    let password = input.password.unwrap_or_default();

    let session = state
        .backend
        .auth
        .sign_in_with_password(&email, &password)
        .await
        .map_err(|e| {
            if matches!(e, BackendError::InvalidCredentials) {
                warn!("Rejected credentials for {}", email);
            }
            ApiError::from(e)
        })?;

    info!("Signed in {}", session.user.email);
    Ok(ApiResponse::success(session))
}

/// POST /api/auth/signup - Register a new account (201, or 409 if the email is taken)
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<SignUpInput>,
) -> ApiResult<SessionUser> {
    let user = state.backend.auth.sign_up(input.into_account()).await?;
    info!("Registered {}", user.email);
    Ok(ApiResponse::created(user))
}

/// GET /api/auth/whoami - The identity behind the current session
pub async fn whoami(Extension(caller): Extension<Caller>) -> ApiResult<SessionUser> {
    Ok(ApiResponse::success(caller.user))
}

/// POST /api/auth/logout - Revoke the current session and drop its cookies
pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    state.backend.auth.sign_out(&caller.access_token).await?;
    info!("Signed out {}", caller.user.email);

    let [access, refresh] = clear_session_cookies(&state.config.security);
    let body: ApiResponse<Value> = ApiResponse::success(json!({ "signed_out": true }));
    Ok((AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]), body))
}
