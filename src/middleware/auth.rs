use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::app::paths;
use crate::backend::Caller;
use crate::error::ApiError;

/// API gate: no session, no entry
pub async fn require_user(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<Caller>().is_none() {
        tracing::debug!("Rejecting unauthenticated call to {}", request.uri().path());
        return Err(ApiError::unauthorized());
    }
    Ok(next.run(request).await)
}

/// Page gate: send anonymous visitors to the login page
pub async fn require_page_user(request: Request, next: Next) -> Response {
    if request.extensions().get::<Caller>().is_none() {
        tracing::debug!("Redirecting anonymous visitor from {}", request.uri().path());
        return Redirect::to(paths::LOGIN).into_response();
    }
    next.run(request).await
}
