// handlers/mod.rs - Request handlers grouped by surface
//
// JSON API (items, profile, auth, health) answers with `ApiResponse`/`ApiError`.
// Pages and the form actions behind them answer with HTML or redirects.

pub mod actions;
pub mod auth;
pub mod health;
pub mod items;
pub mod pages;
pub mod profile;

use tracing::error;

use crate::backend::BackendError;
use crate::error::ApiError;

/// Store failure on a write: the store's own message is returned to the client
pub(crate) fn write_failed(err: BackendError) -> ApiError {
    error!("Store write failed: {}", err);
    match err {
        BackendError::Rejected(message) => ApiError::database(message),
        other => ApiError::database(other.to_string()),
    }
}

/// Store failure on a read: logged, but nothing leaks
pub(crate) fn read_failed(err: BackendError) -> ApiError {
    error!("Store read failed: {}", err);
    ApiError::database_opaque()
}
