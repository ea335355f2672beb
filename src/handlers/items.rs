use axum::extract::{Extension, Query, State};
use serde::Deserialize;

use crate::app::AppState;
use crate::backend::Caller;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::models::{Item, RowRange};
use crate::validation::{CreateItemInput, ValidatedJson};

use super::{read_failed, write_failed};

/// Raw pagination parameters; parsed by hand so bad values become field issues
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListQuery {
    /// Row window for this query, with `limit` clamped to `max_limit`.
    /// `None` means zero rows were asked for.
    pub fn range(&self, default_limit: u64, max_limit: u64) -> Result<Option<RowRange>, ApiError> {
        let limit = parse_param("limit", self.limit.as_deref(), default_limit)?.min(max_limit);
        let offset = parse_param("offset", self.offset.as_deref(), 0)?;
        Ok(RowRange::page(limit, offset))
    }
}

/// Non-negative and within the store's signed 64-bit row arithmetic
fn parse_param(name: &str, raw: Option<&str>, default: u64) -> Result<u64, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<i64>()
            .ok()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| ApiError::invalid_field(name, "Expected a non-negative integer")),
    }
}

/// POST /api/items - Create an item owned by the caller
///
/// Expected Input:
/// ```json
/// { "title": "Buy milk", "description": "2 litres", "priority": "high" }
/// ```
///
/// Responds 201 with `{ "success": true, "data": Item }`.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ValidatedJson(input): ValidatedJson<CreateItemInput>,
) -> ApiResult<Item> {
    let item = state
        .backend
        .store
        .insert_item(&caller, input.into_new_item())
        .await
        .map_err(write_failed)?;

    Ok(ApiResponse::created(item))
}

/// GET /api/items?limit=&offset= - The caller's items, oldest first
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Item>> {
    let api = &state.config.api;
    let Some(range) = query.range(api.default_page_size as u64, api.max_page_size as u64)? else {
        return Ok(ApiResponse::data(Vec::new()));
    };

    let items = state
        .backend
        .store
        .select_items(&caller, range)
        .await
        .map_err(read_failed)?;

    Ok(ApiResponse::data(items))
}
