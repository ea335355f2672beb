use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

/// Shape of a successful JSON body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{ "success": true, "data": ... }`
    Success,
    /// `{ "data": ... }`
    Data,
}

/// Wrapper for API responses that adds the JSON envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: StatusCode,
    pub envelope: Envelope,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with the success envelope
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: StatusCode::OK,
            envelope: Envelope::Success,
        }
    }

    /// 201 with the success envelope
    pub fn created(data: T) -> Self {
        Self {
            status_code: StatusCode::CREATED,
            ..Self::success(data)
        }
    }

    /// 200 with a bare `data` envelope, used for listings
    pub fn data(data: T) -> Self {
        Self {
            envelope: Envelope::Data,
            ..Self::success(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to serialize response data" })),
                )
                    .into_response();
            }
        };

        let envelope: Value = match self.envelope {
            Envelope::Success => json!({ "success": true, "data": data_value }),
            Envelope::Data => json!({ "data": data_value }),
        };

        (self.status_code, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
